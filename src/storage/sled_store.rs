use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use super::MessageStore;
use crate::domain::message::{EventMessage, StoreId};
use crate::error::StoreError;

/// 落盘记录，包含 `delivered` / On-disk record, keeps `delivered`
#[derive(Serialize, Deserialize, Debug, Clone)]
struct StoredMessage {
    channel: String,
    event_id: i64,
    sender_id: i64,
    receiver_id: i64,
    delivered: bool,
    body: serde_json::Value,
}

impl StoredMessage {
    fn from_message(message: &EventMessage) -> Self {
        Self {
            channel: message.channel.clone(),
            event_id: message.event_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            delivered: message.delivered,
            body: message.body.clone(),
        }
    }

    fn into_message(self, id: u64) -> EventMessage {
        EventMessage {
            channel: self.channel,
            event_id: self.event_id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            delivered: self.delivered,
            body: self.body,
            store_id: Some(StoreId(id)),
        }
    }
}

/// sled 存储 / sled-backed store
///
/// `messages` 以大端 id 为键；`by_receiver`、`by_event` 为 `target ++ id` 索引。
/// `messages` is keyed by the big-endian id; `by_receiver` and `by_event` are
/// `target ++ id` indexes with empty values.
#[derive(Clone, Debug)]
pub struct SledStore {
    db: Db,
    messages: Tree,
    by_receiver: Tree,
    by_event: Tree,
}

fn index_key(target: i64, id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&target.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

fn id_from_index_key(key: &[u8]) -> Option<u64> {
    let tail: [u8; 8] = key.get(8..16)?.try_into().ok()?;
    Some(u64::from_be_bytes(tail))
}

impl SledStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    pub fn open_temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let messages = db.open_tree("messages")?;
        let by_receiver = db.open_tree("by_receiver")?;
        let by_event = db.open_tree("by_event")?;
        Ok(Self {
            db,
            messages,
            by_receiver,
            by_event,
        })
    }

    fn load(&self, id: u64) -> Result<Option<EventMessage>, StoreError> {
        match self.messages.get(id.to_be_bytes())? {
            Some(raw) => {
                let stored: StoredMessage = serde_json::from_slice(&raw)?;
                Ok(Some(stored.into_message(id)))
            }
            None => Ok(None),
        }
    }

    fn scan_index(&self, index: &Tree, target: i64) -> Result<Vec<EventMessage>, StoreError> {
        let mut out = Vec::new();
        for item in index.scan_prefix(target.to_be_bytes()) {
            let (key, _) = item?;
            let Some(id) = id_from_index_key(&key) else {
                continue;
            };
            if let Some(message) = self.load(id)? {
                out.push(message);
            }
        }
        Ok(out)
    }
}

impl MessageStore for SledStore {
    fn persist(&self, message: &EventMessage) -> Result<StoreId, StoreError> {
        let id = self.db.generate_id()?;
        let value = serde_json::to_vec(&StoredMessage::from_message(message))?;
        self.messages.insert(id.to_be_bytes(), value)?;
        if message.receiver_id != 0 {
            self.by_receiver
                .insert(index_key(message.receiver_id, id), &[] as &[u8])?;
        }
        if message.event_id != 0 {
            self.by_event
                .insert(index_key(message.event_id, id), &[] as &[u8])?;
        }
        self.db.flush()?;
        Ok(StoreId(id))
    }

    fn unsent_for(&self, user_id: i64) -> Result<Vec<EventMessage>, StoreError> {
        let mut all = self.scan_index(&self.by_receiver, user_id)?;
        all.retain(|m| !m.delivered);
        Ok(all)
    }

    fn for_receiver(&self, user_id: i64) -> Result<Vec<EventMessage>, StoreError> {
        self.scan_index(&self.by_receiver, user_id)
    }

    fn for_event(&self, event_id: i64) -> Result<Vec<EventMessage>, StoreError> {
        self.scan_index(&self.by_event, event_id)
    }

    fn mark_delivered(&self, id: StoreId) -> Result<(), StoreError> {
        let key = id.0.to_be_bytes();
        let raw = self.messages.get(key)?.ok_or(StoreError::NotFound(id.0))?;
        let mut stored: StoredMessage = serde_json::from_slice(&raw)?;
        if stored.delivered {
            return Ok(());
        }
        stored.delivered = true;
        self.messages.insert(key, serde_json::to_vec(&stored)?)?;
        self.db.flush()?;
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.messages.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(event_id: i64, receiver_id: i64, body: &str) -> EventMessage {
        EventMessage {
            channel: "message".into(),
            event_id,
            receiver_id,
            body: json!(body),
            ..Default::default()
        }
    }

    #[test]
    fn test_unsent_excludes_delivered_and_keeps_store_order() {
        let store = SledStore::open_temporary().unwrap();
        let first = store.persist(&message(0, 5, "one")).unwrap();
        let second = store.persist(&message(0, 5, "two")).unwrap();
        store.persist(&message(0, 6, "other")).unwrap();
        assert!(first < second);

        let unsent = store.unsent_for(5).unwrap();
        assert_eq!(unsent.len(), 2);
        assert_eq!(unsent[0].body, json!("one"));
        assert_eq!(unsent[0].store_id, Some(first));

        store.mark_delivered(first).unwrap();
        let unsent = store.unsent_for(5).unwrap();
        assert_eq!(unsent.len(), 1);
        assert_eq!(unsent[0].store_id, Some(second));
        assert_eq!(store.for_receiver(5).unwrap().len(), 2);
    }

    #[test]
    fn test_event_query_returns_fan_out_copies() {
        let store = SledStore::open_temporary().unwrap();
        store.persist(&message(9, 0, "resolver down")).unwrap();
        store.persist(&message(9, 2, "copy for 2")).unwrap();
        store.persist(&message(9, 3, "copy for 3")).unwrap();
        store.persist(&message(10, 0, "other event")).unwrap();

        let for_event = store.for_event(9).unwrap();
        assert_eq!(for_event.len(), 3);
        assert_eq!(store.unsent_for(3).unwrap().len(), 1);
    }

    #[test]
    fn test_mark_delivered_unknown_id() {
        let store = SledStore::open_temporary().unwrap();
        let err = store.mark_delivered(StoreId(4242)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(4242)));
    }

    #[test]
    fn test_persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay");
        let path = path.to_string_lossy().into_owned();
        {
            let store = SledStore::open(&path).unwrap();
            store.persist(&message(0, 77, "kept")).unwrap();
        }
        let store = SledStore::open(&path).unwrap();
        let unsent = store.unsent_for(77).unwrap();
        assert_eq!(unsent.len(), 1);
        assert_eq!(unsent[0].body, json!("kept"));
        assert!(!unsent[0].delivered);
    }
}
