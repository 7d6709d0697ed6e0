use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::MessageStore;
use crate::domain::message::{EventMessage, StoreId};
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    next_id: u64,
    messages: BTreeMap<u64, EventMessage>,
}

/// 内存存储，进程退出即丢失 / Volatile in-process store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn select<F>(&self, keep: F) -> Vec<EventMessage>
    where
        F: Fn(&EventMessage) -> bool,
    {
        self.inner
            .read()
            .messages
            .values()
            .filter(|m| keep(m))
            .cloned()
            .collect()
    }
}

impl MessageStore for MemoryStore {
    fn persist(&self, message: &EventMessage) -> Result<StoreId, StoreError> {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = inner.next_id;
        let mut stored = message.clone();
        stored.store_id = Some(StoreId(id));
        inner.messages.insert(id, stored);
        Ok(StoreId(id))
    }

    fn unsent_for(&self, user_id: i64) -> Result<Vec<EventMessage>, StoreError> {
        Ok(self.select(|m| m.receiver_id == user_id && !m.delivered))
    }

    fn for_receiver(&self, user_id: i64) -> Result<Vec<EventMessage>, StoreError> {
        Ok(self.select(|m| m.receiver_id == user_id))
    }

    fn for_event(&self, event_id: i64) -> Result<Vec<EventMessage>, StoreError> {
        Ok(self.select(|m| m.event_id == event_id))
    }

    fn mark_delivered(&self, id: StoreId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let stored = inner
            .messages
            .get_mut(&id.0)
            .ok_or(StoreError::NotFound(id.0))?;
        stored.delivered = true;
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().messages.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let id = store
            .persist(&EventMessage {
                receiver_id: 3,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(id, StoreId(1));
        assert_eq!(store.unsent_for(3).unwrap()[0].store_id, Some(id));

        store.mark_delivered(id).unwrap();
        assert!(store.unsent_for(3).unwrap().is_empty());
        assert_eq!(store.for_receiver(3).unwrap().len(), 1);
        assert!(matches!(
            store.mark_delivered(StoreId(99)),
            Err(StoreError::NotFound(99))
        ));
    }
}
