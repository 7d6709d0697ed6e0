//! 消息存储 / Message store
//!
//! 离线或投递失败的消息落在这里，连接建立时按存储顺序重放。
//! Holds messages that could not be handed to a live connection; replayed in
//! store order when the recipient connects.

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::domain::message::{EventMessage, StoreId};
use crate::error::StoreError;

pub mod memory;
pub mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

/// 存储抽象 / Storage contract
///
/// 每次调用相互独立，调用方记录失败后继续。
/// Calls are independent; callers log failures and carry on.
pub trait MessageStore: Send + Sync {
    /// 持久化并返回分配的标识 / Persist and return the assigned id
    fn persist(&self, message: &EventMessage) -> Result<StoreId, StoreError>;

    /// 某用户尚未投递的消息（存储顺序）/ Undelivered messages for a user, in store order
    fn unsent_for(&self, user_id: i64) -> Result<Vec<EventMessage>, StoreError>;

    fn for_receiver(&self, user_id: i64) -> Result<Vec<EventMessage>, StoreError>;

    fn for_event(&self, event_id: i64) -> Result<Vec<EventMessage>, StoreError>;

    /// 标记已投递 / Flag a stored message as delivered
    fn mark_delivered(&self, id: StoreId) -> Result<(), StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// 按配置打开存储 / Open the configured backend
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn MessageStore>, StoreError> {
    match config.backend {
        StorageBackend::Sled => Ok(Arc::new(SledStore::open(&config.path)?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory_backend() {
        let cfg = StorageConfig {
            backend: StorageBackend::Memory,
            path: String::new(),
        };
        let store = open_store(&cfg).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_open_sled_backend() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StorageConfig {
            backend: StorageBackend::Sled,
            path: dir.path().join("db").to_string_lossy().into_owned(),
        };
        let store = open_store(&cfg).unwrap();
        let id = store
            .persist(&EventMessage {
                receiver_id: 1,
                ..Default::default()
            })
            .unwrap();
        store.mark_delivered(id).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }
}
