use dashmap::DashMap;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::message::EventMessage;

/// 注册表条目 / Registry entry for one live user
pub struct RegistryEntry {
    pub token: u64,                          // 代际令牌 / Generation token
    pub sender: mpsc::Sender<EventMessage>,  // 投递通道 / Delivery channel
    pub addr: SocketAddr,                    // 客户端地址 / Client address
    pub connected_at: i64,                   // 连接时间(ms) / Connected at (ms)
    pub events: Vec<i64>,                    // 所属事件 / Events the user belongs to
}

/// 注册凭证，注销时校验 / Proof of registration, checked on removal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub user_id: i64,
    pub token: u64,
}

/// 在线连接快照 / Snapshot of one live connection
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OnlineConnection {
    pub user_id: i64,
    pub addr: String,
    pub connected_at: i64,
    pub events: Vec<i64>,
}

/// 连接注册表 / Connection registry
///
/// 每个用户至多一个条目，新连接替换旧连接。不要跨 `.await` 持有 DashMap 引用，
/// 需要发送时先克隆出 `Sender`。
/// At most one entry per user; a new connection replaces the old one. Never
/// hold a DashMap guard across an `.await`; clone the `Sender` out first.
pub struct ConnectionRegistry {
    entries: DashMap<i64, RegistryEntry>,
    next_token: AtomicU64,
    channel_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            next_token: AtomicU64::new(1),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// 注册用户连接 / Register a connection for `user_id`
    ///
    /// 旧条目的发送端被丢弃，其写循环会看到通道关闭。
    /// A replaced entry's sender is dropped so its write loop sees the channel close.
    pub fn register(
        &self,
        user_id: i64,
        addr: SocketAddr,
    ) -> (Registration, mpsc::Receiver<EventMessage>) {
        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let entry = RegistryEntry {
            token,
            sender,
            addr,
            connected_at: chrono::Utc::now().timestamp_millis(),
            events: Vec::new(),
        };
        if let Some(old) = self.entries.insert(user_id, entry) {
            info!(
                "🔁 user {} reconnected from {}, replacing connection from {}",
                user_id, addr, old.addr
            );
        }
        (Registration { user_id, token }, receiver)
    }

    /// 注销（令牌匹配时才删除）/ Remove the entry only if it is still ours
    pub fn deregister(&self, registration: &Registration) -> bool {
        let removed = self
            .entries
            .remove_if(&registration.user_id, |_, entry| entry.token == registration.token)
            .is_some();
        if !removed {
            debug!(
                "registry entry for user {} already replaced, keeping newer connection",
                registration.user_id
            );
        }
        removed
    }

    /// 记录用户所属事件（令牌匹配时）/ Record the user's events if the entry is still ours
    pub fn set_events(&self, registration: &Registration, events: Vec<i64>) -> bool {
        match self.entries.get_mut(&registration.user_id) {
            Some(mut entry) if entry.token == registration.token => {
                entry.events = events;
                true
            }
            _ => false,
        }
    }

    /// 克隆出投递发送端 / Clone the delivery sender out of the map
    pub fn sender_for(&self, user_id: i64) -> Option<mpsc::Sender<EventMessage>> {
        self.entries.get(&user_id).map(|e| e.sender.clone())
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.entries.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<OnlineConnection> {
        let mut list: Vec<OnlineConnection> = self
            .entries
            .iter()
            .map(|e| OnlineConnection {
                user_id: *e.key(),
                addr: e.value().addr.to_string(),
                connected_at: e.value().connected_at,
                events: e.value().events.clone(),
            })
            .collect();
        list.sort_by_key(|c| c.user_id);
        list
    }
}
