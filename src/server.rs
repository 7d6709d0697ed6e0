use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::RelayConfig;
use crate::membership::MembershipResolver;
use crate::registry::{ConnectionRegistry, OnlineConnection};
use crate::router::Router;
use crate::storage::MessageStore;
use crate::ws::admission::ConnectionSlots;

/// 在线连接列表 / Online connection listing
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OnlineConnectionsResponse {
    pub connections: Vec<OnlineConnection>,
    pub total_count: usize,
    pub max_connections: usize,
}

/// 服务端共享状态 / Shared relay state
#[derive(Clone)]
pub struct RelayServer {
    pub config: Arc<RelayConfig>,                   // 配置 / Configuration
    pub registry: Arc<ConnectionRegistry>,          // 连接注册表 / Connection registry
    pub store: Arc<dyn MessageStore>,               // 消息存储 / Message store
    pub resolver: Arc<dyn MembershipResolver>,      // 成员解析 / Membership resolver
    pub router: Router,                             // 路由器 / Router
    pub slots: Arc<ConnectionSlots>,                // 连接名额 / Admission slots
    pub ingest_connected: Arc<AtomicBool>,          // 摄取已连接 / Ingestion connected
}

impl RelayServer {
    pub fn new(
        config: RelayConfig,
        store: Arc<dyn MessageStore>,
        resolver: Arc<dyn MembershipResolver>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.delivery.channel_capacity));
        let router = Router::new(
            registry.clone(),
            store.clone(),
            resolver.clone(),
            config.delivery.send_timeout,
        );
        let slots = ConnectionSlots::new(config.gateway.max_connections);
        Self {
            config: Arc::new(config),
            registry,
            store,
            resolver,
            router,
            slots,
            ingest_connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 获取在线连接 / Current online connections
    pub fn online_connections(&self) -> OnlineConnectionsResponse {
        let connections = self.registry.snapshot();
        OnlineConnectionsResponse {
            total_count: connections.len(),
            connections,
            max_connections: self.slots.max(),
        }
    }

    pub fn is_ingest_connected(&self) -> bool {
        self.ingest_connected.load(Ordering::SeqCst)
    }

    /// 存储是否可用 / Whether the store answers
    pub fn is_store_healthy(&self) -> bool {
        self.store.len().is_ok()
    }
}
