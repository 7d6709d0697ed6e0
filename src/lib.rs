//! v-event-relay：把 Kafka 上的领域事件转发给 WebSocket 客户端，离线消息落库待重放。
//! Relays domain events from Kafka to WebSocket clients, storing messages for
//! offline recipients until they reconnect.

pub mod api;
pub mod comm;
pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod membership;
pub mod registry;
pub mod router;
pub mod server;
pub mod storage;
pub mod ws;

pub use self::config::RelayConfig;
pub use domain::message::{Dispatch, EventMessage, StoreId, Target};
pub use error::{RelayError, RelayResult};
pub use router::{RouteReport, Router};
pub use server::RelayServer;
