//! WebSocket 网关 / WebSocket gateway
pub mod admission;
pub mod connection;
pub mod handler;
pub mod sender;
pub mod server;
