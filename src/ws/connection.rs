use futures_util::StreamExt;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Error as WsError;
use tracing::{debug, info, warn};

use super::admission::{parse_user_id, SlotGuard};
use super::handler::read_loop;
use super::sender::{WriteExit, WriteLoop};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::server::RelayServer;

fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut resp = ErrorResponse::new(Some(reason.to_string()));
    *resp.status_mut() = status;
    resp
}

fn ws_config(gateway: &GatewayConfig) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(gateway.max_buffer_size);
    config.max_frame_size = Some(gateway.max_buffer_size);
    config
}

/// 处理新连接 / Handle a new connection
///
/// 握手时完成准入与 user_id 解析，之后注册、启动写循环并运行读循环，
/// 任一循环结束即清理。
/// Admission and `user_id` parsing happen during the handshake; then the user
/// is registered, the write loop starts, and the read loop runs until either
/// side ends.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    server: RelayServer,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), GatewayError> {
    debug!("📨 new connection from {}", peer_addr);

    let mut admitted: Option<(i64, SlotGuard)> = None;
    let slots = server.slots.clone();
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let user_id = parse_user_id(req.uri().query())
            .map_err(|reason| reject(StatusCode::BAD_REQUEST, &reason))?;
        let guard = slots
            .try_acquire()
            .ok_or_else(|| reject(StatusCode::SERVICE_UNAVAILABLE, "connection limit reached"))?;
        admitted = Some((user_id, guard));
        Ok(resp)
    };

    let ws_stream = accept_hdr_async_with_config(stream, callback, Some(ws_config(&server.config.gateway)))
        .await
        .map_err(|e| match e {
            WsError::Http(resp) => {
                GatewayError::Rejected(format!("{} from {}", resp.status(), peer_addr))
            }
            other => GatewayError::WebSocket(other),
        })?;
    let Some((user_id, _slot)) = admitted.take() else {
        return Err(GatewayError::Rejected(format!("no admission for {}", peer_addr)));
    };

    let (registration, deliveries) = server.registry.register(user_id, peer_addr);
    info!("✅ user {} connected from {}", user_id, peer_addr);

    {
        let resolver = server.resolver.clone();
        let registry = server.registry.clone();
        tokio::spawn(async move {
            match resolver.events_for_user(user_id).await {
                Ok(events) => {
                    debug!("user {} is a member of events {:?}", user_id, events);
                    registry.set_events(&registration, events);
                }
                Err(e) => warn!("⚠️  membership lookup for user {} failed: {}", user_id, e),
            }
        });
    }

    let (sink, frames) = ws_stream.split();
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = watch::channel(false);
    let (ready_tx, ready_rx) = oneshot::channel();

    let mut writer = tokio::spawn(
        WriteLoop {
            user_id,
            sink,
            deliveries,
            notices: notice_rx,
            store: server.store.clone(),
            stop: stop_rx,
        }
        .run(ready_tx),
    );
    let _ = ready_rx.await;

    let mut writer_exit: Option<WriteExit> = None;
    let mut writer_done = false;
    let result = tokio::select! {
        res = read_loop(user_id, frames, &server.router, &notice_tx) => res,
        exit = &mut writer => {
            writer_done = true;
            writer_exit = exit.ok();
            Ok(())
        }
        _ = shutdown.changed() => Ok(()),
    };

    server.registry.deregister(&registration);
    let _ = stop_tx.send(true);
    if !writer_done {
        writer_exit = writer.await.ok();
    }
    info!(
        "👋 user {} disconnected from {} ({:?})",
        user_id,
        peer_addr,
        writer_exit.unwrap_or(WriteExit::Stopped)
    );
    result
}
