use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{GatewayError, RelayResult};
use crate::server::RelayServer;

/// 启动WS监听 / Start WS listener
impl RelayServer {
    pub async fn bind_gateway(&self) -> RelayResult<TcpListener> {
        let addr = format!("{}:{}", self.config.gateway.host, self.config.gateway.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("🚀 WebSocket gateway listening on {}", addr);
        Ok(listener)
    }

    /// 接受连接直到关闭信号 / Accept connections until shutdown
    pub async fn serve_gateway(&self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        info!(
            "📡 Waiting for connections (max {})...",
            self.config.gateway.max_connections
        );
        loop {
            let accepted = tokio::select! {
                _ = shutdown.changed() => break,
                accepted = listener.accept() => accepted,
            };
            let (stream, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("⚠️  accept failed: {}", e);
                    continue;
                }
            };

            let server = self.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                match crate::ws::connection::handle_connection(stream, peer_addr, server, shutdown).await {
                    Ok(()) => {}
                    Err(GatewayError::Rejected(reason)) => info!("🚫 rejected connection: {}", reason),
                    Err(e) => warn!("Connection error from {}: {}", peer_addr, e),
                }
            });
        }
        info!("WebSocket gateway stopped");
    }
}
