use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, warn};

use crate::domain::message::{EventMessage, BOTH_TARGETS_REASON};
use crate::error::{GatewayError, RouteError};
use crate::router::Router;

/// 单连接读循环 / Per-connection read loop
///
/// 逐帧处理；格式错误的帧终止连接，同时指定事件与用户的消息只回错误通知。
/// One frame at a time. A malformed frame ends the connection; a message that
/// names both an event and a user only earns the sender an error notice.
pub async fn read_loop<R>(
    user_id: i64,
    mut frames: R,
    router: &Router,
    notices: &mpsc::UnboundedSender<EventMessage>,
) -> Result<(), GatewayError>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = frames.next().await {
        let payload = match frame? {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(bytes) => bytes,
            Message::Close(_) => {
                debug!("user {} sent close frame", user_id);
                break;
            }
            _ => continue,
        };
        handle_frame(user_id, &payload, router, notices).await?;
    }
    Ok(())
}

async fn handle_frame(
    user_id: i64,
    payload: &[u8],
    router: &Router,
    notices: &mpsc::UnboundedSender<EventMessage>,
) -> Result<(), GatewayError> {
    let mut message: EventMessage =
        serde_json::from_slice(payload).map_err(|e| GatewayError::Frame(e.to_string()))?;

    if message.has_both_targets() {
        debug!(
            "user {} addressed event {} and user {} at once",
            user_id, message.event_id, message.receiver_id
        );
        let _ = notices.send(EventMessage::error_notice(user_id, BOTH_TARGETS_REASON));
        return Ok(());
    }

    message.stamp_from_client(user_id);

    // 路由在独立任务中运行，读循环被取消时仍会完成（投递或落库）
    // Routing runs in its own task and finishes (delivered or stored) even if
    // the read loop is cancelled mid-route.
    let routing = {
        let router = router.clone();
        tokio::spawn(async move { router.route(message).await })
    };
    match routing.await {
        Ok(Ok(report)) => debug!(
            "📨 message from user {}: delivered={} persisted={} failed={}",
            user_id, report.delivered, report.persisted, report.failed
        ),
        Ok(Err(RouteError::NoTarget)) => {
            warn!("⚠️  discarding message from user {} without a target", user_id)
        }
        Ok(Err(e)) => warn!("⚠️  discarding message from user {}: {}", user_id, e),
        Err(e) => error!("❌ routing task for user {} failed: {}", user_id, e),
    }
    Ok(())
}
