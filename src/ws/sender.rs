use futures_util::{Sink, SinkExt};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, warn};

use crate::domain::message::EventMessage;
use crate::storage::MessageStore;

/// 写循环结束原因 / Why a write loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteExit {
    /// 收到停止信号 / Stop signal from the connection
    Stopped,
    /// 投递通道关闭（被新连接替换）/ Delivery channel closed, e.g. replaced by a newer connection
    ChannelClosed,
    /// 套接字写失败 / Socket write failed
    WriteFailed,
}

/// 单连接写循环 / Per-connection write loop
pub struct WriteLoop<S> {
    pub user_id: i64,
    pub sink: S,
    pub deliveries: mpsc::Receiver<EventMessage>,
    pub notices: mpsc::UnboundedReceiver<EventMessage>,
    pub store: Arc<dyn MessageStore>,
    pub stop: watch::Receiver<bool>,
}

impl<S> WriteLoop<S>
where
    S: Sink<Message, Error = WsError> + Unpin + Send,
{
    /// 先重放未投递消息，再转发实时消息 / Replay unsent messages, then stream live ones
    ///
    /// 重放完成后通过 `ready` 通知。退出时排空通道并落库，最后发送关闭帧。
    /// Signals `ready` once replay is done. On exit the queued deliveries are
    /// persisted and a close frame is sent.
    pub async fn run(mut self, ready: oneshot::Sender<()>) -> WriteExit {
        if !self.replay().await {
            let _ = ready.send(());
            self.finish().await;
            return WriteExit::WriteFailed;
        }
        let _ = ready.send(());

        let exit = loop {
            tokio::select! {
                biased;
                _ = self.stop.changed() => break WriteExit::Stopped,
                Some(notice) = self.notices.recv() => {
                    if let Err(e) = write_message(&mut self.sink, &notice).await {
                        debug!("failed to write notice to user {}: {}", self.user_id, e);
                        break WriteExit::WriteFailed;
                    }
                }
                delivery = self.deliveries.recv() => match delivery {
                    Some(message) => {
                        if let Err(e) = write_message(&mut self.sink, &message).await {
                            warn!("⚠️  write to user {} failed: {}, storing message", self.user_id, e);
                            self.persist(message);
                            break WriteExit::WriteFailed;
                        }
                    }
                    None => break WriteExit::ChannelClosed,
                },
            }
        };

        self.finish().await;
        exit
    }

    async fn replay(&mut self) -> bool {
        let unsent = match self.store.unsent_for(self.user_id) {
            Ok(list) => list,
            Err(e) => {
                warn!("⚠️  loading unsent messages for user {} failed: {}", self.user_id, e);
                return true;
            }
        };
        if unsent.is_empty() {
            return true;
        }

        let total = unsent.len();
        for message in unsent {
            if let Err(e) = write_message(&mut self.sink, &message).await {
                warn!("⚠️  replay to user {} interrupted: {}", self.user_id, e);
                return false;
            }
            if let Some(id) = message.store_id {
                if let Err(e) = self.store.mark_delivered(id) {
                    error!("❌ failed to mark message {} delivered: {}", id, e);
                }
            }
        }
        debug!("📬 replayed {} stored messages to user {}", total, self.user_id);
        true
    }

    async fn finish(&mut self) {
        self.deliveries.close();
        let mut drained = 0usize;
        while let Ok(message) = self.deliveries.try_recv() {
            self.persist(message);
            drained += 1;
        }
        if drained > 0 {
            debug!("💾 stored {} queued messages for user {}", drained, self.user_id);
        }
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }

    fn persist(&self, mut message: EventMessage) {
        if message.is_notice() {
            return;
        }
        message.delivered = false;
        message.store_id = None;
        if let Err(e) = self.store.persist(&message) {
            error!("❌ failed to store message for user {}: {}", self.user_id, e);
        }
    }
}

async fn write_message<S>(sink: &mut S, message: &EventMessage) -> Result<(), WsError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let text = serde_json::to_string(message).map_err(|e| WsError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    sink.send(Message::Text(text)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    type BoxSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

    fn recording_sink(out: Arc<Mutex<Vec<Message>>>) -> BoxSink {
        Box::pin(futures_util::sink::unfold((), move |(), msg: Message| {
            let out = out.clone();
            async move {
                out.lock().push(msg);
                Ok::<(), WsError>(())
            }
        }))
    }

    /// 每次写入都失败的套接字 / Socket whose every write fails
    struct BrokenSink;

    impl Sink<Message> for BrokenSink {
        type Error = WsError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), WsError> {
            Err(WsError::ConnectionClosed)
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }
    }

    fn broken_sink() -> BoxSink {
        Box::pin(BrokenSink)
    }

    fn texts(out: &Mutex<Vec<Message>>) -> Vec<serde_json::Value> {
        out.lock()
            .iter()
            .filter_map(|m| match m {
                Message::Text(t) => serde_json::from_str(t).ok(),
                _ => None,
            })
            .collect()
    }

    fn to_user(user_id: i64, body: &str) -> EventMessage {
        EventMessage {
            channel: "message".into(),
            receiver_id: user_id,
            body: json!(body),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_replay_precedes_live_and_marks_delivered() {
        let store = Arc::new(MemoryStore::new());
        store.persist(&to_user(1, "old-1")).unwrap();
        store.persist(&to_user(1, "old-2")).unwrap();

        let out = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel(4);
        let (_notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = oneshot::channel();

        tx.send(to_user(1, "live")).await.unwrap();
        let writer = tokio::spawn(
            WriteLoop {
                user_id: 1,
                sink: recording_sink(out.clone()),
                deliveries: rx,
                notices: notice_rx,
                store: store.clone(),
                stop: stop_rx,
            }
            .run(ready_tx),
        );
        ready_rx.await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        stop_tx.send(true).unwrap();
        assert_eq!(writer.await.unwrap(), WriteExit::Stopped);

        let bodies: Vec<serde_json::Value> = texts(&out).into_iter().map(|v| v["body"].clone()).collect();
        assert_eq!(bodies, vec![json!("old-1"), json!("old-2"), json!("live")]);
        assert!(store.unsent_for(1).unwrap().is_empty());
        assert!(matches!(out.lock().last(), Some(Message::Close(_))));
    }

    #[tokio::test]
    async fn test_write_failure_persists_message() {
        let store = Arc::new(MemoryStore::new());
        let (tx, rx) = mpsc::channel(4);
        let (_notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (ready_tx, _ready_rx) = oneshot::channel();

        tx.send(to_user(2, "first")).await.unwrap();
        tx.send(to_user(2, "second")).await.unwrap();
        let exit = WriteLoop {
            user_id: 2,
            sink: broken_sink(),
            deliveries: rx,
            notices: notice_rx,
            store: store.clone(),
            stop: stop_rx,
        }
        .run(ready_tx)
        .await;

        assert_eq!(exit, WriteExit::WriteFailed);
        let unsent: Vec<serde_json::Value> = store.unsent_for(2).unwrap().into_iter().map(|m| m.body).collect();
        assert_eq!(unsent, vec![json!("first"), json!("second")]);
        assert!(tx.send(to_user(2, "late")).await.is_err());
    }

    #[tokio::test]
    async fn test_notices_are_never_persisted() {
        let store = Arc::new(MemoryStore::new());
        let (_tx, rx) = mpsc::channel(4);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (ready_tx, _ready_rx) = oneshot::channel();

        notice_tx
            .send(EventMessage::error_notice(3, "bad"))
            .unwrap();
        let exit = WriteLoop {
            user_id: 3,
            sink: broken_sink(),
            deliveries: rx,
            notices: notice_rx,
            store: store.clone(),
            stop: stop_rx,
        }
        .run(ready_tx)
        .await;

        assert_eq!(exit, WriteExit::WriteFailed);
        assert_eq!(store.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_channel_ends_loop() {
        let store = Arc::new(MemoryStore::new());
        let out = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel(4);
        let (_notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (ready_tx, _ready_rx) = oneshot::channel();
        drop(tx);

        let exit = WriteLoop {
            user_id: 4,
            sink: recording_sink(out.clone()),
            deliveries: rx,
            notices: notice_rx,
            store,
            stop: stop_rx,
        }
        .run(ready_tx)
        .await;
        assert_eq!(exit, WriteExit::ChannelClosed);
    }
}
