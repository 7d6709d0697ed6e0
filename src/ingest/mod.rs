//! 日志摄取 / Log ingestion
//!
//! 从 Kafka 拉取记录、提交位点、解码并交给路由器。坏记录只影响自身。
//! Pulls records from Kafka, commits offsets, decodes and hands them to the
//! router. A bad record only affects itself.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{BackoffConfig, KafkaConfig};
use crate::domain::record::decode;
use crate::error::{DecodeError, SourceError};
use crate::router::Router;

pub mod backoff;
pub mod kafka;

pub use backoff::Backoff;
pub use kafka::KafkaSource;

/// 一条原始记录 / One raw log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub topic: String,
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

/// 记录源 / Source of log records
#[async_trait]
pub trait RecordSource: Send {
    /// 阻塞直到下一条记录 / Wait for the next record
    async fn next_record(&mut self) -> Result<SourceRecord, SourceError>;

    /// 提交位点（尽力而为）/ Commit the record's offset, best effort
    async fn commit(&mut self, record: &SourceRecord) -> Result<(), SourceError>;
}

/// 摄取循环 / Ingestion loop
pub struct IngestLoop {
    router: Router,
    backoff: BackoffConfig,
    shutdown: watch::Receiver<bool>,
}

impl IngestLoop {
    pub fn new(router: Router, backoff: BackoffConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            router,
            backoff,
            shutdown,
        }
    }

    /// 运行直到关闭或记录源结束 / Run until shutdown or until the source closes
    pub async fn run<S: RecordSource>(mut self, mut source: S) {
        let mut backoff = Backoff::new(&self.backoff);
        info!("📥 ingestion loop started");
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let next = tokio::select! {
                biased;
                changed = self.shutdown.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => break,
                },
                next = source.next_record() => next,
            };

            match next {
                Ok(record) => {
                    backoff.reset();
                    if let Err(e) = source.commit(&record).await {
                        warn!("⚠️  {}", e);
                    }
                    self.handle(record);
                }
                Err(SourceError::Closed) => {
                    info!("record source closed");
                    break;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!("⚠️  {}, retrying in {:?}", e, delay);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.changed() => {}
                    }
                }
            }
        }
        info!("📥 ingestion loop stopped");
    }

    fn handle(&self, record: SourceRecord) {
        match decode(&record.topic, &record.payload) {
            Ok(decoded) => {
                let router = self.router.clone();
                tokio::spawn(async move {
                    let payload = String::from_utf8_lossy(&record.payload);
                    for dispatch in decoded.into_dispatches(&record.topic, &payload) {
                        let report = router.dispatch(dispatch).await;
                        debug!(
                            "record {}[{}]@{} routed: delivered={} persisted={} failed={}",
                            record.topic,
                            record.partition,
                            record.offset,
                            report.delivered,
                            report.persisted,
                            report.failed
                        );
                    }
                });
            }
            Err(DecodeError::UnknownTopic(topic)) => {
                debug!("ignoring record from unrecognized topic {}", topic);
            }
            Err(e) => {
                warn!("⚠️  dropping record {}[{}]@{}: {}", record.topic, record.partition, record.offset, e);
            }
        }
    }
}

/// 连接 Kafka 并运行摄取循环 / Connect to Kafka and run the ingestion loop
///
/// `connected` 在消费期间为 true，供就绪检查使用。
/// `connected` is true while consuming; the readiness probe reads it.
pub async fn run_kafka_ingest(
    kafka: KafkaConfig,
    backoff: BackoffConfig,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
    connected: Arc<AtomicBool>,
) {
    let Some(source) = KafkaSource::connect_with_backoff(&kafka, &backoff, &mut shutdown).await else {
        return;
    };
    connected.store(true, Ordering::SeqCst);
    IngestLoop::new(router, backoff, shutdown).run(source).await;
    connected.store(false, Ordering::SeqCst);
}
