use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::watch;
use tracing::{info, warn};

use super::backoff::Backoff;
use super::{RecordSource, SourceRecord};
use crate::config::{BackoffConfig, KafkaConfig};
use crate::error::SourceError;

/// Kafka 记录源 / Kafka-backed record source
pub struct KafkaSource {
    consumer: StreamConsumer,
}

impl KafkaSource {
    /// 建立消费者、订阅并拉取元数据确认可达 / Create, subscribe, and confirm the brokers answer
    ///
    /// 元数据请求是阻塞调用，放在阻塞线程池执行。
    /// The metadata request blocks, so the whole step runs on the blocking pool.
    pub async fn connect(config: &KafkaConfig) -> Result<Self, SourceError> {
        let brokers = config.brokers.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || Self::connect_blocking(&config))
            .await
            .map_err(|e| SourceError::Connect {
                brokers,
                cause: e.to_string(),
            })?
    }

    fn connect_blocking(config: &KafkaConfig) -> Result<Self, SourceError> {
        let connect_err = |cause: String| SourceError::Connect {
            brokers: config.brokers.clone(),
            cause,
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .create()
            .map_err(|e| connect_err(e.to_string()))?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|e| connect_err(e.to_string()))?;
        consumer
            .fetch_metadata(None, config.metadata_timeout)
            .map_err(|e| connect_err(e.to_string()))?;

        Ok(Self { consumer })
    }

    /// 带退避的无限重连 / Retry forever with backoff until connected or shut down
    pub async fn connect_with_backoff(
        config: &KafkaConfig,
        backoff: &BackoffConfig,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<Self> {
        let mut backoff = Backoff::new(backoff);
        loop {
            if *shutdown.borrow() {
                return None;
            }
            match Self::connect(config).await {
                Ok(source) => {
                    info!(
                        "🟢 connected to kafka {} as group {} ({} topics)",
                        config.brokers,
                        config.group,
                        config.topics.len()
                    );
                    return Some(source);
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        "⚠️  kafka connect attempt {} failed: {}, retrying in {:?}",
                        backoff.attempts(),
                        e,
                        delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                return None;
                            }
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl RecordSource for KafkaSource {
    async fn next_record(&mut self) -> Result<SourceRecord, SourceError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| SourceError::Receive(e.to_string()))?;
        Ok(SourceRecord {
            topic: message.topic().to_string(),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            partition: message.partition(),
            offset: message.offset(),
        })
    }

    async fn commit(&mut self, record: &SourceRecord) -> Result<(), SourceError> {
        let commit_err = |cause: String| SourceError::Commit {
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            cause,
        };
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
            .map_err(|e| commit_err(e.to_string()))?;
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| commit_err(e.to_string()))
    }
}
