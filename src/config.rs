use std::time::Duration;

use crate::comm::config::ConfigManager;
use crate::domain::record::Topic;

/// 网关配置 / WebSocket gateway settings
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub max_buffer_size: usize,
}

/// 运维 HTTP 配置 / Ops HTTP settings
#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

/// 投递配置 / Direct delivery settings
#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    pub channel_capacity: usize,
    pub send_timeout: Duration,
}

/// Kafka 消费配置 / Kafka consumer settings
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    pub brokers: String,
    pub group: String,
    pub topics: Vec<String>,
    pub session_timeout_ms: u64,
    pub metadata_timeout: Duration,
}

/// 退避配置 / Reconnect backoff settings
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
}

/// 成员服务配置 / Membership service settings
#[derive(Clone, Debug)]
pub struct MembershipConfig {
    pub base_url: String,
    pub username: String,
    pub secret: String,
    pub timeout: Duration,
}

/// 存储后端 / Storage backend selection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Sled,
    Memory,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: String,
}

/// 服务完整配置 / Full relay configuration
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub gateway: GatewayConfig,
    pub http: HttpConfig,
    pub delivery: DeliveryConfig,
    pub kafka: KafkaConfig,
    pub backoff: BackoffConfig,
    pub membership: MembershipConfig,
    pub storage: StorageConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                host: "0.0.0.0".to_string(),
                port: 5200,
                max_connections: 10_000,
                max_buffer_size: 65_536,
            },
            http: HttpConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            delivery: DeliveryConfig {
                channel_capacity: 64,
                send_timeout: Duration::from_millis(2_000),
            },
            kafka: KafkaConfig {
                brokers: "127.0.0.1:9092".to_string(),
                group: "message-relay".to_string(),
                topics: Topic::ALL.iter().map(|t| t.as_str().to_string()).collect(),
                session_timeout_ms: 30_000,
                metadata_timeout: Duration::from_millis(5_000),
            },
            backoff: BackoffConfig {
                initial: Duration::from_millis(200),
                max: Duration::from_millis(30_000),
            },
            membership: MembershipConfig {
                base_url: "http://127.0.0.1:8000".to_string(),
                username: "message-processor".to_string(),
                secret: "password".to_string(),
                timeout: Duration::from_millis(5_000),
            },
            storage: StorageConfig {
                backend: StorageBackend::Sled,
                path: "./data/relay".to_string(),
            },
        }
    }
}

fn millis(cm: &ConfigManager, key: &str, default: Duration) -> Duration {
    Duration::from_millis(cm.get_or(key, default.as_millis() as i64).max(0) as u64)
}

impl RelayConfig {
    /// 从配置管理器读取，缺省项使用默认值 / Read every section, defaulting missing keys
    pub fn load(cm: &ConfigManager) -> Self {
        let d = Self::default();
        let backend = match cm
            .get_or("storage.backend", "sled".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "memory" => StorageBackend::Memory,
            _ => StorageBackend::Sled,
        };

        Self {
            gateway: GatewayConfig {
                host: cm.get_or("gateway.host", d.gateway.host),
                port: cm.get_or("gateway.port", d.gateway.port as i64) as u16,
                max_connections: cm
                    .get_or("gateway.max_connections", d.gateway.max_connections as i64)
                    .max(0) as usize,
                max_buffer_size: cm
                    .get_or("gateway.max_buffer_size", d.gateway.max_buffer_size as i64)
                    .max(1) as usize,
            },
            http: HttpConfig {
                host: cm.get_or("http.host", d.http.host),
                port: cm.get_or("http.port", d.http.port as i64) as u16,
            },
            delivery: DeliveryConfig {
                channel_capacity: cm
                    .get_or("delivery.channel_capacity", d.delivery.channel_capacity as i64)
                    .max(1) as usize,
                send_timeout: millis(cm, "delivery.send_timeout_ms", d.delivery.send_timeout),
            },
            kafka: KafkaConfig {
                brokers: cm.get_or("kafka.brokers", d.kafka.brokers),
                group: cm.get_or("kafka.group", d.kafka.group),
                topics: cm.get_or("kafka.topics", d.kafka.topics),
                session_timeout_ms: cm
                    .get_or("kafka.session_timeout_ms", d.kafka.session_timeout_ms as i64)
                    .max(1) as u64,
                metadata_timeout: millis(cm, "kafka.metadata_timeout_ms", d.kafka.metadata_timeout),
            },
            backoff: BackoffConfig {
                initial: millis(cm, "ingest.backoff.initial_ms", d.backoff.initial),
                max: millis(cm, "ingest.backoff.max_ms", d.backoff.max),
            },
            membership: MembershipConfig {
                base_url: cm.get_or("membership.base_url", d.membership.base_url),
                username: cm.get_or("membership.username", d.membership.username),
                secret: cm.get_or("membership.secret", d.membership.secret),
                timeout: millis(cm, "membership.timeout_ms", d.membership.timeout),
            },
            storage: StorageConfig {
                backend,
                path: cm.get_or("storage.path", d.storage.path),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::config::ConfigSource;
    use ::config::FileFormat;

    fn manager(toml: &str) -> ConfigManager {
        ConfigManager::with_sources(vec![ConfigSource::String {
            content: toml.to_string(),
            format: FileFormat::Toml,
        }])
        .unwrap()
    }

    #[test]
    fn test_overrides_are_applied() {
        let cm = manager(
            r#"
            [gateway]
            port = 6000
            max_connections = 3

            [delivery]
            channel_capacity = 8
            send_timeout_ms = 150

            [kafka]
            topics = ["event-created"]

            [storage]
            backend = "memory"
            "#,
        );
        let cfg = RelayConfig::load(&cm);
        assert_eq!(cfg.gateway.port, 6000);
        assert_eq!(cfg.gateway.max_connections, 3);
        assert_eq!(cfg.delivery.channel_capacity, 8);
        assert_eq!(cfg.delivery.send_timeout, Duration::from_millis(150));
        assert_eq!(cfg.kafka.topics, vec!["event-created".to_string()]);
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_topics_default_to_every_known_topic() {
        let cm = manager("[kafka]\ngroup = \"g\"");
        let cfg = RelayConfig::load(&cm);
        assert_eq!(cfg.kafka.group, "g");
        assert_eq!(cfg.kafka.topics.len(), Topic::ALL.len());
        assert!(cfg.kafka.topics.iter().any(|t| t == "image-user-attached"));
    }
}
