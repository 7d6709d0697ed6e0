use thiserror::Error;

/// 记录解码错误 / Record decode error
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unrecognized topic: {0}")]
    UnknownTopic(String),

    #[error("malformed payload on topic {topic}: {source}")]
    Malformed {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 消息存储错误 / Message store error
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("message {0} not found")]
    NotFound(u64),
}

/// 成员关系解析错误 / Membership resolution error
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid response body from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("login to membership service failed: {0}")]
    Login(String),
}

/// 路由错误 / Routing error
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RouteError {
    #[error("message has neither eventId nor receiverId")]
    NoTarget,

    #[error("message targets both event {event_id} and user {receiver_id}")]
    AmbiguousTarget { event_id: i64, receiver_id: i64 },
}

/// 日志源错误 / Log source error
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("connect to {brokers} failed: {cause}")]
    Connect { brokers: String, cause: String },

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("commit {topic}[{partition}]@{offset} failed: {cause}")]
    Commit {
        topic: String,
        partition: i32,
        offset: i64,
        cause: String,
    },

    #[error("source closed")]
    Closed,
}

/// 网关错误 / Gateway error
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection rejected: {0}")]
    Rejected(String),

    #[error("malformed frame: {0}")]
    Frame(String),
}

/// 统一的服务错误类型 / Unified relay error type
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("config error: {0}")]
    Config(#[from] crate::comm::config::ConfigError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RelayError {
    /// 获取错误代码 / Error code for logs and ops responses
    pub fn error_code(&self) -> i32 {
        match self {
            RelayError::Config(_) => 1001,
            RelayError::Decode(_) => 1002,
            RelayError::Store(_) => 1003,
            RelayError::Resolve(_) => 1004,
            RelayError::Route(_) => 1005,
            RelayError::Source(_) => 1006,
            RelayError::Gateway(_) => 1007,
            RelayError::Io(_) => 1008,
            RelayError::Internal(_) => 1000,
        }
    }
}

/// 服务结果类型 / Relay result type
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct_per_boundary() {
        let route: RelayError = RouteError::NoTarget.into();
        let store: RelayError = StoreError::NotFound(7).into();
        assert_eq!(route.error_code(), 1005);
        assert_eq!(store.error_code(), 1003);
        assert_eq!(store.to_string(), "message 7 not found");
    }

    #[test]
    fn test_ambiguous_target_message_names_both_ids() {
        let err = RouteError::AmbiguousTarget {
            event_id: 42,
            receiver_id: 7,
        };
        assert_eq!(err.to_string(), "message targets both event 42 and user 7");
    }
}
