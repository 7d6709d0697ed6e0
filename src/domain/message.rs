use serde::{Deserialize, Serialize};
use std::fmt;

/// 用户间消息通道名 / Channel tag for user-to-user messages
pub const MESSAGE_CHANNEL: &str = "message";
/// 错误通知通道名 / Channel tag for error notices
pub const ERROR_CHANNEL: &str = "error";
/// 同时指定事件与用户时的错误说明 / Reason sent back for a doubly-targeted message
pub const BOTH_TARGETS_REASON: &str = "Unable to send message both to event and user";

/// 存储分配的消息标识 / Identifier assigned by the message store
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreId(pub u64);

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 事件消息信封 / Event message envelope
///
/// 队列记录与客户端消息共用同一结构。`delivered` 与 `store_id` 仅服务端内部使用，
/// 不会出现在线路上，入站时也会被忽略。
/// Shared by log-derived and client-originated messages. `delivered` and
/// `store_id` are server-internal: never serialized, ignored on input.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    #[serde(default)]
    pub channel: String,
    #[serde(default, alias = "eventID")]
    pub event_id: i64,
    #[serde(default, alias = "senderID")]
    pub sender_id: i64,
    #[serde(default, alias = "receiverID")]
    pub receiver_id: i64,
    #[serde(skip)]
    pub delivered: bool,
    #[serde(default)]
    pub body: serde_json::Value,
    #[serde(skip)]
    pub store_id: Option<StoreId>,
}

/// 消息投递目标 / Where a message is headed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// 单个用户 / A single user
    User(i64),
    /// 事件全体成员，跳过 `skip` 中的用户 / Every member of an event except `skip`
    Event { event_id: i64, skip: Vec<i64> },
}

/// 一次路由请求 / One unit of routing work
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub target: Target,
    pub message: EventMessage,
}

impl EventMessage {
    /// 构建系统消息 / Build a system-generated message for a log record
    pub fn from_record(channel: &str, body: serde_json::Value) -> Self {
        Self {
            channel: channel.to_string(),
            body,
            ..Default::default()
        }
    }

    /// 错误通知帧 / Error notice addressed to `user_id`
    pub fn error_notice(user_id: i64, reason: &str) -> Self {
        Self {
            channel: ERROR_CHANNEL.to_string(),
            receiver_id: user_id,
            body: serde_json::Value::String(reason.to_string()),
            ..Default::default()
        }
    }

    pub fn has_both_targets(&self) -> bool {
        self.event_id != 0 && self.receiver_id != 0
    }

    pub fn is_notice(&self) -> bool {
        self.channel == ERROR_CHANNEL
    }

    /// 标记为客户端发出 / Stamp a client frame before routing
    pub fn stamp_from_client(&mut self, user_id: i64) {
        self.sender_id = user_id;
        self.delivered = false;
        self.channel = MESSAGE_CHANNEL.to_string();
        self.store_id = None;
    }

    /// 指向某个成员的副本 / Copy addressed to one event member
    pub fn for_member(&self, member_id: i64) -> Self {
        let mut copy = self.clone();
        copy.receiver_id = member_id;
        copy.delivered = false;
        copy.store_id = None;
        copy
    }

    /// 根据字段推导目标 / Derive the target from the id fields
    ///
    /// 恰好一个目标时返回 `Some` / `Some` only when exactly one of the ids is set
    pub fn target(&self) -> Option<Target> {
        match (self.event_id, self.receiver_id) {
            (0, 0) => None,
            (0, receiver) => Some(Target::User(receiver)),
            (event_id, 0) => {
                let skip = if self.sender_id != 0 {
                    vec![self.sender_id]
                } else {
                    Vec::new()
                };
                Some(Target::Event { event_id, skip })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_internal_fields_never_reach_the_wire() {
        let msg = EventMessage {
            channel: "message".into(),
            receiver_id: 3,
            delivered: true,
            store_id: Some(StoreId(9)),
            body: json!("hi"),
            ..Default::default()
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"channel":"message","eventId":0,"senderId":0,"receiverId":3,"body":"hi"})
        );
    }

    #[test]
    fn test_inbound_internal_fields_are_ignored() {
        let msg: EventMessage =
            serde_json::from_str(r#"{"receiverId":5,"delivered":true,"storeId":4,"body":{"a":1}}"#)
                .unwrap();
        assert_eq!(msg.receiver_id, 5);
        assert!(!msg.delivered);
        assert_eq!(msg.store_id, None);
        assert_eq!(msg.body, json!({"a":1}));
    }

    #[test]
    fn test_legacy_field_casing_is_accepted() {
        let msg: EventMessage =
            serde_json::from_str(r#"{"eventID":12,"senderID":1,"body":"x"}"#).unwrap();
        assert_eq!(msg.event_id, 12);
        assert_eq!(msg.sender_id, 1);
    }

    #[test]
    fn test_target_derivation() {
        let mut msg = EventMessage::default();
        assert_eq!(msg.target(), None);

        msg.receiver_id = 4;
        assert_eq!(msg.target(), Some(Target::User(4)));

        msg.event_id = 8;
        assert!(msg.has_both_targets());
        assert_eq!(msg.target(), None);

        msg.receiver_id = 0;
        msg.sender_id = 2;
        assert_eq!(
            msg.target(),
            Some(Target::Event {
                event_id: 8,
                skip: vec![2]
            })
        );
    }

    #[test]
    fn test_stamp_from_client_overrides_spoofed_fields() {
        let mut msg: EventMessage =
            serde_json::from_str(r#"{"channel":"event-created","senderId":99,"receiverId":2}"#)
                .unwrap();
        msg.stamp_from_client(7);
        assert_eq!(msg.sender_id, 7);
        assert_eq!(msg.channel, MESSAGE_CHANNEL);
        assert!(!msg.delivered);
    }

    #[test]
    fn test_error_notice_shape() {
        let notice = EventMessage::error_notice(11, BOTH_TARGETS_REASON);
        assert!(notice.is_notice());
        assert_eq!(notice.receiver_id, 11);
        assert_eq!(notice.body, json!(BOTH_TARGETS_REASON));
    }
}
