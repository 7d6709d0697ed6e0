//! 日志记录解码 / Log record decoding
//!
//! 主题名到记录形状是一个封闭映射，未知主题直接忽略。
//! Topic names map onto a closed set of record shapes; unknown topics are ignored.

use serde::Deserialize;
use std::fmt;

use crate::domain::message::{Dispatch, EventMessage, Target};
use crate::error::DecodeError;

/// 已知主题 / Known log topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    EventCreated,
    EventUpdated,
    EventDeleted,
    EventUserAdded,
    EventUserRemoved,
    UserRelationCreated,
    ImageAdded,
    ImageUserAttached,
}

impl Topic {
    pub const ALL: [Topic; 8] = [
        Topic::EventCreated,
        Topic::EventUpdated,
        Topic::EventDeleted,
        Topic::EventUserAdded,
        Topic::EventUserRemoved,
        Topic::UserRelationCreated,
        Topic::ImageAdded,
        Topic::ImageUserAttached,
    ];

    /// 主题名（区分大小写）/ Case-sensitive topic lookup
    pub fn from_name(name: &str) -> Option<Topic> {
        match name {
            "event-created" => Some(Topic::EventCreated),
            "event-updated" => Some(Topic::EventUpdated),
            "event-deleted" => Some(Topic::EventDeleted),
            "event-user-added" => Some(Topic::EventUserAdded),
            "event-user-removed" => Some(Topic::EventUserRemoved),
            "user-relation-created" => Some(Topic::UserRelationCreated),
            "image-added" => Some(Topic::ImageAdded),
            "image-user-attached" => Some(Topic::ImageUserAttached),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::EventCreated => "event-created",
            Topic::EventUpdated => "event-updated",
            Topic::EventDeleted => "event-deleted",
            Topic::EventUserAdded => "event-user-added",
            Topic::EventUserRemoved => "event-user-removed",
            Topic::UserRelationCreated => "user-relation-created",
            Topic::ImageAdded => "image-added",
            Topic::ImageUserAttached => "image-user-attached",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct EventActionRecord {
    #[serde(alias = "eventID")]
    pub event_id: i64,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct UserActionRecord {
    #[serde(alias = "receiverID")]
    pub receiver_id: i64,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct EventUserActionRecord {
    #[serde(alias = "eventID")]
    pub event_id: i64,
    #[serde(alias = "receiverID")]
    pub receiver_id: i64,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct MultipleUserEventActionRecord {
    #[serde(alias = "eventID")]
    pub event_id: i64,
    #[serde(alias = "receiversIDs", alias = "receiverIds")]
    pub user_ids: Vec<i64>,
}

/// 解码后的记录 / A decoded log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    EventAction(EventActionRecord),
    UserAction(UserActionRecord),
    EventUserAction(EventUserActionRecord),
    MultipleUserEventAction(MultipleUserEventActionRecord),
}

/// 按主题解码原始载荷 / Decode a raw payload according to its topic
pub fn decode(topic: &str, payload: &[u8]) -> Result<Record, DecodeError> {
    let known = Topic::from_name(topic).ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;
    let malformed = |source| DecodeError::Malformed {
        topic: topic.to_string(),
        source,
    };
    let record = match known {
        Topic::EventCreated | Topic::EventUpdated | Topic::EventDeleted => {
            Record::EventAction(serde_json::from_slice(payload).map_err(malformed)?)
        }
        Topic::UserRelationCreated => {
            Record::UserAction(serde_json::from_slice(payload).map_err(malformed)?)
        }
        Topic::EventUserAdded | Topic::EventUserRemoved => {
            Record::EventUserAction(serde_json::from_slice(payload).map_err(malformed)?)
        }
        Topic::ImageAdded | Topic::ImageUserAttached => {
            Record::MultipleUserEventAction(serde_json::from_slice(payload).map_err(malformed)?)
        }
    };
    Ok(record)
}

impl Record {
    /// 转换为路由任务 / Convert into routing work
    ///
    /// 每条消息的 body 为原始载荷文本，channel 为主题名。
    /// Every message carries the raw payload text as `body` and the topic as `channel`.
    pub fn into_dispatches(self, topic: &str, payload: &str) -> Vec<Dispatch> {
        let body = serde_json::Value::String(payload.to_string());
        let mut base = EventMessage::from_record(topic, body);
        let mut out = Vec::new();

        match self {
            Record::EventAction(r) => {
                if r.event_id != 0 {
                    base.event_id = r.event_id;
                    out.push(Dispatch {
                        target: Target::Event {
                            event_id: r.event_id,
                            skip: Vec::new(),
                        },
                        message: base,
                    });
                }
            }
            Record::UserAction(r) => {
                if r.receiver_id != 0 {
                    base.receiver_id = r.receiver_id;
                    out.push(Dispatch {
                        target: Target::User(r.receiver_id),
                        message: base,
                    });
                }
            }
            Record::EventUserAction(r) => {
                base.event_id = r.event_id;
                base.receiver_id = r.receiver_id;
                if r.receiver_id != 0 {
                    out.push(Dispatch {
                        target: Target::User(r.receiver_id),
                        message: base.clone(),
                    });
                }
                if r.event_id != 0 {
                    let skip = if r.receiver_id != 0 {
                        vec![r.receiver_id]
                    } else {
                        Vec::new()
                    };
                    out.push(Dispatch {
                        target: Target::Event {
                            event_id: r.event_id,
                            skip,
                        },
                        message: base,
                    });
                }
            }
            Record::MultipleUserEventAction(r) => {
                base.event_id = r.event_id;
                let mut users: Vec<i64> = Vec::with_capacity(r.user_ids.len());
                for id in r.user_ids.into_iter().filter(|id| *id != 0) {
                    if !users.contains(&id) {
                        users.push(id);
                    }
                }
                for id in &users {
                    out.push(Dispatch {
                        target: Target::User(*id),
                        message: base.for_member(*id),
                    });
                }
                if r.event_id != 0 {
                    out.push(Dispatch {
                        target: Target::Event {
                            event_id: r.event_id,
                            skip: users,
                        },
                        message: base,
                    });
                }
            }
        }
        out
    }
}
