use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::{debug, error, warn};

use crate::domain::message::{Dispatch, EventMessage, Target};
use crate::error::RouteError;
use crate::membership::MembershipResolver;
use crate::registry::ConnectionRegistry;
use crate::storage::MessageStore;

/// 路由结果统计 / Outcome counts for one routing call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RouteReport {
    pub delivered: usize, // 写入在线通道 / Handed to a live channel
    pub persisted: usize, // 落库待重放 / Stored for replay
    pub failed: usize,    // 落库失败 / Store rejected the message
}

impl RouteReport {
    fn merge(&mut self, other: RouteReport) {
        self.delivered += other.delivered;
        self.persisted += other.persisted;
        self.failed += other.failed;
    }
}

enum Outcome {
    Delivered,
    Persisted,
    Failed,
    Skipped,
}

impl From<Outcome> for RouteReport {
    fn from(outcome: Outcome) -> Self {
        let mut report = RouteReport::default();
        match outcome {
            Outcome::Delivered => report.delivered = 1,
            Outcome::Persisted => report.persisted = 1,
            Outcome::Failed => report.failed = 1,
            Outcome::Skipped => {}
        }
        report
    }
}

/// 消息路由器 / Message router
///
/// 单用户直投，事件消息按成员扇出；收件人不在线、通道已满或已关闭时落库。
/// Direct delivery for single users, fan-out for events; anything that cannot
/// reach a live channel within the send timeout is persisted.
#[derive(Clone)]
pub struct Router {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn MessageStore>,
    resolver: Arc<dyn MembershipResolver>,
    send_timeout: Duration,
}

impl Router {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn MessageStore>,
        resolver: Arc<dyn MembershipResolver>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            resolver,
            send_timeout,
        }
    }

    /// 按消息字段路由 / Route using the message's own id fields
    pub async fn route(&self, message: EventMessage) -> Result<RouteReport, RouteError> {
        if message.has_both_targets() {
            return Err(RouteError::AmbiguousTarget {
                event_id: message.event_id,
                receiver_id: message.receiver_id,
            });
        }
        let target = message.target().ok_or(RouteError::NoTarget)?;
        Ok(self.dispatch(Dispatch { target, message }).await)
    }

    /// 按显式目标路由 / Route to an explicit target
    pub async fn dispatch(&self, dispatch: Dispatch) -> RouteReport {
        match dispatch.target {
            Target::User(user_id) => self.deliver(user_id, dispatch.message).await.into(),
            Target::Event { event_id, skip } => self.fan_out(event_id, &skip, dispatch.message).await,
        }
    }

    async fn fan_out(&self, event_id: i64, skip: &[i64], mut message: EventMessage) -> RouteReport {
        let members = match self.resolver.users_for_event(event_id).await {
            Ok(members) => members,
            Err(e) => {
                warn!("⚠️  resolving members of event {} failed: {}, storing message", event_id, e);
                message.receiver_id = 0;
                return self.persist(message).into();
            }
        };

        let mut report = RouteReport::default();
        let mut seen: Vec<i64> = Vec::with_capacity(members.len());
        for member in members {
            if member == 0 || seen.contains(&member) {
                continue;
            }
            seen.push(member);
            if skip.contains(&member) {
                continue;
            }
            report.merge(self.deliver(member, message.for_member(member)).await.into());
        }
        debug!(
            "📢 event {} fan-out: delivered={} persisted={} failed={}",
            event_id, report.delivered, report.persisted, report.failed
        );
        report
    }

    async fn deliver(&self, user_id: i64, message: EventMessage) -> Outcome {
        // 不回显给发送者 / Never echo a message back to its sender
        if message.sender_id != 0 && message.sender_id == user_id {
            debug!("skipping echo of user {}'s own message", user_id);
            return Outcome::Skipped;
        }
        let Some(sender) = self.registry.sender_for(user_id) else {
            return self.persist(message);
        };
        match sender.send_timeout(message, self.send_timeout).await {
            Ok(()) => {
                debug!("📤 delivered message to user {}", user_id);
                Outcome::Delivered
            }
            Err(SendTimeoutError::Timeout(message)) => {
                warn!(
                    "⏳ channel of user {} still full after {:?}, storing message",
                    user_id, self.send_timeout
                );
                self.persist(message)
            }
            Err(SendTimeoutError::Closed(message)) => {
                debug!("channel of user {} closed, storing message", user_id);
                self.persist(message)
            }
        }
    }

    fn persist(&self, mut message: EventMessage) -> Outcome {
        message.delivered = false;
        message.store_id = None;
        match self.store.persist(&message) {
            Ok(id) => {
                debug!("💾 stored message {} for user {} event {}", id, message.receiver_id, message.event_id);
                Outcome::Persisted
            }
            Err(e) => {
                error!(
                    "❌ failed to store message for user {} event {}: {}",
                    message.receiver_id, message.event_id, e
                );
                Outcome::Failed
            }
        }
    }
}
