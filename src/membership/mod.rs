//! 成员关系解析 / Membership resolution
//!
//! 事件成员由后端事件服务维护，这里只做查询。
//! Event membership lives in the backend event service; this module only asks.

use async_trait::async_trait;

use crate::error::ResolveError;

pub mod http;

pub use http::HttpMembershipResolver;

/// 成员关系查询接口 / Membership lookup contract
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    /// 用户所属事件 / Events a user belongs to
    async fn events_for_user(&self, user_id: i64) -> Result<Vec<i64>, ResolveError>;

    /// 事件成员 / Members of an event
    async fn users_for_event(&self, event_id: i64) -> Result<Vec<i64>, ResolveError>;
}
