use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::MembershipResolver;
use crate::config::MembershipConfig;
use crate::error::ResolveError;

const LOGIN_PATH: &str = "/user/login/";
const EVENTS_BY_MEMBER_PATH: &str = "/event/get_ids_by_member_id/";
const USERS_BY_EVENT_PATH: &str = "/user/get_users_ids_by_event_id/";

fn is_ok(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::CREATED
}

/// 基于 HTTP 的成员解析器 / HTTP membership resolver
///
/// 登录令牌首次使用时获取并缓存，收到 401 时清除。
/// The login token is fetched on first use, cached, and dropped on a 401.
pub struct HttpMembershipResolver {
    client: reqwest::Client,
    base_url: String,
    username: String,
    secret: String,
    token: RwLock<Option<String>>,
}

impl HttpMembershipResolver {
    pub fn new(config: &MembershipConfig) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            secret: config.secret.clone(),
            token: RwLock::new(None),
        })
    }

    async fn token(&self) -> Result<String, ResolveError> {
        let cached = self.token.read().clone();
        if let Some(token) = cached {
            return Ok(token);
        }

        info!("🔑 logging in to membership service at {}", self.base_url);
        let url = format!("{}{}", self.base_url, LOGIN_PATH);
        let resp = self
            .client
            .get(&url)
            .query(&[("username", self.username.as_str()), ("secret", self.secret.as_str())])
            .send()
            .await?;
        let status = resp.status();
        if !is_ok(status) {
            warn!("membership login failed with status {}, retrying on next request", status);
            return Err(ResolveError::Login(format!("status {}", status.as_u16())));
        }
        let token = resp.text().await?.trim().to_string();
        if token.is_empty() {
            return Err(ResolveError::Login("empty token".to_string()));
        }
        *self.token.write() = Some(token.clone());
        Ok(token)
    }

    async fn fetch_ids(&self, path: &str, id: i64) -> Result<Vec<i64>, ResolveError> {
        let token = self.token().await?;
        let url = format!("{}{}{}/", self.base_url, path, id);
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, token)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            self.token.write().take();
        }
        if !is_ok(status) {
            return Err(ResolveError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = resp.bytes().await?;
        serde_json::from_slice::<Vec<i64>>(&body).map_err(|e| ResolveError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl MembershipResolver for HttpMembershipResolver {
    async fn events_for_user(&self, user_id: i64) -> Result<Vec<i64>, ResolveError> {
        let events = self.fetch_ids(EVENTS_BY_MEMBER_PATH, user_id).await?;
        debug!("user {} belongs to {} events", user_id, events.len());
        Ok(events)
    }

    async fn users_for_event(&self, event_id: i64) -> Result<Vec<i64>, ResolveError> {
        self.fetch_ids(USERS_BY_EVENT_PATH, event_id).await
    }
}
