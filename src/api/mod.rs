use actix_web::web;

pub mod response;
pub mod v1;

/// 路由配置 / Route configuration
pub fn configure(cfg: &mut web::ServiceConfig) {
    v1::health::live::register(cfg, "/v1/health/live");
    v1::health::ready::register(cfg, "/v1/health/ready");
    v1::connection::list::register(cfg, "/v1/connection/list");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::error::ResolveError;
    use crate::membership::MembershipResolver;
    use crate::server::RelayServer;
    use crate::storage::MemoryStore;
    use actix_web::{test, App};
    use async_trait::async_trait;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    struct NoMembers;

    #[async_trait]
    impl MembershipResolver for NoMembers {
        async fn events_for_user(&self, _user_id: i64) -> Result<Vec<i64>, ResolveError> {
            Ok(Vec::new())
        }
        async fn users_for_event(&self, _event_id: i64) -> Result<Vec<i64>, ResolveError> {
            Ok(Vec::new())
        }
    }

    fn relay() -> RelayServer {
        let mut config = RelayConfig::default();
        config.gateway.max_connections = 5;
        RelayServer::new(config, Arc::new(MemoryStore::new()), Arc::new(NoMembers))
    }

    #[actix_web::test]
    async fn test_live_is_always_ok() {
        let app = test::init_service(App::new().configure(configure)).await;
        let req = test::TestRequest::get().uri("/v1/health/live").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["alive"], true);
    }

    #[actix_web::test]
    async fn test_ready_follows_ingestion_state() {
        let server = relay();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(server.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/v1/health/ready").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);

        server.ingest_connected.store(true, Ordering::SeqCst);
        let req = test::TestRequest::get().uri("/v1/health/ready").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_connection_list() {
        let server = relay();
        let (_reg, _rx) = server.registry.register(12, "10.0.0.1:5000".parse().unwrap());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(server.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/v1/connection/list").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["totalCount"], 1);
        assert_eq!(body["maxConnections"], 5);
        assert_eq!(body["connections"][0]["userId"], 12);
        assert_eq!(body["connections"][0]["addr"], "10.0.0.1:5000");
        assert_eq!(body["connections"][0]["events"], serde_json::json!([]));
    }
}
