use actix_web::http::StatusCode;
use actix_web::{web, Responder};

use crate::api::response::respond_any;
use crate::server::RelayServer;

// 路由注册入口（GET）
// Route registration entry (GET)
pub fn register(cfg: &mut web::ServiceConfig, path: &str) {
    cfg.service(web::resource(path).route(web::get().to(health_ready_handle)));
}

// 就绪检查：摄取已连接且存储可用
// Readiness: ingestion connected and the store answers
pub async fn health_ready_handle(server: web::Data<RelayServer>) -> impl Responder {
    let ingest = server.is_ingest_connected();
    let store = server.is_store_healthy();
    let is_ready = ingest && store;
    let payload = serde_json::json!({
        "ready": is_ready,
        "service": "v-event-relay",
        "timestamp": chrono::Utc::now().timestamp_millis(),
        "ingest_connected": ingest,
        "store_healthy": store,
        "online_clients": server.registry.len()
    });
    let code = if is_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    respond_any(code, payload)
}
