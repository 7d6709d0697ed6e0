use actix_web::http::StatusCode;
use actix_web::{web, Responder};

use crate::api::response::respond_any;
use crate::server::RelayServer;

// 路由注册入口（GET）
// Route registration entry (GET)
pub fn register(cfg: &mut web::ServiceConfig, path: &str) {
    cfg.service(web::resource(path).route(web::get().to(connection_list_handle)));
}

// 获取 WebSocket 连接列表
// Get WebSocket connection list
pub async fn connection_list_handle(server: web::Data<RelayServer>) -> impl Responder {
    respond_any(StatusCode::OK, server.online_connections())
}
