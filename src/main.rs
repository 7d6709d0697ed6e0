use actix_web::{web, App, HttpServer};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use v_event_relay::comm::{get_global_config_manager, init_global_config_with_file, init_tracing};
use v_event_relay::ingest::run_kafka_ingest;
use v_event_relay::membership::{HttpMembershipResolver, MembershipResolver};
use v_event_relay::storage::open_store;
use v_event_relay::{RelayConfig, RelayResult, RelayServer};

/// 命令行参数 / Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "v-event-relay: Kafka events to WebSocket clients", long_about = None)]
pub struct Args {
    /// 指定配置文件路径（TOML/JSON/YAML自动识别）
    /// Specify config file path (auto-detect TOML/JSON/YAML)
    #[arg(short = 'c', long = "config")]
    config: Option<String>,
}

/// 启动运维 HTTP 服务 / Build the ops HTTP server
fn start_http_server(server: RelayServer) -> RelayResult<actix_web::dev::Server> {
    let addr = format!("{}:{}", server.config.http.host, server.config.http.port);
    let http = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(server.clone()))
            .configure(v_event_relay::api::configure)
    })
    .disable_signals()
    .bind(addr.clone())?
    .run();
    info!("🌐 HTTP server listening on http://{}", addr);
    Ok(http)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("❌ fatal error [{}]: {}", e.error_code(), e);
        eprintln!("v-event-relay: fatal error [{}]: {}", e.error_code(), e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> RelayResult<()> {
    // 如果提供配置文件路径则使用之，否则使用默认配置源
    // Use the given config file, or fall back to the default sources
    let cm = match &args.config {
        Some(path) => init_global_config_with_file(path)?,
        None => get_global_config_manager()?,
    };
    init_tracing()?;
    info!("🎯 Starting v-event-relay...");
    cm.print_sources_info();

    let config = RelayConfig::load(&cm);
    info!(
        "🔧 kafka={} group={} topics={:?}",
        config.kafka.brokers, config.kafka.group, config.kafka.topics
    );
    info!(
        "🔧 storage={:?} path={} membership={}",
        config.storage.backend, config.storage.path, config.membership.base_url
    );

    let store = open_store(&config.storage)?;
    let resolver: Arc<dyn MembershipResolver> =
        Arc::new(HttpMembershipResolver::new(&config.membership)?);
    let server = RelayServer::new(config, store, resolver);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 监听失败是致命错误 / Failing to bind either listener is fatal
    let listener = server.bind_gateway().await?;
    let mut http = start_http_server(server.clone())?;
    let http_handle = http.handle();

    let ingest = tokio::spawn(run_kafka_ingest(
        server.config.kafka.clone(),
        server.config.backoff.clone(),
        server.router.clone(),
        shutdown_rx.clone(),
        server.ingest_connected.clone(),
    ));
    let gateway = {
        let server = server.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { server.serve_gateway(listener, shutdown).await })
    };

    let mut http_done = false;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("❌ failed to listen for ctrl-c: {}", e);
            }
            info!("🛑 shutdown requested");
        }
        res = &mut http => {
            http_done = true;
            if let Err(e) = res {
                error!("❌ HTTP server error: {}", e);
            }
        }
    }

    let _ = shutdown_tx.send(true);
    if !http_done {
        http_handle.stop(true).await;
    }
    for (name, task) in [("gateway", gateway), ("ingest", ingest)] {
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            warn!("⚠️  {} did not stop within 5s", name);
        }
    }

    info!("✅ Server shutdown successfully");
    Ok(())
}
