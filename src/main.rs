//! Entry point: loads config, brings up every upstream service and
//! downstream endpoint, and serves the aggregated catalog over HTTP.

mod cli;
mod rest_admin;
mod state;
mod streamable;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use clap::Parser;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use relay_mcp::{
    EndpointManager, EventBus, HealthCheckConfig, HealthChecker, MessageHandler, PerformanceMonitor, RelayConfig,
    ServiceManager, TaskCache, ToolCallRingLog,
};

use state::AppState;
use streamable::SessionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let args = cli::Args::parse();
    let config = RelayConfig::from_file(&args.config).await?.with_env_proxy();

    let events = Arc::new(EventBus::new());
    let manager = Arc::new(ServiceManager::new(config.tools_config.clone(), config.proxy.clone(), Arc::clone(&events)));

    for (public_name, tool_cfg) in &config.custom_mcp_tools {
        manager.custom_tools().insert_manual(public_name.clone(), tool_cfg.clone());
    }

    for server in &config.mcp_servers {
        manager.add_service_config(server.clone())?;
    }

    let cache = Arc::new(TaskCache::new());
    let log = Arc::new(ToolCallRingLog::new(config.tool_call_log_config.capacity.max(1)));
    let metrics = Arc::new(PerformanceMonitor::new());
    let handler = Arc::new(MessageHandler::new(
        Arc::clone(&manager),
        Arc::clone(&cache),
        Arc::clone(&log),
        Arc::clone(&metrics),
    ));
    let endpoints = Arc::new(EndpointManager::new(Arc::clone(&handler), Arc::clone(&events)));
    let health = Arc::new(HealthChecker::new(
        Arc::clone(&manager),
        Arc::clone(&metrics),
        HealthCheckConfig::default(),
    ));

    for server in &config.mcp_servers {
        if let Err(e) = manager.start_service(&server.name).await {
            if server.required {
                return Err(e.into());
            }
            tracing::warn!(service = %server.name, error = %e, "initial connect failed, will rely on health checks");
        }
    }

    for endpoint_url in &config.mcp_endpoints {
        endpoints.add_endpoint(endpoint_url.clone(), None)?;
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(Arc::clone(&health).run(shutdown_rx));

    let cleanup_cache = Arc::clone(&cache);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let dropped = cleanup_cache.cleanup();
            if dropped > 0 {
                tracing::debug!(dropped, "swept stale task-cache entries");
            }
        }
    });

    let state = AppState {
        manager: Arc::clone(&manager),
        endpoints: Arc::clone(&endpoints),
        handler: Arc::clone(&handler),
        cache: Arc::clone(&cache),
        metrics: Arc::clone(&metrics),
        health: Arc::clone(&health),
        sessions: Arc::new(SessionRegistry::default()),
    };

    let app = Router::new()
        .route("/mcp", get(streamable::get_mcp).post(streamable::post_mcp))
        .route("/api/mcp-servers", get(rest_admin::list_servers).post(rest_admin::add_servers))
        .route(
            "/api/mcp-servers/{name}",
            delete(rest_admin::remove_server),
        )
        .route("/api/mcp-servers/{name}/status", get(rest_admin::server_status))
        .route("/api/endpoints", get(rest_admin::endpoint_status))
        .route("/api/endpoints/add", post(rest_admin::add_endpoint))
        .route("/api/endpoints/remove", post(rest_admin::remove_endpoint))
        .route("/api/endpoints/connect", post(rest_admin::connect_endpoint))
        .route("/api/endpoints/disconnect", post(rest_admin::disconnect_endpoint))
        .route("/api/endpoints/reconnect", post(rest_admin::reconnect_endpoint))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(60)))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    tracing::info!(bind = %args.bind, "mcp-relay listening");

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });
    serve.await?;

    Ok(())
}
