//! intent-hub HTTP server binary.
//!
//! # Environment Variables
//!
//! - `INTENT_HUB_CONFIG` — Path to a YAML config file (optional)
//! - `INTENT_HUB_ENV` — `production` (default) or `development`
//! - `INTENT_HUB_DIAGNOSTICS` — Verbose diagnostics (`true`/`false`)
//! - `PORT` — HTTP port (default: 8080)
//! - `GRAPH_BASE_URL`, `GRAPH_ACCESS_TOKEN` — Graph endpoint and static token
//! - `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET` — client credentials
//! - `RUST_LOG` — Tracing filter (default: "info")
//!
//! # Usage
//!
//! ```bash
//! GRAPH_ACCESS_TOKEN=... cargo run --bin server
//! ```

use std::sync::Arc;

use intent_hub::config::HubConfig;
use intent_hub::interfaces::{CacheClient, GraphApiClient, GraphClient, InMemoryCache};
use intent_hub::server::{app_router, AppState};
use intent_hub::Hub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = HubConfig::load()?;

    // Initialize tracing
    let default_filter = if config.diagnostics_enabled() {
        "info,intent_hub=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let graph: Option<Arc<dyn GraphClient>> = if config.graph.has_credentials() {
        match GraphApiClient::from_config(&config.graph) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::error!("Graph client unavailable: {}", e);
                None
            }
        }
    } else {
        tracing::warn!("No Graph credentials configured; built-in modules will not start");
        None
    };
    let cache: Arc<dyn CacheClient> = Arc::new(InMemoryCache::new());

    let hub = Arc::new(Hub::new(config.clone()));
    let report = hub
        .register_builtin_modules(hub.dependencies(graph, Some(cache)))
        .await;
    tracing::info!(
        "Modules registered: [{}], skipped: [{}], failed: {}",
        report.registered.join(", "),
        report.skipped.join(", "),
        report.failed.len()
    );

    let app = app_router(AppState::new(hub));
    let bind_addr = config.server.bind_addr();

    tracing::info!("intent-hub server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health       — liveness probe");
    tracing::info!("  GET  /capabilities — routable intents");
    tracing::info!("  GET  /modules      — registered modules");
    tracing::info!("  POST /intents      — intent dispatch");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
