//! MailCRM - dispatch service entry point
//!
//! `mailcrm` (or `mailcrm serve`) runs the API and, when enabled, the
//! embedded due-email poller. `mailcrm dispatch-due` runs a single due pass
//! and exits, for deployments that drive the scheduler from cron.

use anyhow::{bail, Result};
use axum::http::HeaderValue;
use chrono::Utc;
use mailcrm_api::{create_router, AppState};
use mailcrm_common::config::{Config, LoggingConfig};
use mailcrm_core::{gateway, Metrics};
use mailcrm_storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_logging(&config.logging);

    let command = std::env::args().nth(1).unwrap_or_else(|| "serve".to_string());

    info!("Starting MailCRM ({})...", command);

    let store = Store::connect(&config.database).await?;
    info!("Storage backend '{}' ready", config.database.backend);

    let gateway = gateway::from_config(&config.gateway, &config.server.hostname)?;
    info!("Delivery gateway: {}", gateway.name());

    let metrics = Arc::new(Metrics::new()?);
    let state = AppState::new(&config, store, gateway, metrics);

    match command.as_str() {
        "serve" => serve(config, state).await,
        "dispatch-due" => {
            let summary = state.poller(&config).run_due_pass(Utc::now()).await?;
            info!(
                "Due pass complete: {} attempted, {} sent, {} failed, {} skipped",
                summary.attempted, summary.sent, summary.failed, summary.skipped
            );
            Ok(())
        }
        other => bail!("Unknown command: {} (expected serve or dispatch-due)", other),
    }
}

async fn serve(config: Config, state: AppState) -> Result<()> {
    let poller_handle = if config.scheduler.embedded {
        let poller = Arc::new(state.poller(&config));
        let interval = Duration::from_secs(config.scheduler.poll_interval_secs.max(1));
        info!(
            "Starting embedded due-email poller (every {}s)",
            interval.as_secs()
        );
        Some(tokio::spawn(poller.run(interval)))
    } else {
        info!("Embedded poller disabled; run `mailcrm dispatch-due` externally");
        None
    };

    let mut app = create_router(Arc::new(state));
    if let Some(cors) = cors_layer(&config.api.cors_origins) {
        app = app.layer(cors);
    }

    let addr = format!("{}:{}", config.server.bind_address, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Starting API server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = poller_handle {
        handle.abort();
    }

    info!("MailCRM shutdown complete");
    Ok(())
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},mailcrm=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
