// ============================================================================
// Edge Gateway Service
// ============================================================================
//
// Single entry point in front of the shop services:
// - per-client rate limiting (general / sensitive routes)
// - stateless bearer-token authentication
// - route-table authorization
//
// Rate-limit state lives in this process only. Each instance behind a load
// balancer enforces its own limits.
//
// ============================================================================

use anyhow::{Context, Result};
use edge_gateway::config::Config;
use edge_gateway::gateway::{GatewayState, build_router};
use edge_gateway::rate_limit::BucketRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.logging.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("=== Edge Gateway Starting ===");
    info!("Port: {}", config.port);
    info!(
        general = ?config.rate_limit.general,
        sensitive = ?config.rate_limit.sensitive,
        "Rate limits"
    );

    let state = Arc::new(GatewayState::from_config(&config)?);

    let sweeper = config.rate_limit.idle_eviction_after().map(|idle_for| {
        info!(
            idle_for_secs = idle_for.as_secs(),
            every_secs = config.rate_limit.sweep_interval_secs,
            "Idle bucket eviction enabled"
        );
        BucketRegistry::spawn_idle_sweeper(
            state.buckets.clone(),
            config.rate_limit.sweep_interval(),
            idle_for,
        )
    });

    let app = build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port)
        .parse()
        .context("Failed to parse bind address")?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Edge gateway listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!("Edge gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received. Draining connections...");
}
