use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use encore_server::cache::RedisCache;
use encore_server::config::{AppConfig, CliArgs};
use encore_server::jobs::{JobContext, JobRunner, PopularTracksRefreshJob};
use encore_server::metrics;
use encore_server::push::PushEngine;
use encore_server::recs::RecommendationPipeline;
use encore_server::server::websocket::SessionRegistry;
use encore_server::server::{make_metrics_app, run_server, ServerState};
use encore_server::store::PgRecommendationStore;

/// Bound on the shared Postgres pool.
const MAX_STORE_CONNECTIONS: u32 = 20;

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let config = AppConfig::resolve(&cli_args);
    metrics::register_metrics();

    let store = Arc::new(
        PgRecommendationStore::connect(&config.database_url, MAX_STORE_CONNECTIONS)
            .await
            .context("Failed to connect to the track store")?,
    );
    info!("Connected to PostgreSQL");

    let cache = Arc::new(
        RedisCache::connect(&config.redis_url).context("Failed to create the cache client")?,
    );
    info!("Connected to Redis");

    let pipeline = Arc::new(RecommendationPipeline::new(
        store.clone(),
        cache,
        config.clone(),
    ));
    let registry = Arc::new(SessionRegistry::new());
    let push = Arc::new(PushEngine::new(
        registry.clone(),
        pipeline.clone(),
        config.clone(),
    ));

    // Background jobs
    let cancellation_token = CancellationToken::new();
    let mut job_runner = JobRunner::new(JobContext {
        cancellation_token: cancellation_token.clone(),
        store: store.clone(),
    });
    job_runner.register(Arc::new(PopularTracksRefreshJob::new(
        config.popular_refresh_interval,
    )));
    let job_handles = job_runner.spawn();

    // Metrics listener
    let metrics_addr = format!("{}:{}", config.host, config.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .context("Failed to bind the metrics port")?;
    info!("Metrics server listening on {}", metrics_addr);
    let metrics_shutdown = cancellation_token.clone();
    tokio::spawn(async move {
        let _ = axum::serve(metrics_listener, make_metrics_app())
            .with_graceful_shutdown(async move { metrics_shutdown.cancelled().await })
            .await;
    });

    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        store,
        pipeline,
        push,
        registry,
    };

    run_server(state, shutdown_signal()).await?;

    // Stop background work and wait for it to wind down.
    cancellation_token.cancel();
    for handle in job_handles {
        let _ = handle.await;
    }
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
