//! # Gatehouse - Smudge challenge service
//!
//! Hosts blurred digit-sequence challenges, persists per-scope attempt
//! lockouts in Redis, answers the remote verification contract, and collects
//! abuse reports.
//!
//! ## Architecture
//! ```text
//! Widget → Gatehouse → smudge-engine (scoring, sequence, lockout)
//!              ↓
//!           Redis (attempts:{scope}:*, bot reports)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod attempts;
mod config;
mod reports;
mod routes;
mod sessions;
mod state;
mod stats;
mod verifier;

use config::AppConfig;
use reports::{ReportSink, report_worker};
use sessions::session_sweeper;
use state::AppState;
use stats::GatehouseStats;

/// Smudge Gatehouse - challenge service
#[derive(Parser, Debug)]
#[command(name = "gatehouse")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/gatehouse.toml")]
    config: String,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Route completed sequences through the verifier
    #[arg(long, env = "SERVER_VALIDATION")]
    server_validation: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting Smudge Gatehouse v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;
    info!(
        path = %args.config,
        digits = config.engine.digits,
        threshold = config.engine.trust_threshold,
        server_validation = config.engine.server_validation,
        "Configuration loaded"
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let redis = AppState::connect_redis(&config.redis_url).await?;
    info!("Redis connected: {}", config.redis_url);

    let stats = Arc::new(GatehouseStats::default());

    // Abuse-report worker
    let (reports, report_rx) = ReportSink::channel(config.reports.queue_capacity, stats.clone());
    tokio::spawn(report_worker(
        report_rx,
        redis.clone(),
        config.reports.list_cap,
        stats.clone(),
        shutdown_tx.subscribe(),
    ));

    let state = AppState::new(config.clone(), redis, reports, stats.clone());

    // Idle-session sweeper
    tokio::spawn(session_sweeper(
        state.sessions.clone(),
        stats,
        config.sessions.idle_ttl(),
        config.sessions.sweep_interval(),
        shutdown_tx.subscribe(),
    ));

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Gatehouse listening on {}", config.listen_addr);

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Gatehouse shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to install JSON subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .context("Failed to install subscriber")?;
    }

    Ok(())
}
