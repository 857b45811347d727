//! Application state and shared resources.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::reports::ReportSink;
use crate::sessions::SessionRegistry;
use crate::stats::GatehouseStats;
use crate::verifier::SummaryVerifier;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,

    /// Redis connection manager (auto-reconnecting)
    pub redis: ConnectionManager,

    /// Hosted challenge sessions
    pub sessions: Arc<SessionRegistry>,

    /// Verifier behind `/verify` and server-validated sessions
    pub verifier: Arc<SummaryVerifier>,

    /// Abuse-report queue
    pub reports: ReportSink,

    /// Runtime counters
    pub stats: Arc<GatehouseStats>,

    /// Process start, for uptime
    pub started_at: Instant,
}

impl AppState {
    /// Connect to Redis
    pub async fn connect_redis(redis_url: &str) -> Result<ConnectionManager> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")
    }

    /// Create new application state
    pub fn new(
        config: AppConfig,
        redis: ConnectionManager,
        reports: ReportSink,
        stats: Arc<GatehouseStats>,
    ) -> Self {
        let verifier = Arc::new(SummaryVerifier::new(&config.engine));

        Self {
            config: Arc::new(config),
            redis,
            sessions: Arc::new(SessionRegistry::new()),
            verifier,
            reports,
            stats,
            started_at: Instant::now(),
        }
    }
}
