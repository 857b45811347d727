//! Health check endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::reports::QueueState;
use crate::state::AppState;
use crate::stats::StatsSnapshot;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    redis: bool,
    reports: QueueState,
}

impl ReadyResponse {
    /// Serving needs Redis for attempt state and a live report worker
    fn is_ready(&self) -> bool {
        self.redis && self.reports.draining
    }
}

/// Readiness: Redis reachable and the report queue being drained.
/// The body is returned either way so callers can see which part is down.
pub async fn ready_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadyResponse>) {
    let ready = ReadyResponse {
        redis: check_redis(&state).await,
        reports: state.reports.queue_state(),
    };
    let status = if ready.is_ready() {
        StatusCode::OK
    } else {
        tracing::warn!(redis = ready.redis, reports = ?ready.reports, "Not ready");
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ready))
}

async fn check_redis(state: &AppState) -> bool {
    let mut conn = state.redis.clone();
    let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
    result.is_ok()
}

#[derive(Serialize)]
pub struct MetricsResponse {
    uptime_secs: u64,
    live_sessions: usize,
    server_validation: bool,
    #[serde(flatten)]
    counters: StatsSnapshot,
}

/// Metrics endpoint (for monitoring)
pub async fn metrics(
    State(state): State<AppState>,
) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        uptime_secs: state.started_at.elapsed().as_secs(),
        live_sessions: state.sessions.len().await,
        server_validation: state.config.engine.server_validation,
        counters: state.stats.snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(draining: bool) -> QueueState {
        QueueState { queued: 3, capacity: 1024, draining }
    }

    #[test]
    fn test_ready_needs_redis_and_report_worker() {
        assert!(ReadyResponse { redis: true, reports: queue(true) }.is_ready());
        assert!(!ReadyResponse { redis: false, reports: queue(true) }.is_ready());
        assert!(!ReadyResponse { redis: true, reports: queue(false) }.is_ready());

        let json = serde_json::to_value(ReadyResponse { redis: true, reports: queue(true) }).unwrap();
        assert_eq!(json["reports"]["queued"], 3);
        assert_eq!(json["reports"]["draining"], true);
    }
}
