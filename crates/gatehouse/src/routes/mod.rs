//! HTTP route handlers for Gatehouse.

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use smudge_common::SmudgeError;

use crate::state::AppState;

mod challenge;
mod health;
mod verify;

/// Upper bound on a single request, verification included
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/metrics", get(health::metrics))

        // Hosted challenge sessions
        .route("/challenge", post(challenge::create_challenge))
        .route("/challenge/{id}", get(challenge::get_challenge))
        .route("/challenge/{id}/events", post(challenge::record_events))
        .route("/challenge/{id}/submit", post(challenge::submit_slot))
        .route("/challenge/{id}/reset", post(challenge::reset_challenge))

        // Widget-facing contracts
        .route("/verify", post(verify::verify))
        .route("/report-bot", post(verify::report_bot))

        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}

/// Map an engine/service error to a response status, logging server faults
pub(crate) fn api_error(e: SmudgeError) -> StatusCode {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %e, status = status.as_u16(), "Request failed");
    } else {
        tracing::debug!(error = %e, status = status.as_u16(), "Request rejected");
    }
    status
}

/// Wall clock in epoch milliseconds
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status() {
        assert_eq!(api_error(SmudgeError::SessionNotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(api_error(SmudgeError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(api_error(SmudgeError::Redis("down".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(api_error(SmudgeError::Locked { remaining_ms: 10 }), StatusCode::LOCKED);
    }
}
