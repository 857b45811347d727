//! Widget-facing contract endpoints: remote verification and abuse reports.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};

use smudge_common::{AbuseReport, VerificationRequest, VerificationResponse};

use crate::state::AppState;
use crate::stats::GatehouseStats;

/// Remote verification for widgets running their own engine
pub async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerificationRequest>,
) -> Json<VerificationResponse> {
    GatehouseStats::incr(&state.stats.verifications);
    let response = state.verifier.verify(&request);

    tracing::debug!(
        success = response.success,
        score = request.metrics.score,
        has_fingerprint = request.fingerprint.is_some(),
        "Verification answered"
    );
    Json(response)
}

/// Abuse-report intake. Queued for storage; the caller never waits on Redis.
pub async fn report_bot(
    State(state): State<AppState>,
    Json(report): Json<AbuseReport>,
) -> StatusCode {
    tracing::info!(score = report.score, attempts = report.attempts, "Abuse report received");

    if state.reports.submit(report) {
        StatusCode::ACCEPTED
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
