//! Hosted challenge session endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::USER_AGENT},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use smudge_common::constants::headers::X_SMUDGE_SCOPE;
use smudge_common::{DeviceClass, Fingerprint, SmudgeError};
use smudge_engine::{
    ChallengeSession, FailureVerdict, FingerprintProbe, FingerprintSignals, MemoryStore,
    SessionPhase, SlotView, SubmitOutcome, TelemetryEvent, VerificationOutcome, format_countdown,
};

use super::{api_error, now_ms};
use crate::attempts;
use crate::sessions::{LiveSession, SessionObserver};
use crate::state::AppState;
use crate::stats::GatehouseStats;
use crate::verifier::await_verification;

/// Scope used when the caller gives neither a scope nor a fingerprint
const DEFAULT_SCOPE: &str = "global";

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct CreateChallenge {
    /// Persistence scope (one lockout per scope)
    scope: Option<String>,
    /// Raw browser signals; their digest is the default scope
    fingerprint: Option<FingerprintProbe>,
}

#[derive(Serialize)]
pub struct LockoutView {
    remaining_ms: u64,
    countdown: String,
}

#[derive(Serialize)]
pub struct ChallengeView {
    session_id: String,
    scope: String,
    #[serde(flatten)]
    phase: SessionPhase,
    slots: Vec<SlotView>,
    active_slot: usize,
    blur_level: u8,
    generation: u64,
    /// False until the first interaction opens slot 0
    started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    lockout: Option<LockoutView>,
}

impl ChallengeView {
    fn build(session_id: &str, scope: &str, session: &ChallengeSession<MemoryStore>, now: i64) -> Self {
        let lockout = session.lockout_remaining_ms(now).map(|remaining_ms| LockoutView {
            remaining_ms,
            countdown: format_countdown(remaining_ms),
        });

        Self {
            session_id: session_id.to_string(),
            scope: scope.to_string(),
            phase: session.phase(),
            slots: session.reveal(),
            active_slot: session.active_slot(),
            blur_level: session.difficulty().blur_level(),
            generation: session.generation(),
            started: session.metrics().started_at().is_some(),
            lockout,
        }
    }
}

/// Pick the persistence scope: explicit body field, then header, then the
/// fingerprint digest
fn resolve_scope(
    requested: Option<&str>,
    header: Option<&str>,
    fingerprint: Option<&Fingerprint>,
) -> Result<String, SmudgeError> {
    if let Some(scope) = requested.or(header) {
        return attempts::validate_scope(scope).map(str::to_string);
    }
    Ok(fingerprint.map_or_else(|| DEFAULT_SCOPE.to_string(), |fp| fp.digest()))
}

/// Create a new challenge session
pub async fn create_challenge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateChallenge>,
) -> Result<Json<ChallengeView>, StatusCode> {
    let now = now_ms();
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let header_scope = headers.get(X_SMUDGE_SCOPE).and_then(|v| v.to_str().ok());

    let device_class = DeviceClass::from_user_agent(user_agent);
    let fingerprint = payload.fingerprint.map(|probe| probe.capture(now));
    let scope = resolve_scope(payload.scope.as_deref(), header_scope, fingerprint.as_ref())
        .map_err(api_error)?;

    let session = {
        let lock = state.sessions.scope_lock(&scope).await;
        let _guard = lock.lock().await;
        let mut redis = state.redis.clone();

        let store = attempts::load(&mut redis, &scope).await.map_err(api_error)?;
        let mut session = ChallengeSession::new(
            state.config.engine.clone(),
            store,
            device_class,
            fingerprint,
            now,
        )
        .map_err(api_error)?
        .with_observer(SessionObserver::new(
            scope.clone(),
            state.stats.clone(),
            state.reports.clone(),
        ));

        // Opening may have cleared an expired lockout
        attempts::flush(&mut redis, &scope, session.store_mut())
            .await
            .map_err(api_error)?;
        session
    };

    let mut view = ChallengeView::build("", &scope, &session, now);
    let session_id = state.sessions.insert(LiveSession::new(session, scope)).await;
    GatehouseStats::incr(&state.stats.sessions_created);

    tracing::debug!(
        session_id = %session_id,
        scope = %view.scope,
        device = ?device_class,
        locked = view.lockout.is_some(),
        "Challenge session created"
    );

    view.session_id = session_id;
    Ok(Json(view))
}

async fn find(state: &AppState, id: &str) -> Result<Arc<Mutex<LiveSession>>, StatusCode> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| api_error(SmudgeError::SessionNotFound(id.to_string())))
}

/// Run `op` inside the scope's critical section: reload the persisted fields,
/// apply the engine call, write its changes back
async fn with_scope<T>(
    state: &AppState,
    live: &mut LiveSession,
    op: impl FnOnce(&mut ChallengeSession<MemoryStore>) -> T,
) -> Result<T, SmudgeError> {
    let lock = state.sessions.scope_lock(&live.scope).await;
    let _guard = lock.lock().await;
    let mut redis = state.redis.clone();

    attempts::refresh(&mut redis, &live.scope, live.session.store_mut()).await?;
    let out = op(&mut live.session);
    attempts::flush(&mut redis, &live.scope, live.session.store_mut()).await?;
    Ok(out)
}

/// Session status, leaving an elapsed lockout on the way
pub async fn get_challenge(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChallengeView>, StatusCode> {
    let live = find(&state, &id).await?;
    let mut live = live.lock().await;
    live.touch();

    let now = now_ms();
    if live.session.phase() != SessionPhase::Accepted {
        let expired = with_scope(&state, &mut live, |s| {
            s.sync_lockout(now);
            s.check_expiry(now)
        })
        .await
        .map_err(api_error)?;
        if expired {
            tracing::info!(session_id = %id, scope = %live.scope, "Lockout expired");
        }
    }

    Ok(Json(ChallengeView::build(&id, &live.scope, &live.session, now)))
}

#[derive(Deserialize)]
pub struct EventBatch {
    events: Vec<TelemetryEvent>,
}

#[derive(Serialize)]
pub struct EventsRecorded {
    recorded: usize,
}

/// Feed a batch of telemetry events into the current attempt
pub async fn record_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(batch): Json<EventBatch>,
) -> Result<Json<EventsRecorded>, StatusCode> {
    if batch.events.len() > state.config.sessions.max_event_batch {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    let live = find(&state, &id).await?;
    let mut live = live.lock().await;
    live.touch();

    let recorded = batch
        .events
        .iter()
        .filter(|event| live.session.record(event))
        .count();

    Ok(Json(EventsRecorded { recorded }))
}

#[derive(Deserialize)]
pub struct SubmitSlot {
    index: usize,
    value: String,
}

#[derive(Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SubmitResult {
    Ignored,
    InvalidInput { index: usize },
    Rejected { index: usize },
    Accepted { index: usize, next: usize },
    Pending,
    Passed { score: u8 },
    Failed { score: u8, threshold: u8, verdict: FailureVerdict },
}

impl From<SubmitOutcome> for SubmitResult {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Ignored => Self::Ignored,
            SubmitOutcome::InvalidInput { index } => Self::InvalidInput { index },
            SubmitOutcome::Rejected { index } => Self::Rejected { index },
            SubmitOutcome::Accepted { index, next } => Self::Accepted { index, next },
            SubmitOutcome::VerificationRequired { .. } => Self::Pending,
            SubmitOutcome::Passed { score } => Self::Passed { score },
            SubmitOutcome::Failed(report) => Self::Failed {
                score: report.score,
                threshold: report.threshold,
                verdict: report.verdict,
            },
        }
    }
}

#[derive(Serialize)]
pub struct SubmitResponse {
    #[serde(flatten)]
    result: SubmitResult,
    challenge: ChallengeView,
}

/// Submit one slot; a completed sequence is decided before returning
pub async fn submit_slot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SubmitSlot>,
) -> Result<Json<SubmitResponse>, StatusCode> {
    let live = find(&state, &id).await?;
    let mut live = live.lock().await;
    live.touch();

    let now = now_ms();
    let outcome = with_scope(&state, &mut live, |s| {
        s.sync_lockout(now);
        s.check_expiry(now);
        s.submit(payload.index, &payload.value, now)
    })
    .await
    .map_err(api_error)?;

    if let Some(err) = lockout_error(&live.session, &outcome, now) {
        return Err(api_error(err));
    }

    // The scope lock is released while the verifier runs; the session lock is not
    let outcome = match outcome {
        SubmitOutcome::VerificationRequired { ticket, request } => {
            let verifier = state.verifier.clone();
            let timeout = Duration::from_millis(state.config.engine.verification_timeout_ms);
            let result = await_verification(async move { Ok(verifier.verify(&request)) }, timeout).await;
            let verdict = VerificationOutcome::from(result);

            let now = now_ms();
            with_scope(&state, &mut live, |s| s.resolve_verification(ticket, verdict, now))
                .await
                .map_err(api_error)?
        }
        other => other,
    };

    let result = SubmitResult::from(outcome);
    let challenge = ChallengeView::build(&id, &live.scope, &live.session, now_ms());
    Ok(Json(SubmitResponse { result, challenge }))
}

/// Input that was ignored because the scope is cooling down
fn lockout_error(
    session: &ChallengeSession<MemoryStore>,
    outcome: &SubmitOutcome,
    now: i64,
) -> Option<SmudgeError> {
    match (outcome, session.phase()) {
        (SubmitOutcome::Ignored, SessionPhase::Locked { .. }) => Some(SmudgeError::Locked {
            remaining_ms: session.lockout_remaining_ms(now).unwrap_or(0),
        }),
        _ => None,
    }
}

/// Issue fresh digits for the current attempt
pub async fn reset_challenge(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChallengeView>, StatusCode> {
    let live = find(&state, &id).await?;
    let mut live = live.lock().await;
    live.touch();

    if !live.session.reset() {
        return Err(StatusCode::CONFLICT);
    }
    Ok(Json(ChallengeView::build(&id, &live.scope, &live.session, now_ms())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use smudge_engine::EngineConfig;

    #[test]
    fn test_resolve_scope_precedence() {
        let fingerprint = FingerprintProbe::default().capture(0);

        assert_eq!(resolve_scope(Some("form"), Some("hdr"), Some(&fingerprint)).unwrap(), "form");
        assert_eq!(resolve_scope(None, Some("hdr"), Some(&fingerprint)).unwrap(), "hdr");
        assert_eq!(resolve_scope(None, None, Some(&fingerprint)).unwrap(), fingerprint.digest());
        assert_eq!(resolve_scope(None, None, None).unwrap(), DEFAULT_SCOPE);
        assert!(resolve_scope(Some(" "), None, None).is_err());
    }

    #[test]
    fn test_view_and_result_serialization() {
        let session = ChallengeSession::new(
            EngineConfig::default(),
            MemoryStore::new(),
            DeviceClass::Desktop,
            None,
            0,
        )
        .unwrap();

        let view = serde_json::to_value(ChallengeView::build("abc", "global", &session, 0)).unwrap();
        assert_eq!(view["phase"], "interactive");
        assert_eq!(view["slots"].as_array().unwrap().len(), 4);
        assert_eq!(view["blur_level"], 6);
        assert!(view.get("lockout").is_none());

        let failed = SubmitResult::Failed {
            score: 12,
            threshold: 40,
            verdict: FailureVerdict::Warned { attempts: 1 },
        };
        let json = serde_json::to_value(failed).unwrap();
        assert_eq!(json["result"], "failed");
        assert_eq!(json["verdict"]["verdict"], "warned");
    }

    #[test]
    fn test_locked_view_has_countdown() {
        let store = MemoryStore::from_entries([("botAttempts", "5"), ("timeoutEnd", "90000")]);
        let session =
            ChallengeSession::new(EngineConfig::default(), store, DeviceClass::Desktop, None, 0).unwrap();

        let view = serde_json::to_value(ChallengeView::build("abc", "global", &session, 29_500)).unwrap();
        assert_eq!(view["phase"], "locked");
        assert_eq!(view["deadline_ms"], 90_000);
        assert_eq!(view["lockout"]["remaining_ms"], 60_500);
        assert_eq!(view["lockout"]["countdown"], "1:01");
        assert_eq!(view["started"], false);
    }

    #[test]
    fn test_submit_while_locked_is_refused() {
        let store = MemoryStore::from_entries([("botAttempts", "5"), ("timeoutEnd", "90000")]);
        let mut session =
            ChallengeSession::new(EngineConfig::default(), store, DeviceClass::Desktop, None, 0).unwrap();
        session.record(&TelemetryEvent::FirstInteraction { t: 0, touch: false });

        let outcome = session.submit(0, "1", 30_000);
        let err = lockout_error(&session, &outcome, 30_000).unwrap();
        assert!(matches!(err, SmudgeError::Locked { remaining_ms: 60_000 }));
        assert_eq!(api_error(err), StatusCode::LOCKED);

        // an ignored submit on an open session is not a lockout
        let mut open =
            ChallengeSession::new(EngineConfig::default(), MemoryStore::new(), DeviceClass::Desktop, None, 0)
                .unwrap();
        let outcome = open.submit(0, "1", 10);
        assert_eq!(outcome, SubmitOutcome::Ignored);
        assert!(lockout_error(&open, &outcome, 10).is_none());
    }
}
