//! One challenge instance.
//!
//! [`ChallengeSession`] wires the aggregator, scorer, sequence controller and
//! attempt state machine together for a single widget: telemetry flows into
//! the current attempt's metrics, slot submissions drive the sequence, and a
//! completed sequence is scored and either decided locally or handed to a
//! remote verifier through a [`VerificationTicket`].

use rand::Rng;
use serde::Serialize;

use smudge_common::{
    AbuseReport, AttemptSnapshot, DeviceClass, Difficulty, Fingerprint, SmudgeError,
    VerificationRequest, VerificationResponse,
};

use crate::config::EngineConfig;
use crate::lockout::{self, AttemptStateMachine, FailureVerdict, LockoutState};
use crate::scoring::TrustScorer;
use crate::sequence::{DigitSequenceController, SlotEvent, SlotView};
use crate::store::KeyValueStore;
use crate::telemetry::{HumanMetrics, TelemetryEvent};

/// Caller-facing callbacks. Each fires at most once per transition.
pub trait ChallengeObserver {
    /// Every slot solved, before the verdict
    fn on_complete(&mut self, _digits: &[u8]) {}

    fn on_validation_success(&mut self) {}

    fn on_validation_failed(&mut self, _score: u8) {}

    /// The scope just entered lockout; the report may be forwarded upstream
    fn on_failure_threshold_reached(&mut self, _report: &AbuseReport) {}
}

/// Observer that ignores every callback
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ChallengeObserver for NoopObserver {}

/// Handle for one outstanding remote verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerificationTicket {
    generation: u64,
}

/// How a remote verification ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Accepted,
    Rejected,
    /// Network failure, non-2xx or malformed response
    TransportError(String),
    /// No answer before the local timeout
    TimedOut,
}

impl From<Result<VerificationResponse, SmudgeError>> for VerificationOutcome {
    fn from(result: Result<VerificationResponse, SmudgeError>) -> Self {
        match result {
            Ok(VerificationResponse { success: true }) => Self::Accepted,
            Ok(VerificationResponse { success: false }) => Self::Rejected,
            Err(SmudgeError::Timeout(_)) => Self::TimedOut,
            Err(e) => Self::TransportError(e.to_string()),
        }
    }
}

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    /// Cooldown running; no interaction accepted
    Locked { deadline_ms: i64 },
    /// Slots can be submitted
    Interactive,
    /// Sequence complete, waiting on the remote verifier
    AwaitingVerification { ticket: VerificationTicket },
    /// Accepted as human; terminal
    Accepted,
}

/// Details of a failed attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    pub score: u8,
    pub threshold: u8,
    pub verdict: FailureVerdict,
    /// Difficulty of the re-issued challenge
    pub difficulty: Difficulty,
    /// Present when this failure started the lockout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abuse_report: Option<AbuseReport>,
}

/// Result of a submission or a verification resolution
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Inactive slot, stale ticket, or session not interactive
    Ignored,
    InvalidInput { index: usize },
    Rejected { index: usize },
    Accepted { index: usize, next: usize },
    /// Completed; the caller must verify remotely and resolve the ticket
    VerificationRequired {
        ticket: VerificationTicket,
        request: Box<VerificationRequest>,
    },
    Passed { score: u8 },
    Failed(Box<FailureReport>),
}

/// A single challenge widget instance
pub struct ChallengeSession<S: KeyValueStore> {
    config: EngineConfig,
    scorer: TrustScorer,
    difficulty: Difficulty,
    device_class: DeviceClass,
    fingerprint: Option<Fingerprint>,
    sequence: DigitSequenceController,
    metrics: HumanMetrics,
    attempts: AttemptStateMachine,
    store: S,
    observer: Box<dyn ChallengeObserver + Send>,
    /// Bumped on every regeneration; stale tickets compare unequal
    generation: u64,
    phase: SessionPhase,
    last_score: Option<u8>,
}

impl<S: KeyValueStore> ChallengeSession<S> {
    /// Build a session, restoring any persisted lockout from `store`.
    ///
    /// Fails only on invalid configuration.
    pub fn new(
        config: EngineConfig,
        mut store: S,
        device_class: DeviceClass,
        fingerprint: Option<Fingerprint>,
        now_ms: i64,
    ) -> Result<Self, SmudgeError> {
        config.validate()?;

        let attempts = AttemptStateMachine::open(config.lockout_policy(), &mut store, now_ms);
        let phase = match attempts.state() {
            LockoutState::Locked { deadline_ms } => SessionPhase::Locked { deadline_ms },
            _ => SessionPhase::Interactive,
        };
        let difficulty = config.initial_difficulty();

        Ok(Self {
            scorer: TrustScorer::new(config.scoring.clone()),
            sequence: DigitSequenceController::generate(difficulty.digits() as usize, &mut rand::rng()),
            metrics: HumanMetrics::new(device_class, config.sample_window, config.kinematic_window),
            config,
            difficulty,
            device_class,
            fingerprint,
            attempts,
            store,
            observer: Box::new(NoopObserver),
            generation: 0,
            phase,
            last_score: None,
        })
    }

    pub fn with_observer(mut self, observer: impl ChallengeObserver + Send + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Feed one telemetry event; ignored unless the session is interactive
    pub fn record(&mut self, event: &TelemetryEvent) -> bool {
        if self.phase != SessionPhase::Interactive {
            return false;
        }
        self.metrics.apply(event);
        true
    }

    /// Submit raw field text for slot `index`. No slot is open until the
    /// first interaction has been recorded.
    pub fn submit(&mut self, index: usize, text: &str, now_ms: i64) -> SubmitOutcome {
        if self.phase != SessionPhase::Interactive || self.metrics.started_at().is_none() {
            return SubmitOutcome::Ignored;
        }

        let elapsed = self.metrics.elapsed_ms(now_ms);
        match self.sequence.submit_raw(index, text, elapsed) {
            SlotEvent::Ignored => SubmitOutcome::Ignored,
            SlotEvent::InvalidInput { index } => SubmitOutcome::InvalidInput { index },
            SlotEvent::Rejected { index } => SubmitOutcome::Rejected { index },
            SlotEvent::Accepted { index, next } => SubmitOutcome::Accepted { index, next },
            SlotEvent::Complete { digits, elapsed_ms } => {
                tracing::debug!(?elapsed_ms, generation = self.generation, "Sequence complete");
                self.complete(digits, now_ms)
            }
        }
    }

    fn complete(&mut self, digits: Vec<u8>, now_ms: i64) -> SubmitOutcome {
        self.observer.on_complete(&digits);

        let score = self.scorer.score(
            &self.metrics,
            self.fingerprint.as_ref(),
            self.sequence.len(),
            now_ms,
        );
        self.last_score = Some(score);

        if self.config.server_validation {
            let ticket = VerificationTicket { generation: self.generation };
            self.phase = SessionPhase::AwaitingVerification { ticket };
            let request = VerificationRequest {
                digits,
                metrics: self.metrics.verification_metrics(score, now_ms),
                fingerprint: self.fingerprint.clone(),
            };
            return SubmitOutcome::VerificationRequired {
                ticket,
                request: Box::new(request),
            };
        }

        if score >= self.config.trust_threshold {
            self.accept(score, now_ms)
        } else {
            self.fail(score, now_ms)
        }
    }

    /// Apply the remote verifier's answer. Results for a ticket that is no
    /// longer pending (the session was regenerated) are ignored.
    pub fn resolve_verification(
        &mut self,
        ticket: VerificationTicket,
        outcome: VerificationOutcome,
        now_ms: i64,
    ) -> SubmitOutcome {
        match self.phase {
            SessionPhase::AwaitingVerification { ticket: pending } if pending == ticket => {}
            _ => {
                tracing::debug!(?ticket, "Stale verification result ignored");
                return SubmitOutcome::Ignored;
            }
        }

        let score = self.last_score.unwrap_or(0);
        match outcome {
            VerificationOutcome::Accepted => self.accept(score, now_ms),
            other => {
                tracing::warn!(outcome = ?other, score, "Remote verification did not accept");
                self.fail(score, now_ms)
            }
        }
    }

    fn accept(&mut self, score: u8, now_ms: i64) -> SubmitOutcome {
        self.attempts.record_success(&mut self.store, now_ms);
        self.phase = SessionPhase::Accepted;
        tracing::info!(score, "Challenge passed");
        self.observer.on_validation_success();
        SubmitOutcome::Passed { score }
    }

    fn fail(&mut self, score: u8, now_ms: i64) -> SubmitOutcome {
        let verdict = self.attempts.record_failure(&mut self.store, now_ms);
        self.observer.on_validation_failed(score);

        let mut abuse_report = None;
        match verdict {
            FailureVerdict::Warned { .. } => self.regenerate(),
            FailureVerdict::Escalated { .. } => {
                self.difficulty = self.difficulty.escalated();
                self.regenerate();
            }
            FailureVerdict::Locked { attempts, deadline_ms } => {
                let report = AbuseReport {
                    score,
                    attempts,
                    timestamp: now_ms,
                    metrics: self.metrics.summary(score, now_ms),
                };
                self.observer.on_failure_threshold_reached(&report);
                self.phase = SessionPhase::Locked { deadline_ms };
                abuse_report = Some(report);
            }
        }

        SubmitOutcome::Failed(Box::new(FailureReport {
            score,
            threshold: self.config.trust_threshold,
            verdict,
            difficulty: self.difficulty,
            abuse_report,
        }))
    }

    /// New digits at the current difficulty, fresh metrics, pending
    /// verification invalidated
    fn regenerate(&mut self) {
        self.regenerate_with(&mut rand::rng());
    }

    fn regenerate_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.generation += 1;
        self.sequence = DigitSequenceController::generate(self.difficulty.digits() as usize, rng);
        self.metrics = HumanMetrics::new(
            self.device_class,
            self.config.sample_window,
            self.config.kinematic_window,
        );
        self.last_score = None;
        self.phase = SessionPhase::Interactive;
    }

    /// User-requested refresh. No-op while locked or after acceptance.
    pub fn reset(&mut self) -> bool {
        match self.phase {
            SessionPhase::Interactive | SessionPhase::AwaitingVerification { .. } => {
                self.regenerate();
                true
            }
            SessionPhase::Locked { .. } | SessionPhase::Accepted => false,
        }
    }

    /// Leave the lockout once its deadline has passed. Returns true when the
    /// session became interactive again on this call.
    pub fn check_expiry(&mut self, now_ms: i64) -> bool {
        if !self.attempts.check_expiry(&mut self.store, now_ms) {
            return false;
        }
        self.difficulty = self.config.initial_difficulty();
        self.regenerate();
        true
    }

    /// Pick up a lockout another session of the same scope started since
    /// this one last looked at the store
    pub fn sync_lockout(&mut self, now_ms: i64) -> bool {
        if self.phase == SessionPhase::Accepted || !self.attempts.sync(&self.store, now_ms) {
            return false;
        }
        if let LockoutState::Locked { deadline_ms } = self.attempts.state() {
            self.phase = SessionPhase::Locked { deadline_ms };
        }
        true
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn lockout_state(&self) -> LockoutState {
        self.attempts.state()
    }

    pub fn lockout_remaining_ms(&self, now_ms: i64) -> Option<u64> {
        self.attempts.remaining_ms(now_ms)
    }

    pub fn attempt_snapshot(&self) -> AttemptSnapshot {
        lockout::read_snapshot(&self.store)
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn digits(&self) -> &[u8] {
        self.sequence.digits()
    }

    pub fn active_slot(&self) -> usize {
        self.sequence.active()
    }

    pub fn reveal(&self) -> Vec<SlotView> {
        self.sequence.reveal()
    }

    pub fn metrics(&self) -> &HumanMetrics {
        &self.metrics
    }

    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    pub fn last_score(&self) -> Option<u8> {
        self.last_score
    }

    pub fn threshold(&self) -> u8 {
        self.config.trust_threshold
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

/// `m:ss` countdown for a remaining duration, seconds rounded up
pub fn format_countdown(remaining_ms: u64) -> String {
    let secs = remaining_ms.div_ceil(1000);
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::{Arc, Mutex};

    const COOLDOWN: i64 = 300_000;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ChallengeObserver for Recorder {
        fn on_complete(&mut self, digits: &[u8]) {
            self.0.lock().unwrap().push(format!("complete:{}", digits.len()));
        }
        fn on_validation_success(&mut self) {
            self.0.lock().unwrap().push("success".to_string());
        }
        fn on_validation_failed(&mut self, score: u8) {
            self.0.lock().unwrap().push(format!("failed:{}", score));
        }
        fn on_failure_threshold_reached(&mut self, report: &AbuseReport) {
            self.0.lock().unwrap().push(format!("threshold:{}", report.attempts));
        }
    }

    fn session(store: MemoryStore, now: i64) -> ChallengeSession<MemoryStore> {
        ChallengeSession::new(EngineConfig::default(), store, DeviceClass::Desktop, None, now).unwrap()
    }

    fn solve(session: &mut ChallengeSession<MemoryStore>, now: i64) -> SubmitOutcome {
        session.record(&TelemetryEvent::FirstInteraction { t: now, touch: false });
        let digits = session.digits().to_vec();
        let mut last = SubmitOutcome::Ignored;
        for (i, d) in digits.iter().enumerate() {
            last = session.submit(i, &d.to_string(), now);
        }
        last
    }

    fn feed_human_telemetry(session: &mut ChallengeSession<MemoryStore>, start: i64) {
        let mut events = vec![
            TelemetryEvent::PointerEnter,
            TelemetryEvent::FirstInteraction { t: start, touch: false },
        ];
        let path = [(0.0, 0), (10.0, 20), (18.0, 60), (30.0, 75), (36.0, 140), (48.0, 160), (55.0, 230), (66.0, 250), (72.0, 330), (80.0, 345)];
        events.extend(path.iter().map(|&(x, dt)| TelemetryEvent::PointerMove { x, y: 0.0, t: start + dt }));
        for (down, up) in [(500, 620), (1_000, 1_340), (1_600, 1_690)] {
            events.push(TelemetryEvent::KeyDown { t: start + down });
            events.push(TelemetryEvent::KeyUp { t: start + up });
        }
        for event in &events {
            assert!(session.record(event));
        }
    }

    #[test]
    fn test_invalid_config_is_fatal_at_construction() {
        let config = EngineConfig { digits: 9, ..Default::default() };
        let result = ChallengeSession::new(config, MemoryStore::new(), DeviceClass::Desktop, None, 0);
        assert!(matches!(result, Err(SmudgeError::Config(_))));
    }

    #[test]
    fn test_human_attempt_passes_and_clears_counters() {
        let store = MemoryStore::from_entries([("botAttempts", "2")]);
        let recorder = Recorder::default();
        let mut s = session(store, 0).with_observer(recorder.clone());
        feed_human_telemetry(&mut s, 1_000);

        let outcome = solve(&mut s, 4_000);
        assert!(matches!(outcome, SubmitOutcome::Passed { score } if score >= 60));
        assert_eq!(s.phase(), SessionPhase::Accepted);
        assert_eq!(s.attempt_snapshot().failed_attempt_count, 0);
        assert_eq!(s.attempt_snapshot().last_success, Some(4_000));
        assert_eq!(recorder.calls(), vec!["complete:4", "success"]);

        // terminal: nothing more is accepted
        assert_eq!(s.submit(0, "1", 5_000), SubmitOutcome::Ignored);
        assert!(!s.record(&TelemetryEvent::Focus));
    }

    #[test]
    fn test_wrong_digit_and_bad_text_do_not_advance() {
        let mut s = session(MemoryStore::new(), 0);
        s.record(&TelemetryEvent::FirstInteraction { t: 0, touch: false });
        let first = s.digits()[0];
        let wrong = (first + 1) % 10;

        assert_eq!(s.submit(0, &wrong.to_string(), 10), SubmitOutcome::Rejected { index: 0 });
        assert_eq!(s.submit(0, "x", 10), SubmitOutcome::InvalidInput { index: 0 });
        assert_eq!(s.submit(1, "0", 10), SubmitOutcome::Ignored);
        assert_eq!(s.active_slot(), 0);
        assert_eq!(
            s.submit(0, &first.to_string(), 10),
            SubmitOutcome::Accepted { index: 0, next: 1 }
        );
    }

    #[test]
    fn test_no_slot_opens_before_first_interaction() {
        let mut s = session(MemoryStore::new(), 0);
        s.record(&TelemetryEvent::PointerEnter);
        for (i, x) in [0.0, 20.0, 40.0, 60.0].into_iter().enumerate() {
            s.record(&TelemetryEvent::PointerMove { x, y: 0.0, t: i as i64 * 25 });
        }

        let first = s.digits()[0];
        assert_eq!(s.submit(0, &first.to_string(), 100), SubmitOutcome::Ignored);
        assert_eq!(s.active_slot(), 0);

        // once activated, the same instant completion is judged too fast
        let SubmitOutcome::Failed(report) = solve(&mut s, 100) else {
            panic!("expected failure");
        };
        assert!(report.score < report.threshold);
        assert_eq!(report.verdict, FailureVerdict::Warned { attempts: 1 });

        // regeneration closes the slots again
        let first = s.digits()[0];
        assert_eq!(s.submit(0, &first.to_string(), 200), SubmitOutcome::Ignored);
    }

    #[test]
    fn test_bot_attempt_is_warned_and_regenerated() {
        let mut s = session(MemoryStore::new(), 0);
        s.record(&TelemetryEvent::Paste);
        let generation = s.generation();

        let SubmitOutcome::Failed(report) = solve(&mut s, 100) else {
            panic!("expected failure");
        };
        assert_eq!(report.verdict, FailureVerdict::Warned { attempts: 1 });
        assert_eq!(report.threshold, 40);
        assert!(report.abuse_report.is_none());

        assert_eq!(s.generation(), generation + 1);
        assert_eq!(s.phase(), SessionPhase::Interactive);
        assert_eq!(s.active_slot(), 0);
        assert!(!s.metrics().paste_detected());
        assert_eq!(s.difficulty(), Difficulty::default());
    }

    #[test]
    fn test_third_failure_escalates_difficulty() {
        let mut s = session(MemoryStore::new(), 0);
        solve(&mut s, 100);
        solve(&mut s, 200);
        let SubmitOutcome::Failed(report) = solve(&mut s, 300) else {
            panic!("expected failure");
        };

        assert_eq!(report.verdict, FailureVerdict::Escalated { attempts: 3 });
        assert_eq!(s.difficulty().digits(), 5);
        assert_eq!(s.difficulty().blur_level(), 8);
        assert_eq!(s.digits().len(), 5);

        solve(&mut s, 400);
        assert_eq!(s.difficulty().digits(), 6);
        assert_eq!(s.difficulty().blur_level(), 10);
    }

    #[test]
    fn test_fifth_failure_locks_and_reports_once() {
        let recorder = Recorder::default();
        let mut s = session(MemoryStore::new(), 0).with_observer(recorder.clone());
        for t in 1..=4 {
            solve(&mut s, t * 100);
        }
        let SubmitOutcome::Failed(report) = solve(&mut s, 1_000) else {
            panic!("expected failure");
        };

        assert_eq!(report.verdict, FailureVerdict::Locked { attempts: 5, deadline_ms: 1_000 + COOLDOWN });
        let abuse = report.abuse_report.as_ref().unwrap();
        assert_eq!(abuse.attempts, 5);
        assert_eq!(abuse.timestamp, 1_000);

        assert_eq!(s.phase(), SessionPhase::Locked { deadline_ms: 1_000 + COOLDOWN });
        assert_eq!(s.attempt_snapshot().lockout_deadline, Some(1_000 + COOLDOWN));
        assert_eq!(s.lockout_remaining_ms(1_000), Some(COOLDOWN as u64));

        assert_eq!(s.submit(0, "1", 2_000), SubmitOutcome::Ignored);
        assert!(!s.reset());

        let thresholds = recorder.calls().iter().filter(|c| c.starts_with("threshold")).count();
        assert_eq!(thresholds, 1);
    }

    #[test]
    fn test_reload_during_lockout_then_expiry() {
        let mut s = session(MemoryStore::new(), 0);
        for t in 1..=5 {
            solve(&mut s, t * 100);
        }
        let persisted = s.store().clone();
        let deadline = 500 + COOLDOWN;

        let mut reloaded = session(persisted, 10_000);
        assert_eq!(reloaded.phase(), SessionPhase::Locked { deadline_ms: deadline });
        assert!(reloaded.lockout_remaining_ms(10_000).unwrap() <= COOLDOWN as u64);

        assert!(!reloaded.check_expiry(deadline - 1));
        assert!(reloaded.check_expiry(deadline));
        assert_eq!(reloaded.phase(), SessionPhase::Interactive);
        assert_eq!(reloaded.lockout_state(), LockoutState::Expired);
        assert_eq!(reloaded.attempt_snapshot(), AttemptSnapshot::default());
        assert_eq!(reloaded.difficulty(), Difficulty::default());
    }

    #[test]
    fn test_reload_after_deadline_starts_interactive() {
        let store = MemoryStore::from_entries([("botAttempts", "5"), ("timeoutEnd", "1000")]);
        let s = session(store, 2_000);
        assert_eq!(s.phase(), SessionPhase::Interactive);
        assert_eq!(s.lockout_state(), LockoutState::Expired);
        assert!(s.store().get("timeoutEnd").is_none());
    }

    #[test]
    fn test_lockout_from_sibling_session_is_adopted() {
        let mut s = session(MemoryStore::new(), 0);
        s.store_mut().reload([("botAttempts", "5"), ("timeoutEnd", "50000")]);

        assert!(s.sync_lockout(1_000));
        assert_eq!(s.phase(), SessionPhase::Locked { deadline_ms: 50_000 });
        assert!(!s.sync_lockout(1_000));
        assert_eq!(s.submit(0, "1", 1_000), SubmitOutcome::Ignored);
        assert!(s.check_expiry(50_000));
    }

    fn server_session() -> ChallengeSession<MemoryStore> {
        let config = EngineConfig { server_validation: true, ..Default::default() };
        ChallengeSession::new(config, MemoryStore::new(), DeviceClass::Desktop, None, 0).unwrap()
    }

    #[test]
    fn test_server_validation_round_trip() {
        let mut s = server_session();
        feed_human_telemetry(&mut s, 1_000);

        let SubmitOutcome::VerificationRequired { ticket, request } = solve(&mut s, 4_000) else {
            panic!("expected verification request");
        };
        assert_eq!(request.digits, s.digits());
        assert_eq!(request.metrics.sample_counts.pointer, 10);
        assert_eq!(request.metrics.completion_time_ms, Some(3_000));
        assert_eq!(s.phase(), SessionPhase::AwaitingVerification { ticket });

        // no second completion while one is in flight
        assert_eq!(s.submit(0, "0", 4_100), SubmitOutcome::Ignored);

        let outcome = s.resolve_verification(ticket, VerificationOutcome::Accepted, 4_200);
        assert!(matches!(outcome, SubmitOutcome::Passed { .. }));
        // a duplicate answer is stale
        assert_eq!(
            s.resolve_verification(ticket, VerificationOutcome::Accepted, 4_300),
            SubmitOutcome::Ignored
        );
    }

    #[test]
    fn test_transport_error_counts_as_failure() {
        let mut s = server_session();
        let SubmitOutcome::VerificationRequired { ticket, .. } = solve(&mut s, 100) else {
            panic!("expected verification request");
        };

        let outcome: VerificationOutcome =
            Err(SmudgeError::Verification("connection refused".to_string())).into();
        let SubmitOutcome::Failed(report) = s.resolve_verification(ticket, outcome, 200) else {
            panic!("expected failure");
        };
        assert_eq!(report.verdict.attempts(), 1);
        assert_eq!(s.phase(), SessionPhase::Interactive);
    }

    #[test]
    fn test_reset_invalidates_pending_verification() {
        let mut s = server_session();
        let SubmitOutcome::VerificationRequired { ticket, .. } = solve(&mut s, 100) else {
            panic!("expected verification request");
        };

        assert!(s.reset());
        assert_eq!(
            s.resolve_verification(ticket, VerificationOutcome::Accepted, 200),
            SubmitOutcome::Ignored
        );
        assert_eq!(s.phase(), SessionPhase::Interactive);
        assert_eq!(s.attempt_snapshot().last_success, None);
    }

    #[test]
    fn test_verification_outcome_from_response() {
        let ok: VerificationOutcome = Ok(VerificationResponse { success: true }).into();
        let no: VerificationOutcome = Ok(VerificationResponse { success: false }).into();
        let late: VerificationOutcome = Err(SmudgeError::Timeout("verify".to_string())).into();
        assert_eq!(ok, VerificationOutcome::Accepted);
        assert_eq!(no, VerificationOutcome::Rejected);
        assert_eq!(late, VerificationOutcome::TimedOut);
    }

    #[test]
    fn test_regenerate_with_seeded_rng() {
        let mut s = session(MemoryStore::new(), 0);
        s.regenerate_with(&mut StdRng::seed_from_u64(3));
        let first = s.digits().to_vec();
        s.regenerate_with(&mut StdRng::seed_from_u64(3));
        assert_eq!(s.digits(), first.as_slice());
        assert_eq!(s.generation(), 2);
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(300_000), "5:00");
        assert_eq!(format_countdown(61_001), "1:02");
        assert_eq!(format_countdown(999), "0:01");
        assert_eq!(format_countdown(0), "0:00");
    }
}
