//! # Smudge Engine
//!
//! Behavioral trust scoring and attempt/lockout engine behind the Smudge
//! obscured-digit challenge. Everything here is synchronous and free of I/O:
//! callers feed telemetry and submissions with explicit timestamps, and
//! persisted attempt counters go through the [`KeyValueStore`] port.
//!
//! ## Modules
//! - `telemetry` - raw interaction events and derived kinematic windows
//! - `fingerprint` - one-shot device descriptor assembly
//! - `scoring` - trust score over telemetry + fingerprint
//! - `sequence` - which digit slot is unlockable / solved
//! - `lockout` - consecutive-failure escalation and persisted cooldown
//! - `session` - one challenge instance wiring the above together
//! - `store` - key/value persistence port and in-memory store
//! - `config` - engine and scoring configuration

pub mod config;
pub mod fingerprint;
pub mod lockout;
pub mod scoring;
pub mod sequence;
pub mod session;
pub mod store;
pub mod telemetry;

pub use config::{EngineConfig, ScoringWeights};
pub use fingerprint::{FingerprintProbe, FingerprintSignals, WebGlProbe};
pub use lockout::{AttemptStateMachine, FailureVerdict, LockoutPolicy, LockoutState};
pub use scoring::{ScoreBreakdown, TrustScorer};
pub use sequence::{DigitSequenceController, SlotEvent, SlotView};
pub use session::{
    format_countdown, ChallengeObserver, ChallengeSession, FailureReport, NoopObserver,
    SessionPhase, SubmitOutcome, VerificationOutcome, VerificationTicket,
};
pub use store::{KeyValueStore, MemoryStore, StoreChange};
pub use telemetry::{HumanMetrics, InteractionSample, TelemetryEvent};
