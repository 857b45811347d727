//! In-process verifier for the remote verification contract.
//!
//! Re-checks the metrics block a widget submits on `/verify` and answers
//! `{success}`. The same verifier backs server-validated sessions hosted by
//! this service, called through [`await_verification`] so the engine sees the
//! same timeout semantics as a network round-trip.

use std::future::Future;
use std::time::Duration;

use smudge_common::constants::MAX_DIGITS;
use smudge_common::{SmudgeError, VerificationRequest, VerificationResponse};
use smudge_engine::EngineConfig;

/// Summary verifier service
pub struct SummaryVerifier {
    threshold: u8,
    too_fast_ms: u64,
}

/// Why a verification request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    MalformedDigits,
    BelowThreshold,
    PasteDetected,
    NoInteraction,
    TooFast,
}

impl SummaryVerifier {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            threshold: config.trust_threshold,
            too_fast_ms: config.scoring.too_fast_ms,
        }
    }

    /// Answer one verification request
    pub fn verify(&self, request: &VerificationRequest) -> VerificationResponse {
        match self.check(request) {
            Ok(()) => VerificationResponse { success: true },
            Err(refusal) => {
                tracing::debug!(
                    ?refusal,
                    score = request.metrics.score,
                    device = ?request.metrics.device_class,
                    "Verification refused"
                );
                VerificationResponse { success: false }
            }
        }
    }

    pub fn check(&self, request: &VerificationRequest) -> Result<(), Refusal> {
        let digits = &request.digits;
        if digits.is_empty() || digits.len() > MAX_DIGITS as usize || digits.iter().any(|d| *d > 9) {
            return Err(Refusal::MalformedDigits);
        }

        let metrics = &request.metrics;
        if metrics.score < self.threshold {
            return Err(Refusal::BelowThreshold);
        }
        // A paste already costs points locally; the server does not accept it at all
        if metrics.paste_detected {
            return Err(Refusal::PasteDetected);
        }
        match metrics.completion_time_ms {
            None => Err(Refusal::NoInteraction),
            Some(ms) if ms < self.too_fast_ms => Err(Refusal::TooFast),
            Some(_) => Ok(()),
        }
    }
}

/// Bound a verification round-trip by `timeout`
pub async fn await_verification<F>(
    verification: F,
    timeout: Duration,
) -> Result<VerificationResponse, SmudgeError>
where
    F: Future<Output = Result<VerificationResponse, SmudgeError>>,
{
    match tokio::time::timeout(timeout, verification).await {
        Ok(result) => result,
        Err(_) => Err(SmudgeError::Timeout(format!(
            "verification exceeded {}ms",
            timeout.as_millis()
        ))),
    }
}
