//! Engine configuration.
//!
//! Every constant of the trust heuristic lives in [`ScoringWeights`] so it can
//! be tuned from a config file without touching the aggregation code.

use serde::{Deserialize, Serialize};

use smudge_common::constants::{
    DEFAULT_BLUR_LEVEL, DEFAULT_DIGITS, DEFAULT_TRUST_THRESHOLD, ESCALATION_AFTER_FAILURES,
    KINEMATIC_WINDOW_CAP, LOCKOUT_COOLDOWN_MS, MAX_BLUR_LEVEL, MAX_DIGITS, MAX_FAILED_ATTEMPTS,
    MIN_DIGITS, SAMPLE_WINDOW_CAP, VERIFICATION_TIMEOUT_MS,
};
use smudge_common::{Difficulty, SmudgeError};

use crate::lockout::LockoutPolicy;

/// Challenge engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Digits in a fresh challenge (4-6)
    #[serde(default = "default_digits")]
    pub digits: u8,

    /// Obscuring level of unrevealed slots (0-10)
    #[serde(default = "default_blur_level")]
    pub blur_level: u8,

    /// Score at or above which the attempt is accepted
    #[serde(default = "default_threshold")]
    pub trust_threshold: u8,

    /// Failures before difficulty escalates
    #[serde(default = "default_escalate_after")]
    pub escalate_after: u32,

    /// Failures before the cooldown lockout
    #[serde(default = "default_lock_after")]
    pub lock_after: u32,

    /// Lockout cooldown in milliseconds
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: i64,

    /// Raw pointer/touch samples kept
    #[serde(default = "default_sample_window")]
    pub sample_window: usize,

    /// Derived kinematic values kept
    #[serde(default = "default_kinematic_window")]
    pub kinematic_window: usize,

    /// Hand completed sequences to a remote verifier instead of deciding locally
    #[serde(default)]
    pub server_validation: bool,

    /// Local timeout for the remote verifier
    #[serde(default = "default_verification_timeout")]
    pub verification_timeout_ms: u64,

    /// Trust score constants
    #[serde(default)]
    pub scoring: ScoringWeights,
}

// Default value functions
fn default_digits() -> u8 { DEFAULT_DIGITS }
fn default_blur_level() -> u8 { DEFAULT_BLUR_LEVEL }
fn default_threshold() -> u8 { DEFAULT_TRUST_THRESHOLD }
fn default_escalate_after() -> u32 { ESCALATION_AFTER_FAILURES }
fn default_lock_after() -> u32 { MAX_FAILED_ATTEMPTS }
fn default_cooldown_ms() -> i64 { LOCKOUT_COOLDOWN_MS } // 5 minutes
fn default_sample_window() -> usize { SAMPLE_WINDOW_CAP }
fn default_kinematic_window() -> usize { KINEMATIC_WINDOW_CAP }
fn default_verification_timeout() -> u64 { VERIFICATION_TIMEOUT_MS }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            digits: default_digits(),
            blur_level: default_blur_level(),
            trust_threshold: default_threshold(),
            escalate_after: default_escalate_after(),
            lock_after: default_lock_after(),
            cooldown_ms: default_cooldown_ms(),
            sample_window: default_sample_window(),
            kinematic_window: default_kinematic_window(),
            server_validation: false,
            verification_timeout_ms: default_verification_timeout(),
            scoring: ScoringWeights::default(),
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), SmudgeError> {
        if !(MIN_DIGITS..=MAX_DIGITS).contains(&self.digits) {
            return Err(SmudgeError::Config(format!(
                "digits must be in {}..={}, got {}",
                MIN_DIGITS, MAX_DIGITS, self.digits
            )));
        }
        if self.blur_level > MAX_BLUR_LEVEL {
            return Err(SmudgeError::Config(format!(
                "blur_level must be at most {}, got {}",
                MAX_BLUR_LEVEL, self.blur_level
            )));
        }
        if self.trust_threshold > 100 {
            return Err(SmudgeError::Config(format!(
                "trust_threshold must be at most 100, got {}",
                self.trust_threshold
            )));
        }
        if self.cooldown_ms <= 0 {
            return Err(SmudgeError::Config("cooldown_ms must be positive".to_string()));
        }
        if self.lock_after == 0 || self.escalate_after > self.lock_after {
            return Err(SmudgeError::Config(format!(
                "need 0 < escalate_after ({}) <= lock_after ({})",
                self.escalate_after, self.lock_after
            )));
        }
        if self.sample_window < 2 || self.kinematic_window == 0 {
            return Err(SmudgeError::Config(
                "sample_window must be >= 2 and kinematic_window >= 1".to_string(),
            ));
        }
        if self.server_validation && self.verification_timeout_ms == 0 {
            return Err(SmudgeError::Config(
                "server_validation needs a non-zero verification_timeout_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Difficulty of a fresh (never escalated) challenge
    pub fn initial_difficulty(&self) -> Difficulty {
        Difficulty::new(self.digits, self.blur_level)
    }

    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            escalate_after: self.escalate_after,
            lock_after: self.lock_after,
            cooldown_ms: self.cooldown_ms,
        }
    }
}

/// Constants of the additive trust heuristic.
///
/// Bonuses are added, penalties subtracted; the result is clamped to [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    // Movement presence
    pub desktop_min_samples: usize,
    pub desktop_min_distance: f64,
    pub mobile_min_samples: usize,
    pub mobile_min_distance: f64,
    pub movement_samples_bonus: i32,
    pub movement_distance_bonus: i32,

    // Completion time (exclusive bounds)
    pub plausible_min_ms: u64,
    pub plausible_max_ms: u64,
    pub plausible_time_bonus: i32,
    pub too_fast_ms: u64,
    pub too_fast_penalty: i32,

    // Key-hold variation
    pub key_hold_mean_min_ms: f64,
    pub key_hold_mean_max_ms: f64,
    pub key_hold_mean_bonus: i32,
    pub key_hold_variance_min_samples: usize,
    pub key_hold_variance_min: f64,
    pub key_hold_variance_bonus: i32,

    // Inter-input interval variation
    pub interval_mean_min_ms: f64,
    pub interval_mean_max_ms: f64,
    pub interval_mean_bonus: i32,
    pub interval_variance_min_intervals: usize,
    pub interval_variance_min: f64,
    pub interval_variance_bonus: i32,

    pub paste_penalty: i32,
    pub focus_bonus: i32,
    pub entry_bonus: i32,
    pub canvas_bonus: i32,
    pub webgl_bonus: i32,

    // Desktop kinematics
    pub kinematic_min_velocity_samples: usize,
    pub velocity_variance_min: f64,
    pub velocity_variance_bonus: i32,
    pub kinematic_min_acceleration_samples: usize,
    pub acceleration_mean_min: f64,
    pub acceleration_bonus: i32,
    pub pauses_above: u32,
    pub pauses_bonus: i32,
    pub micro_movements_above: u32,
    pub micro_movements_bonus: i32,
    pub direction_changes_above: u32,
    pub direction_changes_bonus: i32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            desktop_min_samples: 4,
            desktop_min_distance: 50.0,
            mobile_min_samples: 3,
            mobile_min_distance: 30.0,
            movement_samples_bonus: 20,
            movement_distance_bonus: 15,

            plausible_min_ms: 800,
            plausible_max_ms: 60_000,
            plausible_time_bonus: 20,
            too_fast_ms: 500,
            too_fast_penalty: 15,

            key_hold_mean_min_ms: 20.0,
            key_hold_mean_max_ms: 500.0,
            key_hold_mean_bonus: 5,
            key_hold_variance_min_samples: 3,
            key_hold_variance_min: 50.0,
            key_hold_variance_bonus: 5,

            interval_mean_min_ms: 100.0,
            interval_mean_max_ms: 5000.0,
            interval_mean_bonus: 5,
            interval_variance_min_intervals: 3,
            interval_variance_min: 5000.0,
            interval_variance_bonus: 5,

            paste_penalty: 30,
            focus_bonus: 5,
            entry_bonus: 10,
            canvas_bonus: 5,
            webgl_bonus: 5,

            kinematic_min_velocity_samples: 6,
            velocity_variance_min: 0.001,
            velocity_variance_bonus: 5,
            kinematic_min_acceleration_samples: 4,
            acceleration_mean_min: 0.01,
            acceleration_bonus: 5,
            pauses_above: 1,
            pauses_bonus: 3,
            micro_movements_above: 5,
            micro_movements_bonus: 4,
            direction_changes_above: 2,
            direction_changes_bonus: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_digits() {
        let config = EngineConfig { digits: 7, ..Default::default() };
        assert!(matches!(config.validate(), Err(SmudgeError::Config(_))));

        let config = EngineConfig { digits: 3, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_threshold_and_cooldown() {
        let config = EngineConfig { trust_threshold: 101, ..Default::default() };
        assert!(config.validate().is_err());

        let config = EngineConfig { cooldown_ms: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_scoring_override() {
        let weights: ScoringWeights =
            serde_json::from_str(r#"{ "paste_penalty": 50 }"#).unwrap();
        assert_eq!(weights.paste_penalty, 50);
        assert_eq!(weights.entry_bonus, 10);
    }
}
