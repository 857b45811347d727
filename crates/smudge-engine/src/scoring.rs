//! Trust scoring.
//!
//! Reduces one attempt's [`HumanMetrics`] plus the device [`Fingerprint`]
//! into a score in [0, 100]. Each signal group contributes independently and
//! is capped by its own bonuses. The paste penalty is applied after the
//! positive groups are clamped, so it always costs its full weight unless the
//! floor is hit.
//!
//! The decision threshold belongs to the caller.

use serde::Serialize;

use smudge_common::{DeviceClass, Fingerprint};

use crate::config::ScoringWeights;
use crate::fingerprint::FingerprintSignals;
use crate::telemetry::{mean, variance, HumanMetrics};

/// Signed contribution of each signal group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScoreBreakdown {
    pub movement: i32,
    pub completion_time: i32,
    pub key_hold: i32,
    pub input_rhythm: i32,
    pub focus: i32,
    pub entry: i32,
    pub fingerprint: i32,
    pub kinematics: i32,
    pub paste: i32,
}

impl ScoreBreakdown {
    /// Sum of every group except the paste penalty
    pub fn behavioral_total(&self) -> i32 {
        self.movement
            + self.completion_time
            + self.key_hold
            + self.input_rhythm
            + self.focus
            + self.entry
            + self.fingerprint
            + self.kinematics
    }

    /// Final bounded score
    pub fn score(&self) -> u8 {
        let base = self.behavioral_total().clamp(0, 100);
        (base + self.paste).clamp(0, 100) as u8
    }
}

/// Pure trust-scoring engine
#[derive(Debug, Clone, Default)]
pub struct TrustScorer {
    weights: ScoringWeights,
}

impl TrustScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score in [0, 100]
    pub fn score(
        &self,
        metrics: &HumanMetrics,
        fingerprint: Option<&Fingerprint>,
        sequence_len: usize,
        now_ms: i64,
    ) -> u8 {
        self.evaluate(metrics, fingerprint, sequence_len, now_ms).score()
    }

    /// Per-group contributions. `now_ms` is the completion time; elapsed time
    /// is measured from the first interaction recorded in `metrics`.
    pub fn evaluate(
        &self,
        metrics: &HumanMetrics,
        fingerprint: Option<&Fingerprint>,
        sequence_len: usize,
        now_ms: i64,
    ) -> ScoreBreakdown {
        let w = &self.weights;

        let breakdown = ScoreBreakdown {
            movement: self.movement(metrics),
            // no recorded start counts as an instant completion
            completion_time: self.completion_time(metrics.elapsed_ms(now_ms).unwrap_or(0)),
            key_hold: self.key_hold(metrics),
            input_rhythm: self.input_rhythm(metrics),
            focus: if metrics.focus_changes() as usize >= sequence_len { w.focus_bonus } else { 0 },
            entry: if metrics.pointer_entered() || metrics.touch_used() { w.entry_bonus } else { 0 },
            fingerprint: fingerprint.map_or(0, |fp| self.fingerprint(fp)),
            kinematics: self.kinematics(metrics),
            paste: if metrics.paste_detected() { -w.paste_penalty } else { 0 },
        };

        tracing::debug!(?breakdown, score = breakdown.score(), "Trust score evaluated");
        breakdown
    }

    fn movement(&self, metrics: &HumanMetrics) -> i32 {
        let w = &self.weights;
        let (samples, distance, min_samples, min_distance) = match metrics.device_class() {
            DeviceClass::Mobile => (
                metrics.touch_samples().len(),
                metrics.touch_distance(),
                w.mobile_min_samples,
                w.mobile_min_distance,
            ),
            DeviceClass::Desktop => (
                metrics.pointer_samples().len(),
                metrics.pointer_distance(),
                w.desktop_min_samples,
                w.desktop_min_distance,
            ),
        };

        let mut points = 0;
        if samples >= min_samples {
            points += w.movement_samples_bonus;
        }
        if distance > min_distance {
            points += w.movement_distance_bonus;
        }
        points
    }

    fn completion_time(&self, elapsed_ms: u64) -> i32 {
        let w = &self.weights;
        if elapsed_ms > w.plausible_min_ms && elapsed_ms < w.plausible_max_ms {
            w.plausible_time_bonus
        } else if elapsed_ms < w.too_fast_ms {
            -w.too_fast_penalty
        } else {
            0
        }
    }

    fn key_hold(&self, metrics: &HumanMetrics) -> i32 {
        let w = &self.weights;
        let holds = metrics.key_holds();
        let Some(avg) = holds.mean() else {
            return 0;
        };

        let mut points = 0;
        if avg > w.key_hold_mean_min_ms && avg < w.key_hold_mean_max_ms {
            points += w.key_hold_mean_bonus;
        }
        if holds.len() >= w.key_hold_variance_min_samples
            && holds.variance().is_some_and(|v| v > w.key_hold_variance_min)
        {
            points += w.key_hold_variance_bonus;
        }
        points
    }

    fn input_rhythm(&self, metrics: &HumanMetrics) -> i32 {
        let w = &self.weights;
        let intervals = metrics.input_intervals();
        let Some(avg) = mean(intervals.iter().copied()) else {
            return 0;
        };

        let mut points = 0;
        if avg > w.interval_mean_min_ms && avg < w.interval_mean_max_ms {
            points += w.interval_mean_bonus;
        }
        if intervals.len() >= w.interval_variance_min_intervals
            && variance(intervals.iter().copied()).is_some_and(|v| v > w.interval_variance_min)
        {
            points += w.interval_variance_bonus;
        }
        points
    }

    fn fingerprint(&self, fingerprint: &Fingerprint) -> i32 {
        let w = &self.weights;
        let mut points = 0;
        if fingerprint.has_canvas_signal() {
            points += w.canvas_bonus;
        }
        if fingerprint.has_webgl_signal() {
            points += w.webgl_bonus;
        }
        points
    }

    /// Desktop-only pointer biometrics
    fn kinematics(&self, metrics: &HumanMetrics) -> i32 {
        let w = &self.weights;
        let velocities = metrics.velocities();
        if metrics.device_class().is_mobile() || velocities.len() < w.kinematic_min_velocity_samples {
            return 0;
        }

        let mut points = 0;
        if velocities.variance().is_some_and(|v| v > w.velocity_variance_min) {
            points += w.velocity_variance_bonus;
        }
        let accelerations = metrics.accelerations();
        if accelerations.len() >= w.kinematic_min_acceleration_samples
            && accelerations.mean().is_some_and(|a| a > w.acceleration_mean_min)
        {
            points += w.acceleration_bonus;
        }
        if metrics.pauses() > w.pauses_above {
            points += w.pauses_bonus;
        }
        if metrics.micro_movements() > w.micro_movements_above {
            points += w.micro_movements_bonus;
        }
        if metrics.direction_changes() > w.direction_changes_above {
            points += w.direction_changes_bonus;
        }
        points
    }
}
