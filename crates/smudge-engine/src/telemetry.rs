//! Telemetry aggregation.
//!
//! Turns discrete interaction events into the [`HumanMetrics`] of one
//! challenge attempt: bounded raw sample windows, path distances, key-hold
//! durations, input rhythm, and pointer kinematics (velocity, acceleration,
//! turn angle). Nothing here performs I/O; each event only mutates the
//! owning metrics.

use std::collections::VecDeque;
use std::f64::consts::{FRAC_PI_4, PI};

use serde::{Deserialize, Serialize};

use smudge_common::{DeviceClass, KinematicSummary, MetricsSnapshot, PointerTouchPair, VerificationMetrics};

/// Velocity (distance units / ms) below which a move counts as a pause
pub const PAUSE_VELOCITY: f64 = 0.05;

/// Moves shorter than this are micro-movements (hand tremor)
pub const MICRO_MOVEMENT_DISTANCE: f64 = 5.0;

/// Turn angle above which a move counts as a direction change (45 degrees)
pub const DIRECTION_CHANGE_ANGLE: f64 = FRAC_PI_4;

/// One pointer or touch position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionSample {
    pub x: f64,
    pub y: f64,
    pub timestamp_ms: i64,
}

impl InteractionSample {
    pub fn new(x: f64, y: f64, timestamp_ms: i64) -> Self {
        Self { x, y, timestamp_ms }
    }

    pub fn distance_to(&self, other: &InteractionSample) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Most-recent window: pushing beyond capacity evicts the oldest entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundedWindow<T> {
    items: VecDeque<T>,
    cap: usize,
}

impl<T> BoundedWindow<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(cap.min(128)),
            cap,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.cap == 0 {
            return;
        }
        if self.items.len() == self.cap {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl BoundedWindow<f64> {
    pub fn mean(&self) -> Option<f64> {
        mean(self.items.iter().copied())
    }

    /// Population variance
    pub fn variance(&self) -> Option<f64> {
        variance(self.items.iter().copied())
    }
}

/// Arithmetic mean; `None` for an empty input
pub fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Population variance; `None` for an empty input
pub fn variance(values: impl Iterator<Item = f64> + Clone) -> Option<f64> {
    let m = mean(values.clone())?;
    mean(values.map(|v| (v - m).powi(2)))
}

/// Absolute difference of two headings, folded into [0, PI]
fn turn_angle(angle: f64, previous: f64) -> f64 {
    let delta = (angle - previous).abs() % (2.0 * PI);
    if delta > PI { 2.0 * PI - delta } else { delta }
}

/// A discrete interaction event as reported by the rendering layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    PointerMove { x: f64, y: f64, t: i64 },
    TouchMove { x: f64, y: f64, t: i64 },
    PointerEnter,
    KeyDown { t: i64 },
    KeyUp { t: i64 },
    Input { t: i64 },
    Paste,
    Focus,
    FirstInteraction {
        t: i64,
        #[serde(default)]
        touch: bool,
    },
}

/// Aggregate interaction metrics for one challenge attempt.
///
/// Created fresh per attempt and discarded (never persisted) when it ends.
#[derive(Debug, Clone, Serialize)]
pub struct HumanMetrics {
    device_class: DeviceClass,

    pointer_samples: BoundedWindow<InteractionSample>,
    touch_samples: BoundedWindow<InteractionSample>,
    /// Pointer samples ever recorded, including evicted ones
    pointer_samples_seen: u64,
    pointer_distance: f64,
    touch_distance: f64,

    velocities: BoundedWindow<f64>,
    accelerations: BoundedWindow<f64>,
    turn_angles: BoundedWindow<f64>,
    pauses: u32,
    micro_movements: u32,
    direction_changes: u32,

    key_holds: BoundedWindow<f64>,
    input_timestamps: BoundedWindow<i64>,

    paste_detected: bool,
    focus_changes: u32,
    pointer_entered: bool,
    touch_used: bool,
    started_at: Option<i64>,

    #[serde(skip)]
    last_velocity: Option<f64>,
    #[serde(skip)]
    last_heading: Option<f64>,
    #[serde(skip)]
    pending_key_down: Option<i64>,
}

impl HumanMetrics {
    /// Fresh metrics with the given raw-sample and kinematic window caps
    pub fn new(device_class: DeviceClass, sample_cap: usize, kinematic_cap: usize) -> Self {
        Self {
            device_class,
            pointer_samples: BoundedWindow::new(sample_cap),
            touch_samples: BoundedWindow::new(sample_cap),
            pointer_samples_seen: 0,
            pointer_distance: 0.0,
            touch_distance: 0.0,
            velocities: BoundedWindow::new(kinematic_cap),
            accelerations: BoundedWindow::new(kinematic_cap),
            turn_angles: BoundedWindow::new(kinematic_cap),
            pauses: 0,
            micro_movements: 0,
            direction_changes: 0,
            key_holds: BoundedWindow::new(kinematic_cap),
            input_timestamps: BoundedWindow::new(kinematic_cap),
            paste_detected: false,
            focus_changes: 0,
            pointer_entered: false,
            touch_used: false,
            started_at: None,
            last_velocity: None,
            last_heading: None,
            pending_key_down: None,
        }
    }

    /// Route a reported event to its recorder
    pub fn apply(&mut self, event: &TelemetryEvent) {
        match *event {
            TelemetryEvent::PointerMove { x, y, t } => self.record_pointer_move(x, y, t),
            TelemetryEvent::TouchMove { x, y, t } => self.record_touch_move(x, y, t),
            TelemetryEvent::PointerEnter => self.record_pointer_enter(),
            TelemetryEvent::KeyDown { t } => self.record_key_down(t),
            TelemetryEvent::KeyUp { t } => self.record_key_up(t),
            TelemetryEvent::Input { t } => self.record_input(t),
            TelemetryEvent::Paste => self.record_paste(),
            TelemetryEvent::Focus => self.record_focus(),
            TelemetryEvent::FirstInteraction { t, touch } => self.record_first_interaction(t, touch),
        }
    }

    pub fn record_pointer_move(&mut self, x: f64, y: f64, t: i64) {
        let sample = InteractionSample::new(x, y, t);

        if let Some(previous) = self.pointer_samples.last().copied() {
            let distance = previous.distance_to(&sample);
            let elapsed = t.saturating_sub(previous.timestamp_ms);
            let velocity = if elapsed > 0 { distance / elapsed as f64 } else { 0.0 };

            self.velocities.push(velocity);
            if let Some(last_velocity) = self.last_velocity {
                self.accelerations.push((velocity - last_velocity).abs());
            }
            self.last_velocity = Some(velocity);

            if velocity < PAUSE_VELOCITY {
                self.pauses += 1;
            }
            if distance > 0.0 && distance < MICRO_MOVEMENT_DISTANCE {
                self.micro_movements += 1;
            }

            // A zero-length move has no heading
            if distance > 0.0 {
                let heading = (y - previous.y).atan2(x - previous.x);
                if let Some(last_heading) = self.last_heading {
                    let turn = turn_angle(heading, last_heading);
                    self.turn_angles.push(turn);
                    if turn > DIRECTION_CHANGE_ANGLE {
                        self.direction_changes += 1;
                    }
                }
                self.last_heading = Some(heading);
            }

            self.pointer_distance += distance;
        }

        self.pointer_samples.push(sample);
        self.pointer_samples_seen += 1;
    }

    pub fn record_touch_move(&mut self, x: f64, y: f64, t: i64) {
        let sample = InteractionSample::new(x, y, t);
        if let Some(previous) = self.touch_samples.last() {
            self.touch_distance += previous.distance_to(&sample);
        }
        self.touch_samples.push(sample);
    }

    pub fn record_pointer_enter(&mut self) {
        self.pointer_entered = true;
    }

    pub fn record_key_down(&mut self, t: i64) {
        self.pending_key_down = Some(t);
    }

    /// Pairs with the pending key-down; an unmatched key-up is ignored
    pub fn record_key_up(&mut self, t: i64) {
        if let Some(down) = self.pending_key_down.take() {
            self.key_holds.push(t.saturating_sub(down).max(0) as f64);
        }
    }

    pub fn record_input(&mut self, t: i64) {
        self.input_timestamps.push(t);
    }

    /// Sticky for the rest of the attempt
    pub fn record_paste(&mut self) {
        self.paste_detected = true;
    }

    pub fn record_focus(&mut self) {
        self.focus_changes += 1;
    }

    /// Activation of the first slot; only the first call sets the start time
    pub fn record_first_interaction(&mut self, t: i64, via_touch: bool) {
        if self.started_at.is_none() {
            self.started_at = Some(t);
        }
        if via_touch {
            self.touch_used = true;
        }
    }

    pub fn device_class(&self) -> DeviceClass {
        self.device_class
    }

    pub fn pointer_samples(&self) -> &BoundedWindow<InteractionSample> {
        &self.pointer_samples
    }

    pub fn touch_samples(&self) -> &BoundedWindow<InteractionSample> {
        &self.touch_samples
    }

    pub fn pointer_samples_seen(&self) -> u64 {
        self.pointer_samples_seen
    }

    pub fn pointer_distance(&self) -> f64 {
        self.pointer_distance
    }

    pub fn touch_distance(&self) -> f64 {
        self.touch_distance
    }

    pub fn velocities(&self) -> &BoundedWindow<f64> {
        &self.velocities
    }

    pub fn accelerations(&self) -> &BoundedWindow<f64> {
        &self.accelerations
    }

    pub fn turn_angles(&self) -> &BoundedWindow<f64> {
        &self.turn_angles
    }

    pub fn pauses(&self) -> u32 {
        self.pauses
    }

    pub fn micro_movements(&self) -> u32 {
        self.micro_movements
    }

    pub fn direction_changes(&self) -> u32 {
        self.direction_changes
    }

    pub fn key_holds(&self) -> &BoundedWindow<f64> {
        &self.key_holds
    }

    /// Gaps between consecutive input events, in ms
    pub fn input_intervals(&self) -> Vec<f64> {
        let stamps: Vec<i64> = self.input_timestamps.iter().copied().collect();
        stamps.windows(2).map(|w| w[1].saturating_sub(w[0]) as f64).collect()
    }

    pub fn input_count(&self) -> usize {
        self.input_timestamps.len()
    }

    pub fn paste_detected(&self) -> bool {
        self.paste_detected
    }

    pub fn focus_changes(&self) -> u32 {
        self.focus_changes
    }

    pub fn pointer_entered(&self) -> bool {
        self.pointer_entered
    }

    pub fn touch_used(&self) -> bool {
        self.touch_used
    }

    pub fn started_at(&self) -> Option<i64> {
        self.started_at
    }

    /// Time since first interaction; `None` before any interaction
    pub fn elapsed_ms(&self, now_ms: i64) -> Option<u64> {
        self.started_at.map(|start| now_ms.saturating_sub(start).max(0) as u64)
    }

    pub fn kinematic_summary(&self) -> KinematicSummary {
        KinematicSummary {
            velocity_mean: self.velocities.mean().unwrap_or(0.0),
            velocity_variance: self.velocities.variance().unwrap_or(0.0),
            acceleration_mean: self.accelerations.mean().unwrap_or(0.0),
            pauses: self.pauses,
            micro_movements: self.micro_movements,
            direction_changes: self.direction_changes,
        }
    }

    /// Metrics block of the verification contract
    pub fn verification_metrics(&self, score: u8, now_ms: i64) -> VerificationMetrics {
        VerificationMetrics {
            sample_counts: PointerTouchPair {
                pointer: self.pointer_samples.len() as u32,
                touch: self.touch_samples.len() as u32,
            },
            distances: PointerTouchPair {
                pointer: self.pointer_distance,
                touch: self.touch_distance,
            },
            avg_key_hold: self.key_holds.mean().unwrap_or(0.0),
            completion_time_ms: self.elapsed_ms(now_ms),
            score,
            paste_detected: self.paste_detected,
            focus_changes: self.focus_changes,
            device_class: self.device_class,
        }
    }

    /// Both summaries together, as carried by an abuse report
    pub fn summary(&self, score: u8, now_ms: i64) -> MetricsSnapshot {
        MetricsSnapshot {
            verification: self.verification_metrics(score, now_ms),
            kinematics: self.kinematic_summary(),
        }
    }
}
