//! Core types shared across Smudge components.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BLUR_LEVEL, DEFAULT_DIGITS, MAX_BLUR_LEVEL, MAX_DIGITS, MIN_DIGITS};

/// Device class of the interacting client.
///
/// Selects which movement branch of the trust score applies; the two
/// branches never both contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    #[default]
    Desktop,
    Mobile,
}

const MOBILE_UA_MARKERS: [&str; 8] = [
    "android",
    "webos",
    "iphone",
    "ipad",
    "ipod",
    "blackberry",
    "iemobile",
    "opera mini",
];

impl DeviceClass {
    /// Classify a user-agent string
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if MOBILE_UA_MARKERS.iter().any(|marker| ua.contains(marker)) {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, Self::Mobile)
    }
}

/// Challenge difficulty: how many digits and how strongly unrevealed
/// slots are obscured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Difficulty {
    digits: u8,
    blur_level: u8,
}

impl Difficulty {
    /// Create a difficulty, clamping digits to [4, 6] and blur to [0, 10]
    pub fn new(digits: u8, blur_level: u8) -> Self {
        Self {
            digits: digits.clamp(MIN_DIGITS, MAX_DIGITS),
            blur_level: blur_level.min(MAX_BLUR_LEVEL),
        }
    }

    pub fn digits(&self) -> u8 {
        self.digits
    }

    pub fn blur_level(&self) -> u8 {
        self.blur_level
    }

    /// One step harder: +1 digit (cap 6), +2 blur (cap 10)
    pub fn escalated(&self) -> Self {
        Self {
            digits: (self.digits + 1).min(MAX_DIGITS),
            blur_level: (self.blur_level + 2).min(MAX_BLUR_LEVEL),
        }
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::new(DEFAULT_DIGITS, DEFAULT_BLUR_LEVEL)
    }
}

/// Persisted attempt fields as read from the key/value store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSnapshot {
    /// Consecutive failed attempts
    pub failed_attempt_count: u32,

    /// Absolute lockout deadline (epoch millis)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lockout_deadline: Option<i64>,

    /// Last accepted attempt (epoch millis)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<i64>,
}

/// Screen geometry reported by the rendering layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub avail_width: u32,
    pub avail_height: u32,
    pub color_depth: u8,
    pub pixel_depth: u8,
    pub device_pixel_ratio: f64,
}

/// Browser environment reported by the rendering layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserInfo {
    pub user_agent: String,
    pub language: String,
    /// Comma-joined preferred languages
    pub languages: String,
    pub platform: String,
    pub hardware_concurrency: u32,
    pub timezone: String,
    /// Minutes from UTC, as the browser reports it
    pub timezone_offset: i32,
    pub cookie_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub do_not_track: Option<String>,
    /// Comma-joined plugin names
    pub plugins: String,
}

/// Static, low-entropy device descriptor captured once per widget instance.
///
/// A weak corroborating signal only; never a sole accept/reject criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub canvas_hash: String,
    pub webgl_vendor_renderer: String,
    pub screen_info: ScreenInfo,
    pub browser_info: BrowserInfo,
    /// Capture time (epoch millis)
    pub captured_at: i64,
}

/// Pointer and touch totals, reported separately
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointerTouchPair<T> {
    pub pointer: T,
    pub touch: T,
}

/// Metrics block of the remote verification request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMetrics {
    pub sample_counts: PointerTouchPair<u32>,
    pub distances: PointerTouchPair<f64>,
    /// Mean key-hold duration in ms (0 when no samples)
    pub avg_key_hold: f64,
    /// Elapsed time from first interaction to completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time_ms: Option<u64>,
    pub score: u8,
    pub paste_detected: bool,
    pub focus_changes: u32,
    pub device_class: DeviceClass,
}

/// Request body for the remote verifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub digits: Vec<u8>,
    pub metrics: VerificationMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
}

/// Response body of the remote verifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub success: bool,
}

/// Pointer kinematics summarised over the attempt's windows
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KinematicSummary {
    pub velocity_mean: f64,
    pub velocity_variance: f64,
    pub acceleration_mean: f64,
    pub pauses: u32,
    pub micro_movements: u32,
    pub direction_changes: u32,
}

/// Metric snapshot carried by an abuse report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    #[serde(flatten)]
    pub verification: VerificationMetrics,
    pub kinematics: KinematicSummary,
}

/// Fire-and-forget report raised when a scope enters lockout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbuseReport {
    pub score: u8,
    pub attempts: u32,
    /// Report time (epoch millis)
    pub timestamp: i64,
    pub metrics: MetricsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_class_from_user_agent() {
        let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)";
        let opera = "Opera/9.80 (J2ME/MIDP; Opera Mini/9.80; U; en)";
        let firefox = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

        assert_eq!(DeviceClass::from_user_agent(iphone), DeviceClass::Mobile);
        assert_eq!(DeviceClass::from_user_agent(opera), DeviceClass::Mobile);
        assert_eq!(DeviceClass::from_user_agent(firefox), DeviceClass::Desktop);
    }

    #[test]
    fn test_difficulty_clamps_and_escalates() {
        let d = Difficulty::new(2, 40);
        assert_eq!(d.digits(), 4);
        assert_eq!(d.blur_level(), 10);

        let d = Difficulty::default().escalated();
        assert_eq!((d.digits(), d.blur_level()), (5, 8));

        let d = d.escalated().escalated();
        assert_eq!((d.digits(), d.blur_level()), (6, 10));
    }

    #[test]
    fn test_verification_request_wire_names() {
        let request = VerificationRequest {
            digits: vec![1, 2, 3, 4],
            metrics: VerificationMetrics {
                sample_counts: PointerTouchPair { pointer: 12, touch: 0 },
                distances: PointerTouchPair { pointer: 80.0, touch: 0.0 },
                avg_key_hold: 120.0,
                completion_time_ms: Some(3000),
                score: 72,
                paste_detected: false,
                focus_changes: 4,
                device_class: DeviceClass::Desktop,
            },
            fingerprint: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["metrics"]["sampleCounts"]["pointer"], 12);
        assert_eq!(json["metrics"]["completionTimeMs"], 3000);
        assert_eq!(json["metrics"]["deviceClass"], "desktop");
        assert!(json.get("fingerprint").is_none());
    }
}
