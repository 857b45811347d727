//! Shared constants for Smudge components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default Gatehouse HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8890";

/// Default number of digits in a fresh challenge
pub const DEFAULT_DIGITS: u8 = 4;

/// Smallest allowed challenge length
pub const MIN_DIGITS: u8 = 4;

/// Largest allowed challenge length (also the escalation cap)
pub const MAX_DIGITS: u8 = 6;

/// Default obscuring level for unrevealed slots
pub const DEFAULT_BLUR_LEVEL: u8 = 6;

/// Obscuring level cap
pub const MAX_BLUR_LEVEL: u8 = 10;

/// Score at or above which an attempt is accepted as human
pub const DEFAULT_TRUST_THRESHOLD: u8 = 40;

/// Failures at which difficulty starts escalating
pub const ESCALATION_AFTER_FAILURES: u32 = 3;

/// Failures at which the cooldown lockout starts
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Lockout cooldown in milliseconds (5 minutes)
pub const LOCKOUT_COOLDOWN_MS: i64 = 5 * 60 * 1000;

/// Raw pointer/touch samples kept per attempt
pub const SAMPLE_WINDOW_CAP: usize = 50;

/// Derived kinematic values kept per attempt
pub const KINEMATIC_WINDOW_CAP: usize = 100;

/// Local timeout for a remote verification round-trip (milliseconds)
pub const VERIFICATION_TIMEOUT_MS: u64 = 5000;

/// Persistence keys (string-valued key/value contract)
pub mod store_keys {
    /// Consecutive failed attempts (integer counter)
    pub const BOT_ATTEMPTS: &str = "botAttempts";

    /// Absolute lockout deadline (epoch millis)
    pub const TIMEOUT_END: &str = "timeoutEnd";

    /// Last accepted attempt (epoch millis, informational)
    pub const LAST_SUCCESS: &str = "lastSuccess";
}

/// Sentinel values reported by fingerprint probes that could not run
pub mod sentinels {
    pub const CANVAS_ERROR: &str = "canvas-error";
    pub const WEBGL_NOT_SUPPORTED: &str = "webgl-not-supported";
    pub const WEBGL_ERROR: &str = "webgl-error";
    pub const UNKNOWN: &str = "unknown";
}

/// Redis key prefixes
pub mod redis_keys {
    /// Persisted attempt fields: attempts:{scope}:{field}
    pub const ATTEMPTS_PREFIX: &str = "attempts:";

    /// Abuse reports (capped list)
    pub const BOT_REPORTS: &str = "smudge:bot_reports";
}

/// HTTP header names
pub mod headers {
    /// Persistence scope override (one lockout per scope)
    pub const X_SMUDGE_SCOPE: &str = "X-Smudge-Scope";
}
