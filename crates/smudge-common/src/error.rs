//! Common error types for Smudge components.

use thiserror::Error;

/// Common errors across Smudge components
#[derive(Debug, Error)]
pub enum SmudgeError {
    /// Configuration error (fatal at construction)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Redis connection/operation error
    #[error("Redis error: {0}")]
    Redis(String),

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown or evicted challenge session
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Challenge is in cooldown
    #[error("Locked out for another {remaining_ms}ms")]
    Locked { remaining_ms: u64 },

    /// Remote verification failed to complete
    #[error("Verification error: {0}")]
    Verification(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl SmudgeError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::Redis(_) => 503,
            Self::InvalidInput(_) => 400,
            Self::SessionNotFound(_) => 404,
            Self::Locked { .. } => 423,
            Self::Verification(_) => 502,
            Self::Internal(_) => 500,
            Self::Timeout(_) => 504,
        }
    }

    /// Returns true if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Redis(_) | Self::Verification(_) | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(SmudgeError::Config("x".into()).status_code(), 500);
        assert_eq!(SmudgeError::Locked { remaining_ms: 10 }.status_code(), 423);
        assert_eq!(SmudgeError::SessionNotFound("s".into()).status_code(), 404);
    }

    #[test]
    fn test_retryable() {
        assert!(SmudgeError::Timeout("verify".into()).is_retryable());
        assert!(!SmudgeError::InvalidInput("7a".into()).is_retryable());
    }
}
