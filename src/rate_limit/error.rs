//! Rate Limit Error Types
//!
//! Admission decisions never fail. The only error path is building a
//! controller from an invalid policy or invalid tuning options.

use std::time::Duration;

/// Error types for rate limiter construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Limit must admit at least one event per window
    #[error("Invalid limit: must be greater than zero")]
    InvalidLimit,

    /// Window must be a positive duration
    #[error("Invalid window: must be greater than zero")]
    InvalidWindow,

    /// Idle horizon shorter than the window would evict live counters
    #[error("Idle horizon {horizon:?} must be at least the window {window:?}")]
    IdleHorizonTooShort {
        /// Requested idle horizon
        horizon: Duration,
        /// Policy window
        window: Duration,
    },

    /// Shard count must be a power of two greater than one
    #[error("Invalid shard count {0}: must be a power of two greater than 1")]
    InvalidShardCount(usize),

    /// Tracked key capacity must be positive when set
    #[error("Invalid tracked key capacity: must be greater than zero")]
    InvalidCapacity,
}

/// Result alias for rate limiter construction
pub type Result<T> = std::result::Result<T, RateLimitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            RateLimitError::InvalidLimit.to_string(),
            "Invalid limit: must be greater than zero"
        );
        assert_eq!(
            RateLimitError::InvalidShardCount(3).to_string(),
            "Invalid shard count 3: must be a power of two greater than 1"
        );

        let err = RateLimitError::IdleHorizonTooShort {
            horizon: Duration::from_secs(1),
            window: Duration::from_secs(60),
        };
        assert!(err.to_string().contains("must be at least the window"));
    }
}
