//! Error types for limiter construction and release
use std::time::Duration;

/// Errors returned by limiter operations at runtime.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum LimiterError {
    /// `release` was called while no permit was outstanding.
    ///
    /// This is a caller bug: every release must be matched by a prior successful
    /// acquisition. The limiter state is left unchanged.
    #[error("release without an associated acquire")]
    OverRelease,
}

impl LimiterError {
    /// Check if this error is an over-release.
    pub fn is_over_release(&self) -> bool {
        matches!(self, Self::OverRelease)
    }
}

/// Errors produced when validating limiter configuration.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// Capacity must be > 0.
    #[error("capacity must be > 0")]
    ZeroCapacity,
    /// The jitter range upper bound is below the minimum pause.
    #[error("max_pause must not be below min_pause (min {min:?}, max {max:?})")]
    InvertedPause {
        /// Configured minimum pause.
        min: Duration,
        /// Configured maximum pause.
        max: Duration,
    },
}
