//! Error types for the throttler.

/// Errors that can occur when using a throttler.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ThrottleError {
    /// The throttling call was cancelled before completion.
    #[error("throttled operation was cancelled")]
    Cancelled,
    /// The `TaskThrottler` is poisoned (a prior task failed under
    /// `quit_on_failure`); further enqueues are rejected synchronously.
    #[error("task throttler is poisoned after a prior failure")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, ThrottleError>;
