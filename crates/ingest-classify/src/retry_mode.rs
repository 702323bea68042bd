//! Generalizes `tower-resilience-reconnect`'s `ReconnectPolicy` enum — a
//! closed set of named strategies with simple constructors — into the
//! write engine's retry policy.

use ingest_core::{CogniteError, ErrorType};

/// Governs whether a failed chunk is resent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// Never resend a failed chunk.
    None,
    /// Resend on any non-fatal error.
    OnError,
    /// Resend only on `TransientFatal` errors; other non-fatal errors are
    /// surfaced to the caller without a retry.
    OnFatal,
}

impl RetryMode {
    /// Returns whether `error` should trigger a resend under this mode.
    /// `Fatal` errors are never retried, regardless of mode.
    pub fn should_retry<T>(&self, error: &CogniteError<T>) -> bool {
        if error.is_fatal() {
            return false;
        }
        match self {
            RetryMode::None => false,
            RetryMode::OnError => true,
            RetryMode::OnFatal => error.is_transient_fatal(),
        }
    }
}

impl Default for RetryMode {
    fn default() -> Self {
        RetryMode::OnFatal
    }
}
