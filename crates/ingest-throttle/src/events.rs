//! Events emitted by throttler instances.

use ingest_core::events::IngestEvent;
use std::time::{Duration, Instant};

/// Observability events emitted by [`crate::task_throttler::TaskThrottler`].
#[derive(Debug, Clone)]
pub enum ThrottleEvent {
    TaskStarted {
        name: String,
        timestamp: Instant,
        index: usize,
    },
    TaskCompleted {
        name: String,
        timestamp: Instant,
        index: usize,
        duration: Duration,
        failed: bool,
    },
    TaskRejected {
        name: String,
        timestamp: Instant,
        reason: &'static str,
    },
}

impl IngestEvent for ThrottleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ThrottleEvent::TaskStarted { .. } => "task_started",
            ThrottleEvent::TaskCompleted { .. } => "task_completed",
            ThrottleEvent::TaskRejected { .. } => "task_rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ThrottleEvent::TaskStarted { timestamp, .. }
            | ThrottleEvent::TaskCompleted { timestamp, .. }
            | ThrottleEvent::TaskRejected { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            ThrottleEvent::TaskStarted { name, .. }
            | ThrottleEvent::TaskCompleted { name, .. }
            | ThrottleEvent::TaskRejected { name, .. } => name,
        }
    }
}
