//! Configuration for [`crate::task_throttler::TaskThrottler`].

use crate::events::ThrottleEvent;
use ingest_core::events::{EventListeners, FnListener};
use std::time::Duration;

/// Configuration for a long-lived [`crate::task_throttler::TaskThrottler`].
pub struct TaskThrottlerConfig {
    pub(crate) name: String,
    pub(crate) max_concurrent: usize,
    pub(crate) max_starts_per_window: Option<usize>,
    pub(crate) max_cpu_time_share_per_window: Option<f64>,
    pub(crate) window: Duration,
    pub(crate) quit_on_failure: bool,
    pub(crate) event_listeners: EventListeners<ThrottleEvent>,
}

/// Builder for [`TaskThrottlerConfig`].
pub struct TaskThrottlerConfigBuilder {
    name: String,
    max_concurrent: usize,
    max_starts_per_window: Option<usize>,
    max_cpu_time_share_per_window: Option<f64>,
    window: Duration,
    quit_on_failure: bool,
    event_listeners: EventListeners<ThrottleEvent>,
}

impl Default for TaskThrottlerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskThrottlerConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_concurrent: 4
    /// - window: 1 second
    /// - max_starts_per_window / max_cpu_time_share_per_window: unlimited
    /// - quit_on_failure: false
    pub fn new() -> Self {
        Self {
            name: "<unnamed>".to_string(),
            max_concurrent: 4,
            max_starts_per_window: None,
            max_cpu_time_share_per_window: None,
            window: Duration::from_secs(1),
            quit_on_failure: false,
            event_listeners: EventListeners::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the maximum number of concurrently in-flight tasks.
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Sets the maximum number of task *starts* allowed per `window`.
    pub fn max_starts_per_window(mut self, max_starts: usize) -> Self {
        self.max_starts_per_window = Some(max_starts);
        self
    }

    /// Sets the maximum cumulative task wall-clock time allowed per
    /// `window`, expressed as a ratio of the window's own duration (e.g.
    /// `0.5` means at most half the window may be spent running tasks).
    ///
    /// This is a wall-clock-ratio approximation of CPU usage, not a true
    /// CPU-time measurement: under heavy suspension (tasks mostly awaiting
    /// I/O rather than computing) the ratio under-represents actual CPU
    /// load. Preserved as specified; callers wanting true CPU accounting
    /// must instrument task bodies themselves.
    pub fn max_cpu_time_share_per_window(mut self, ratio: f64) -> Self {
        self.max_cpu_time_share_per_window = Some(ratio.clamp(0.0, 1.0));
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// In `quit_on_failure` mode, the first task failure poisons the
    /// throttler; subsequent `enqueue` calls fail synchronously with
    /// [`crate::error::ThrottleError::Poisoned`] without running.
    pub fn quit_on_failure(mut self, quit_on_failure: bool) -> Self {
        self.quit_on_failure = quit_on_failure;
        self
    }

    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&ThrottleEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    pub fn build(self) -> TaskThrottlerConfig {
        TaskThrottlerConfig {
            name: self.name,
            max_concurrent: self.max_concurrent,
            max_starts_per_window: self.max_starts_per_window,
            max_cpu_time_share_per_window: self.max_cpu_time_share_per_window,
            window: self.window,
            quit_on_failure: self.quit_on_failure,
            event_listeners: self.event_listeners,
        }
    }
}
