//! Long-lived task throttler: enforces a maximum concurrency, a maximum
//! number of task starts per time window, and an (approximate) cumulative
//! wall-clock-time ceiling per window.

use crate::config::TaskThrottlerConfig;
use crate::error::ThrottleError;
use crate::events::ThrottleEvent;
use crate::run_throttled::Thunk;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Outcome of one task run through a [`TaskThrottler`].
#[derive(Debug)]
pub struct TaskResult<T, E> {
    pub index: usize,
    pub start: Instant,
    pub end: Instant,
    pub output: Result<T, E>,
}

struct WindowState {
    window_start: Instant,
    starts_in_window: usize,
    wall_time_used: Duration,
}

/// Long-lived throttler. Accepts enqueues over its lifetime; see
/// module docs for the admission rules it enforces.
pub struct TaskThrottler<T, E> {
    config: Arc<TaskThrottlerConfig>,
    semaphore: Arc<Semaphore>,
    window: Mutex<WindowState>,
    poisoned: AtomicBool,
    next_index: AtomicUsize,
    cancellation: CancellationToken,
    _marker: std::marker::PhantomData<fn() -> (T, E)>,
}

impl<T, E> TaskThrottler<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new(config: TaskThrottlerConfig, cancellation: CancellationToken) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            config: Arc::new(config),
            semaphore,
            window: Mutex::new(WindowState {
                window_start: Instant::now(),
                starts_in_window: 0,
                wall_time_used: Duration::ZERO,
            }),
            poisoned: AtomicBool::new(false),
            next_index: AtomicUsize::new(0),
            cancellation,
            _marker: std::marker::PhantomData,
        }
    }

    /// Returns `true` once a task has failed under `quit_on_failure`.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    /// Enqueues `thunk` for execution, blocking (without holding an OS
    /// thread) until a concurrency permit and window capacity are both
    /// available, then runs it.
    pub async fn enqueue(&self, thunk: Thunk<T, E>) -> Result<TaskResult<T, E>, ThrottleError> {
        if self.config.quit_on_failure && self.is_poisoned() {
            return Err(ThrottleError::Poisoned);
        }
        if self.cancellation.is_cancelled() {
            return Err(ThrottleError::Cancelled);
        }

        let index = self.next_index.fetch_add(1, Ordering::SeqCst);

        let permit = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => return Err(ThrottleError::Cancelled),
            permit = self.semaphore.acquire() => permit.map_err(|_| ThrottleError::Cancelled)?,
        };

        if self.wait_for_window_capacity().await.is_err() {
            drop(permit);
            return Err(ThrottleError::Cancelled);
        }

        let start = Instant::now();
        self.config.event_listeners.emit(&ThrottleEvent::TaskStarted {
            name: self.config.name.clone(),
            timestamp: start,
            index,
        });

        #[cfg(feature = "metrics")]
        metrics::gauge!("ingest_throttler_in_flight", "throttler" => self.config.name.clone())
            .increment(1.0);

        let output = thunk().await;
        let end = Instant::now();
        drop(permit);

        #[cfg(feature = "metrics")]
        metrics::gauge!("ingest_throttler_in_flight", "throttler" => self.config.name.clone())
            .decrement(1.0);

        {
            let mut state = self.window.lock().unwrap();
            state.wall_time_used += end.duration_since(start);
        }

        let failed = output.is_err();
        if failed && self.config.quit_on_failure {
            self.poisoned.store(true, Ordering::SeqCst);
        }

        self.config.event_listeners.emit(&ThrottleEvent::TaskCompleted {
            name: self.config.name.clone(),
            timestamp: end,
            index,
            duration: end.duration_since(start),
            failed,
        });

        Ok(TaskResult {
            index,
            start,
            end,
            output,
        })
    }

    async fn wait_for_window_capacity(&self) -> Result<(), ()> {
        loop {
            let wait = {
                let mut state = self.window.lock().unwrap();
                let now = Instant::now();
                if now.duration_since(state.window_start) >= self.config.window {
                    state.window_start = now;
                    state.starts_in_window = 0;
                    state.wall_time_used = Duration::ZERO;
                }

                let starts_ok = self
                    .config
                    .max_starts_per_window
                    .map_or(true, |max| state.starts_in_window < max);
                let time_ok = self.config.max_cpu_time_share_per_window.map_or(true, |ratio| {
                    state.wall_time_used < self.config.window.mul_f64(ratio)
                });

                if starts_ok && time_ok {
                    state.starts_in_window += 1;
                    None
                } else {
                    Some(self.config.window.saturating_sub(now.duration_since(state.window_start)))
                }
            };

            match wait {
                None => return Ok(()),
                Some(duration) => {
                    tokio::select! {
                        biased;
                        _ = self.cancellation.cancelled() => return Err(()),
                        _ = tokio::time::sleep(duration.max(Duration::from_millis(1))) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskThrottlerConfigBuilder;
    use std::sync::atomic::AtomicUsize;

    fn thunk<T, E, F, Fut>(f: F) -> Thunk<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<T, E>> + Send + 'static,
    {
        Box::new(move || Box::pin(f()))
    }

    #[tokio::test]
    async fn enqueue_runs_and_returns_result() {
        let config = TaskThrottlerConfigBuilder::new().max_concurrent(2).build();
        let throttler: TaskThrottler<i32, String> =
            TaskThrottler::new(config, CancellationToken::new());

        let result = throttler
            .enqueue(thunk(|| async { Ok::<i32, String>(42) }))
            .await
            .unwrap();
        assert_eq!(result.output, Ok(42));
        assert_eq!(result.index, 0);
    }

    #[tokio::test]
    async fn quit_on_failure_poisons_subsequent_enqueues() {
        let config = TaskThrottlerConfigBuilder::new()
            .max_concurrent(2)
            .quit_on_failure(true)
            .build();
        let throttler: TaskThrottler<i32, String> =
            TaskThrottler::new(config, CancellationToken::new());

        let failing = throttler
            .enqueue(thunk(|| async { Err::<i32, String>("boom".into()) }))
            .await
            .unwrap();
        assert!(failing.output.is_err());
        assert!(throttler.is_poisoned());

        let rejected = throttler.enqueue(thunk(|| async { Ok::<i32, String>(1) })).await;
        assert!(matches!(rejected, Err(ThrottleError::Poisoned)));
    }

    #[tokio::test]
    async fn respects_max_concurrent() {
        let config = TaskThrottlerConfigBuilder::new().max_concurrent(2).build();
        let throttler: Arc<TaskThrottler<(), String>> =
            Arc::new(TaskThrottler::new(config, CancellationToken::new()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let throttler = Arc::clone(&throttler);
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                throttler
                    .enqueue(thunk(move || async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(15)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<(), String>(())
                    }))
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn enforces_starts_per_window() {
        let config = TaskThrottlerConfigBuilder::new()
            .max_concurrent(10)
            .max_starts_per_window(2)
            .window(Duration::from_millis(100))
            .build();
        let throttler: TaskThrottler<(), String> =
            TaskThrottler::new(config, CancellationToken::new());

        let t0 = Instant::now();
        for _ in 0..3 {
            throttler
                .enqueue(thunk(|| async { Ok::<(), String>(()) }))
                .await
                .unwrap();
        }
        // The third start must have waited for a fresh window.
        assert!(Instant::now().duration_since(t0) >= Duration::from_millis(100));
    }
}
