//! Backoff strategies for `TransientFatal` retries (§4.4, §7): exponential,
//! capped at `2^min(attempts, 9)` seconds, jittered ±10%.

use std::time::Duration;

/// Abstraction for computing the delay before a retry attempt.
pub trait IntervalFunction: Send + Sync {
    /// Computes the delay before retry attempt `attempt` (0-indexed).
    fn next_interval(&self, attempt: usize) -> Duration;
}

/// Fixed interval backoff — the same duration for every retry.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    duration: Duration,
}

impl FixedInterval {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl IntervalFunction for FixedInterval {
    fn next_interval(&self, _attempt: usize) -> Duration {
        self.duration
    }
}

/// Exponential backoff capped at `2^min(attempts, cap_exponent)` multiples
/// of `initial_interval`, per §7's retry policy.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    cap_exponent: u32,
    max_interval: Option<Duration>,
}

impl ExponentialBackoff {
    /// Creates an exponential backoff with the §7 default cap exponent (9).
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            cap_exponent: 9,
            max_interval: None,
        }
    }

    pub fn cap_exponent(mut self, cap_exponent: u32) -> Self {
        self.cap_exponent = cap_exponent;
        self
    }

    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        let exponent = (attempt as u32).min(self.cap_exponent);
        let interval = self.initial_interval.mul_f64(2f64.powi(exponent as i32));
        match self.max_interval {
            Some(max) => interval.min(max),
            None => interval,
        }
    }
}

/// Exponential backoff jittered by ±`jitter_factor` to avoid thundering
/// herd across concurrently retrying chunks.
#[derive(Debug, Clone)]
pub struct JitteredExponentialBackoff {
    inner: ExponentialBackoff,
    jitter_factor: f64,
}

impl JitteredExponentialBackoff {
    /// Creates a jittered exponential backoff. `jitter_factor` is clamped
    /// to `[0.0, 1.0]`; §7 specifies ±10% (`jitter_factor = 0.1`).
    pub fn new(initial_interval: Duration, jitter_factor: f64) -> Self {
        Self {
            inner: ExponentialBackoff::new(initial_interval),
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    pub fn cap_exponent(mut self, cap_exponent: u32) -> Self {
        self.inner = self.inner.cap_exponent(cap_exponent);
        self
    }

    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.inner = self.inner.max_interval(max_interval);
        self
    }

    fn randomize(&self, duration: Duration) -> Duration {
        use rand::Rng;
        let mut rng = rand::rng();
        let delta = duration.as_secs_f64() * self.jitter_factor;
        let min = (duration.as_secs_f64() - delta).max(0.0);
        let max = duration.as_secs_f64() + delta;
        let randomized = if max > min { rng.random_range(min..=max) } else { min };
        Duration::from_secs_f64(randomized)
    }
}

impl IntervalFunction for JitteredExponentialBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        self.randomize(self.inner.next_interval(attempt))
    }
}

/// Function-based interval implementation, for custom backoff logic.
pub struct FnInterval<F> {
    f: F,
}

impl<F> FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> IntervalFunction for FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn next_interval(&self, attempt: usize) -> Duration {
        (self.f)(attempt)
    }
}
