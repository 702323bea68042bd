use std::time::Duration;

/// Timing knobs for the failover protocol (§4.8).
#[derive(Debug, Clone, Copy)]
pub struct FailoverConfig {
    /// A row older than this is no longer "responsive".
    pub inactivity_threshold: Duration,
    /// Cadence of `UpdateStateAtInterval`.
    pub heartbeat_interval: Duration,
    /// Cadence of `WaitToBecomeActive`.
    pub wait_interval: Duration,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(10),
            wait_interval: Duration::from_secs(5),
        }
    }
}
