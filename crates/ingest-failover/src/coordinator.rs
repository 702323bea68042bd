//! Leader election across N replicas via a shared row table (§4.8).
//!
//! Each replica runs one [`FailoverCoordinator`]. On start it writes its row
//! and begins heartbeating; standbys additionally poll for promotion.
//! `main_cancellation()` is the token the rest of the replica's application
//! should hold onto — it fires the moment this replica steps down, and is
//! replaced by a fresh token on every promotion.

use crate::config::FailoverConfig;
use crate::row::LogRow;
use crate::store::RowStore;
use ingest_core::IngestError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct FailoverCoordinator {
    index: usize,
    config: FailoverConfig,
    store: Arc<dyn RowStore>,
    active: AtomicBool,
    main_cancellation: Mutex<CancellationToken>,
    coordinator_token: CancellationToken,
    snapshot: Mutex<HashMap<String, LogRow>>,
}

impl FailoverCoordinator {
    pub fn new(index: usize, config: FailoverConfig, store: Arc<dyn RowStore>) -> Arc<Self> {
        Arc::new(Self {
            index,
            config,
            store,
            active: AtomicBool::new(false),
            main_cancellation: Mutex::new(CancellationToken::new()),
            coordinator_token: CancellationToken::new(),
            snapshot: Mutex::new(HashMap::new()),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Token observed by this replica's main application loop; cancelled on
    /// step-down, replaced with a fresh token on each promotion.
    pub fn main_cancellation(&self) -> CancellationToken {
        self.main_cancellation.lock().unwrap().clone()
    }

    /// Stops this coordinator's own background loops (not the replica's
    /// main work, which is governed separately via `main_cancellation`).
    pub fn shutdown(&self) {
        self.coordinator_token.cancel();
    }

    fn key(&self) -> String {
        self.index.to_string()
    }

    fn is_responsive(&self, row: &LogRow) -> bool {
        Instant::now().saturating_duration_since(row.timestamp) < self.config.inactivity_threshold
    }

    /// Writes the initial row (`active = initial_active`) and starts this
    /// replica's role in the protocol; the returned future runs the
    /// heartbeat and wait-to-become-active loops until `shutdown()`.
    pub async fn start(self: &Arc<Self>, initial_active: bool) -> Result<(), IngestError> {
        self.active.store(initial_active, Ordering::Release);
        let row = LogRow::new(self.key(), Instant::now(), initial_active);
        self.store.write_row(row.clone()).await?;
        self.merge_snapshot(std::iter::once(row));
        Ok(())
    }

    /// Runs `UpdateStateAtInterval` and `WaitToBecomeActive` concurrently
    /// until `shutdown()` is called. Intended to be spawned as a background
    /// task right after `start()`.
    pub async fn run(self: Arc<Self>) {
        let heartbeat = Arc::clone(&self).heartbeat_loop();
        let wait = Arc::clone(&self).wait_loop();
        tokio::join!(heartbeat, wait);
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.heartbeat_interval);
        loop {
            tokio::select! {
                _ = self.coordinator_token.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(_err) = self.heartbeat().await {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(replica = self.index, "failover heartbeat write failed");
                    }
                }
            }
        }
    }

    async fn wait_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.wait_interval);
        loop {
            tokio::select! {
                _ = self.coordinator_token.cancelled() => break,
                _ = interval.tick() => {
                    if self.is_active() {
                        continue;
                    }
                    if let Err(_err) = self.wait_to_become_active().await {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(replica = self.index, "wait_to_become_active failed");
                    }
                }
            }
        }
    }

    async fn heartbeat(&self) -> Result<(), IngestError> {
        let row = LogRow::new(self.key(), Instant::now(), self.is_active());
        self.store.write_row(row.clone()).await?;
        self.merge_snapshot(std::iter::once(row));
        self.check_if_multiple_active_extractors().await
    }

    /// Standby protocol step: promote ourselves if no responsive row is
    /// currently active and we are the smallest-indexed responsive standby.
    async fn wait_to_become_active(&self) -> Result<(), IngestError> {
        let rows = self.refresh_snapshot().await?;
        let any_active_responsive = rows.iter().any(|r| r.active && self.is_responsive(r));
        if any_active_responsive {
            return Ok(());
        }

        let smallest_responsive = rows
            .iter()
            .filter(|r| self.is_responsive(r))
            .filter_map(|r| r.index())
            .min();

        if smallest_responsive == Some(self.index) {
            self.promote().await?;
        }
        Ok(())
    }

    /// Heartbeat protocol step: if two or more responsive rows claim
    /// `active`, the one with the largest index steps down.
    async fn check_if_multiple_active_extractors(&self) -> Result<(), IngestError> {
        let rows = self.refresh_snapshot().await?;
        let responsive_active: Vec<usize> = rows
            .iter()
            .filter(|r| r.active && self.is_responsive(r))
            .filter_map(|r| r.index())
            .collect();

        if responsive_active.len() >= 2 && responsive_active.iter().max() == Some(&self.index) {
            self.step_down().await?;
        }
        Ok(())
    }

    async fn promote(&self) -> Result<(), IngestError> {
        self.active.store(true, Ordering::Release);
        *self.main_cancellation.lock().unwrap() = CancellationToken::new();
        let row = LogRow::new(self.key(), Instant::now(), true);
        self.store.write_row(row.clone()).await?;
        self.merge_snapshot(std::iter::once(row));
        #[cfg(feature = "tracing")]
        tracing::info!(replica = self.index, "promoted to active");
        Ok(())
    }

    async fn step_down(&self) -> Result<(), IngestError> {
        self.active.store(false, Ordering::Release);
        self.main_cancellation.lock().unwrap().cancel();
        let row = LogRow::new(self.key(), Instant::now(), false);
        self.store.write_row(row.clone()).await?;
        self.merge_snapshot(std::iter::once(row));
        #[cfg(feature = "tracing")]
        tracing::info!(replica = self.index, "stepped down");
        Ok(())
    }

    /// Reads the table and merges it into the in-memory snapshot, so rows
    /// the store momentarily omits keep their last known value instead of
    /// vanishing and causing a spurious promotion.
    async fn refresh_snapshot(&self) -> Result<Vec<LogRow>, IngestError> {
        let fresh = self.store.read_all().await?;
        Ok(self.merge_snapshot(fresh))
    }

    fn merge_snapshot(&self, rows: impl IntoIterator<Item = LogRow>) -> Vec<LogRow> {
        let mut snapshot = self.snapshot.lock().unwrap();
        for row in rows {
            snapshot.insert(row.key.clone(), row);
        }
        snapshot.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::collections::HashMap as Map;

    struct MemoryStore {
        rows: Mutex<Map<String, LogRow>>,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self { rows: Mutex::new(Map::new()) }
        }
    }

    impl RowStore for MemoryStore {
        fn read_all(&self) -> BoxFuture<'static, Result<Vec<LogRow>, IngestError>> {
            let rows: Vec<LogRow> = self.rows.lock().unwrap().values().cloned().collect();
            Box::pin(async move { Ok(rows) })
        }

        fn write_row(&self, row: LogRow) -> BoxFuture<'static, Result<(), IngestError>> {
            self.rows.lock().unwrap().insert(row.key.clone(), row);
            Box::pin(async { Ok(()) })
        }
    }

    fn config() -> FailoverConfig {
        FailoverConfig {
            inactivity_threshold: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(5),
            wait_interval: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn start_writes_the_initial_row_with_the_requested_active_state() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = FailoverCoordinator::new(0, config(), store.clone());
        coordinator.start(true).await.unwrap();
        assert!(coordinator.is_active());
        let row = store.rows.lock().unwrap().get("0").cloned().unwrap();
        assert!(row.active);
    }

    #[tokio::test]
    async fn lone_standby_promotes_itself_once_no_row_is_responsively_active() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = FailoverCoordinator::new(0, config(), store.clone());
        coordinator.start(false).await.unwrap();
        assert!(!coordinator.is_active());

        coordinator.wait_to_become_active().await.unwrap();
        assert!(coordinator.is_active());
    }

    #[tokio::test]
    async fn larger_index_steps_down_when_two_rows_are_responsively_active() {
        let store = Arc::new(MemoryStore::new());
        let low = FailoverCoordinator::new(0, config(), store.clone());
        let high = FailoverCoordinator::new(1, config(), store.clone());
        low.start(true).await.unwrap();
        high.start(true).await.unwrap();

        high.check_if_multiple_active_extractors().await.unwrap();
        assert!(!high.is_active());
        assert!(low.is_active());
    }

    #[tokio::test]
    async fn promotion_hands_out_a_fresh_main_cancellation_token() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = FailoverCoordinator::new(0, config(), store.clone());
        coordinator.start(true).await.unwrap();
        let before = coordinator.main_cancellation();
        coordinator.step_down().await.unwrap();
        assert!(before.is_cancelled());

        coordinator.promote().await.unwrap();
        let after = coordinator.main_cancellation();
        assert!(!after.is_cancelled());
    }
}
