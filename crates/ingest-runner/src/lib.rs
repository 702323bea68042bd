//! Top-level composition: a `Runner` wires the write façade, the optional
//! failover coordinator, and a caller-assembled set of upload-queue flush
//! loops together behind one explicit constructor — no container, no
//! trait-object service locator, just a struct holding the pieces a binary
//! built on this crate family needs (§9's re-architecture guidance).
//!
//! A caller builds its own `main`: construct a [`Destination`], optionally
//! a [`RowStore`] for failover, build a [`Runner`], then call
//! [`Runner::run`] with a closure that receives a [`RunnerContext`] and
//! drives the extractor's actual work (read source data, hand it to
//! `ctx.destination`, enqueue onto whatever [`ingest_queues::UploadQueue`]s
//! it built, and watch `ctx.cancellation` for shutdown/step-down).

use futures::future::BoxFuture;
use ingest_core::IngestError;
use ingest_destination::Destination;
use ingest_failover::{FailoverConfig, FailoverCoordinator, RowStore};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use ingest_destination as destination;
pub use ingest_failover as failover;
pub use ingest_queues as queues;

/// Timing/behavior knobs for a [`Runner`], independent of the failover
/// protocol's own timing (see [`FailoverConfig`]).
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// This replica's index in the failover row table; ignored if no
    /// [`RowStore`] is supplied to [`Runner::new`].
    pub replica_index: usize,
    /// Whether this replica starts `active` (only meaningful without
    /// failover, or for exactly one replica in a fresh deployment with no
    /// existing row table).
    pub initial_active: bool,
    pub failover: FailoverConfig,
    /// Calls [`Destination::validate_login`] before `start` runs, per
    /// §4.6's login-status check at startup.
    pub validate_login_on_start: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            replica_index: 0,
            initial_active: true,
            failover: FailoverConfig::default(),
            validate_login_on_start: true,
        }
    }
}

/// Handed to the caller's `start` closure: the façade to write through and
/// the token signalling shutdown (process-level, or this replica stepping
/// down to standby).
pub struct RunnerContext {
    pub destination: Arc<Destination>,
    pub cancellation: CancellationToken,
}

/// Owns the write façade, the optional failover coordinator, and the
/// cancellation token the caller's background work (queue flush loops,
/// the `start` closure itself) should observe.
pub struct Runner {
    config: RunnerConfig,
    destination: Arc<Destination>,
    failover: Option<Arc<FailoverCoordinator>>,
    cancellation: CancellationToken,
}

impl Runner {
    /// `row_store` is `Some` to run this replica under leader election
    /// (§4.8); `None` runs standalone, always active.
    pub fn new(config: RunnerConfig, destination: Arc<Destination>, row_store: Option<Arc<dyn RowStore>>) -> Self {
        let failover = row_store
            .map(|store| FailoverCoordinator::new(config.replica_index, config.failover, store));
        Self {
            config,
            destination,
            failover,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn destination(&self) -> Arc<Destination> {
        Arc::clone(&self.destination)
    }

    /// The token background work spawned alongside `start` (e.g. an
    /// `UploadQueue::start` flush loop) should be built against: it fires
    /// on step-down when failover is configured, or on `start` returning
    /// otherwise.
    pub fn cancellation(&self) -> CancellationToken {
        match &self.failover {
            Some(coordinator) => coordinator.main_cancellation(),
            None => self.cancellation.clone(),
        }
    }

    /// Validates login (if configured), joins the failover protocol (if a
    /// row store was supplied), spawns `background` tasks bound to
    /// [`Self::cancellation`], then runs `start` to completion. On return,
    /// steps down / cancels background work and awaits it before
    /// propagating `start`'s result.
    pub async fn run<F, Fut>(
        self,
        background: Vec<BoxFuture<'static, ()>>,
        start: F,
    ) -> Result<(), IngestError>
    where
        F: FnOnce(RunnerContext) -> Fut,
        Fut: Future<Output = Result<(), IngestError>>,
    {
        if self.config.validate_login_on_start {
            let status = self.destination.validate_login().await?;
            if !status.logged_in {
                return Err(IngestError::Config(format!(
                    "login validation failed for project {:?} (user {:?})",
                    status.project, status.user
                )));
            }
        }

        let coordinator_handle = match &self.failover {
            Some(coordinator) => {
                coordinator.start(self.config.initial_active).await?;
                let running = Arc::clone(coordinator);
                Some(tokio::spawn(async move { running.run().await }))
            }
            None => None,
        };

        let background_handles: Vec<JoinHandle<()>> =
            background.into_iter().map(|task| tokio::spawn(task)).collect();

        let ctx_cancellation = self.cancellation();
        let ctx = RunnerContext { destination: Arc::clone(&self.destination), cancellation: ctx_cancellation.clone() };
        let result = start(ctx).await;

        // `start` returning is itself a shutdown: stop this replica's
        // coordinator loops and cancel the token background work (and any
        // future caller) watches, even if no step-down ever happened.
        if let Some(coordinator) = &self.failover {
            coordinator.shutdown();
        }
        ctx_cancellation.cancel();

        if let Some(handle) = coordinator_handle {
            let _ = handle.await;
        }
        for handle in background_handles {
            let _ = handle.await;
        }

        result
    }
}
