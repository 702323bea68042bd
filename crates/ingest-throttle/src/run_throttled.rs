//! Fail-fast bag-of-thunks throttling: `run_throttled` runs a fixed batch
//! of task-producing thunks with bounded parallelism. On the first
//! failure, remaining not-yet-started thunks are cancelled; already
//! in-flight thunks are awaited to completion but their outcome is
//! discarded in favor of the first observed failure.

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A single unit of throttled work: a thunk that, when called, produces
/// the future to run. Boxed so a caller can pass a heterogeneous batch of
/// differently-captured closures in one `Vec`.
pub type Thunk<T, E> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, E>> + Send>;

/// Runs `thunks` with at most `parallelism` running concurrently.
///
/// A single `cancellation` token governs the whole call: if it is already
/// cancelled, or becomes cancelled by the caller mid-flight, queued thunks
/// are skipped and in-flight ones are awaited (their results discarded).
pub async fn run_throttled<T, E>(
    thunks: Vec<Thunk<T, E>>,
    parallelism: usize,
    cancellation: CancellationToken,
) -> Result<Vec<T>, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    assert!(parallelism > 0, "parallelism must be positive");

    let semaphore = Arc::new(Semaphore::new(parallelism));
    let internal_stop = cancellation.child_token();
    let mut set = JoinSet::new();

    for thunk in thunks {
        if internal_stop.is_cancelled() {
            break;
        }
        let semaphore = Arc::clone(&semaphore);
        let stop = internal_stop.clone();
        set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return None,
            };
            if stop.is_cancelled() {
                return None;
            }
            Some(thunk().await)
        });
    }

    let mut results = Vec::new();
    let mut failure: Option<E> = None;

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Some(Ok(value))) => {
                if failure.is_none() {
                    results.push(value);
                }
            }
            Ok(Some(Err(err))) => {
                internal_stop.cancel();
                if failure.is_none() {
                    failure = Some(err);
                }
            }
            Ok(None) => {}
            Err(_join_error) => {
                // A spawned task panicked. The panic itself propagates to
                // the runtime's panic hook; we don't classify it as a
                // thunk failure since we have no `E` value to report.
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(results),
    }
}
