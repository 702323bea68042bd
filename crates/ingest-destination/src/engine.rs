//! The chunked, sanitized, throttled, classify-and-clean write pipeline
//! (§2's control flow: Façade → Sanitizer → Chunker → Throttler → HTTP →
//! Classifier → Cleaner → Throttler (retry) ... until success, exhaustion,
//! or fatal) shared by every façade operation that writes a batch of
//! entities.

use futures::future::BoxFuture;
use ingest_chunking::chunk_by_count;
use ingest_classify::{classify_response_with_hint, Cleaner, RetryMode};
use ingest_core::{CogniteError, CogniteResult, ErrorKey, ErrorType, OffenderMatch, ResourceType, UniqueKey};
use ingest_sanitize::{clean_request_by, SanitationMode, Sanitize};
use ingest_throttle::backoff::{IntervalFunction, JitteredExponentialBackoff};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::transport::TransportError;

/// Default cap on items per `create`/`update` request (§4.1), overridable
/// via [`WriteOptions::chunk_size`].
pub const DEFAULT_ITEM_CHUNK_SIZE: usize = 1000;

/// Default cap on data points per series per `insert` request (§6's
/// `N_dp_points`).
pub const DEFAULT_DATA_POINTS_PER_REQUEST: usize = 10_000;

/// Options governing one façade write call: how items are repaired before
/// sending (§4.3), how many ride in one HTTP request (§4.1), how many
/// requests run concurrently (§4.2), and whether a rejected chunk is
/// cleaned and retried (§4.5).
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub sanitation_mode: SanitationMode,
    pub retry_mode: RetryMode,
    pub chunk_size: usize,
    pub parallelism: usize,
    pub max_retries: usize,
    /// Disambiguates a server `missing` array with no shape of its own
    /// (§4.4) — e.g. time-series create reports missing asset references
    /// under `AssetId`, not the classifier's default `ExternalId`.
    pub resource_hint: Option<ResourceType>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            sanitation_mode: SanitationMode::Clean { non_finite_replacement: None },
            retry_mode: RetryMode::default(),
            chunk_size: DEFAULT_ITEM_CHUNK_SIZE,
            parallelism: 4,
            max_retries: 5,
            resource_hint: None,
        }
    }
}

impl WriteOptions {
    pub fn with_retry_mode(mut self, retry_mode: RetryMode) -> Self {
        self.retry_mode = retry_mode;
        self
    }

    pub fn with_sanitation_mode(mut self, sanitation_mode: SanitationMode) -> Self {
        self.sanitation_mode = sanitation_mode;
        self
    }

    pub fn with_resource_hint(mut self, resource_hint: ResourceType) -> Self {
        self.resource_hint = Some(resource_hint);
        self
    }
}

/// Runs `items` through sanitize → dedup → chunk → (bounded-concurrency)
/// send → classify → clean → retry, returning a merged [`CogniteResult`].
/// `dedup_resource` names the dimension request-level dedup (§4.3) reports
/// duplicates against; `send` performs one chunk's HTTP call.
pub(crate) async fn write_batch<T, F>(
    items: Vec<T>,
    options: &WriteOptions,
    dedup_resource: ResourceType,
    send: F,
) -> CogniteResult<T, T>
where
    T: Sanitize + UniqueKey + OffenderMatch + Clone + Send + 'static,
    T::Key: Into<ErrorKey>,
    F: Fn(Vec<T>) -> BoxFuture<'static, Result<Vec<T>, TransportError>> + Send + Sync + 'static,
{
    let mut result = CogniteResult::default();

    let sanitized = sanitize_items(items, options.sanitation_mode, &mut result);
    let (deduped, dup_error) = clean_request_by(sanitized, dedup_resource, |item: &T| item.unique_key());
    if let Some(error) = dup_error {
        result.push_error(error);
    }
    if deduped.is_empty() {
        return result;
    }

    let chunks = chunk_by_count(deduped, options.chunk_size.max(1));
    let send = Arc::new(send);
    let semaphore = Arc::new(Semaphore::new(options.parallelism.max(1)));
    let backoff = Arc::new(JitteredExponentialBackoff::new(Duration::from_secs(1), 0.1));
    let cancellation = CancellationToken::new();
    let retry_mode = options.retry_mode;
    let resource_hint = options.resource_hint;
    let max_retries = options.max_retries;

    let mut set = JoinSet::new();
    for chunk in chunks {
        let send = Arc::clone(&send);
        let semaphore = Arc::clone(&semaphore);
        let backoff = Arc::clone(&backoff);
        let cancellation = cancellation.clone();
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            if cancellation.is_cancelled() {
                return (Vec::new(), {
                    let mut error = CogniteError::new(ErrorType::Fatal, "call aborted after a sibling chunk failed fatally");
                    error.skipped = chunk;
                    vec![error]
                });
            }
            run_chunk_with_retries(chunk, max_retries, retry_mode, resource_hint, backoff.as_ref(), send.as_ref(), &cancellation)
                .await
        });
    }

    while let Some(joined) = set.join_next().await {
        if let Ok((results, errors)) = joined {
            result.results.extend(results);
            for error in errors {
                result.push_error(error);
            }
        }
    }

    result
}

fn sanitize_items<T: Sanitize>(items: Vec<T>, mode: SanitationMode, result: &mut CogniteResult<T, T>) -> Vec<T> {
    if matches!(mode, SanitationMode::None) {
        return items;
    }
    let mut kept = Vec::with_capacity(items.len());
    let mut failed = Vec::new();
    for mut item in items {
        if item.sanitize(&mode) {
            kept.push(item);
        } else {
            failed.push(item);
        }
    }
    if !failed.is_empty() {
        let mut error =
            CogniteError::new(ErrorType::SanitationFailed, "item violated a field limit and could not be repaired");
        error.skipped = failed;
        result.push_error(error);
    }
    kept
}

/// Runs one chunk's send/classify/clean loop, bounding offender-isolation
/// iterations at `ceil(log2(n)) + max_retries` (§4.5's termination
/// guarantee) and transient-fatal retries at `max_retries` with jittered
/// exponential backoff (§7).
async fn run_chunk_with_retries<T, F>(
    mut current: Vec<T>,
    max_retries: usize,
    retry_mode: RetryMode,
    resource_hint: Option<ResourceType>,
    backoff: &JitteredExponentialBackoff,
    send: &F,
    cancellation: &CancellationToken,
) -> (Vec<T>, Vec<CogniteError<T>>)
where
    T: OffenderMatch + Clone,
    F: Fn(Vec<T>) -> BoxFuture<'static, Result<Vec<T>, TransportError>>,
{
    let mut results = Vec::new();
    let mut errors = Vec::new();
    let mut clean_iterations = (current.len() as f64).log2().ceil() as usize + max_retries;
    let mut transient_attempts = 0usize;
    let cleaner = Cleaner::new(max_retries);

    loop {
        if current.is_empty() {
            break;
        }
        match send(current.clone()).await {
            Ok(created) => {
                results.extend(created);
                break;
            }
            Err(transport_err) => {
                let mut error: CogniteError<T> =
                    classify_response_with_hint(transport_err.status, &transport_err.body_text(), resource_hint);

                if error.is_fatal() {
                    cancellation.cancel();
                    error.skipped = current;
                    errors.push(error);
                    break;
                }

                if !retry_mode.should_retry(&error) {
                    error.skipped = current;
                    errors.push(error);
                    break;
                }

                if error.is_transient_fatal() {
                    if transient_attempts >= max_retries {
                        error.error_type = ErrorType::Fatal;
                        error.skipped = current;
                        cancellation.cancel();
                        errors.push(error);
                        break;
                    }
                    tokio::time::sleep(backoff.next_interval(transient_attempts)).await;
                    transient_attempts += 1;
                    continue;
                }

                if clean_iterations == 0 {
                    error.skipped = current;
                    errors.push(error);
                    break;
                }
                clean_iterations -= 1;

                let outcome = cleaner.clean(current, &error);
                if outcome.skipped.is_empty() {
                    // The error named no resolvable offender within this
                    // batch; stop rather than resend the identical chunk.
                    error.skipped = outcome.retry;
                    errors.push(error);
                    break;
                }
                error.skipped = outcome.skipped;
                errors.push(error);
                current = outcome.retry;
            }
        }
    }

    (results, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::FutureExt;
    use ingest_core::model::Asset;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[tokio::test]
    async fn retries_chunk_and_converges_after_offenders_are_dropped() {
        let calls: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let items = vec![
            Asset { external_id: Some("a".into()), ..Default::default() },
            Asset { external_id: Some("b".into()), parent_external_id: Some("missing".into()), ..Default::default() },
        ];

        let result = write_batch(items, &WriteOptions::default(), ResourceType::ExternalId, move |chunk| {
            let calls = Arc::clone(&calls_clone);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if chunk.iter().any(|a: &Asset| a.parent_external_id.is_some()) {
                    Err(TransportError::from_status(
                        400,
                        serde_json::json!({"error": {"message": "Reference to unknown parent with externalId missing"}}),
                    ))
                } else {
                    Ok(chunk)
                }
            }
            .boxed()
        })
        .await;

        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results[0].external_id.as_deref(), Some("a"));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].skipped.len(), 1);
        assert_eq!(result.errors[0].skipped[0].external_id.as_deref(), Some("b"));
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn retry_mode_none_never_retries() {
        let items = vec![Asset { external_id: Some("a".into()), ..Default::default() }];
        let options = WriteOptions::default().with_retry_mode(RetryMode::None);
        let result = write_batch(items, &options, ResourceType::ExternalId, |chunk| {
            async move {
                Err::<Vec<Asset>, _>(TransportError::from_status(
                    400,
                    serde_json::json!({"error": {"message": "Invalid dataSetIds: 1"}}),
                ))
            }
            .boxed()
        })
        .await;
        assert!(result.results.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].skipped.len(), 1);
    }

    #[tokio::test]
    async fn fatal_error_cancels_sibling_chunks() {
        let seen_second_chunk = Arc::new(Mutex::new(false));
        let seen_clone = Arc::clone(&seen_second_chunk);
        let items: Vec<Asset> = (0..4)
            .map(|i| Asset { external_id: Some(format!("id-{i}")), ..Default::default() })
            .collect();
        let options = WriteOptions { chunk_size: 2, parallelism: 1, ..WriteOptions::default() };

        let result = write_batch(items, &options, ResourceType::ExternalId, move |chunk| {
            let seen = Arc::clone(&seen_clone);
            async move {
                if chunk.iter().any(|a: &Asset| a.external_id.as_deref() == Some("id-0")) {
                    Err(TransportError::from_status(401, serde_json::json!({"error": {"message": "unauthorized"}})))
                } else {
                    *seen.lock().unwrap() = true;
                    Ok(chunk)
                }
            }
            .boxed()
        })
        .await;

        assert!(result.errors.iter().any(|e| e.is_fatal()));
        assert!(!*seen_second_chunk.lock().unwrap());
    }
}
