//! Generic in-memory upload queue: buffers items until a size or time
//! trigger fires, then hands the whole pending batch to a caller-supplied
//! uploader. Mirrors `tower-resilience-reconnect`'s `ReconnectState` shape —
//! plain state behind cheap `Arc`-cloned handles — but swaps the atomic
//! scalar counters for a mutex-guarded `Vec<T>`, since the state here is a
//! batch, not a counter.

use crate::buffer_file::BufferFile;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

/// Configuration for an [`UploadQueue`].
#[derive(Debug, Clone)]
pub struct UploadQueueConfig {
    pub max_queue_size: usize,
    pub max_upload_interval: Duration,
}

impl Default for UploadQueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            max_upload_interval: Duration::from_secs(10),
        }
    }
}

/// Outcome of one flush, handed to the caller's `on_result` callback
/// (§4.7's `callback(QueueUploadResult)`).
#[derive(Debug, Clone)]
pub struct QueueUploadResult<E> {
    /// Items actually accepted by the uploader this flush (0 on failure).
    pub uploaded: usize,
    /// Items re-read from `bufferPath` and retried alongside the pending
    /// batch this flush, whether or not the flush itself succeeded.
    pub replayed_from_buffer: usize,
    /// `Some` if the flush failed; the batch (pending items plus anything
    /// replayed from the buffer file) was appended back to `bufferPath`
    /// when one is configured.
    pub error: Option<E>,
}

impl<E> QueueUploadResult<E> {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Buffers items of type `T` until `max_queue_size` is reached or
/// `max_upload_interval` elapses, then flushes the whole pending batch.
pub struct UploadQueue<T> {
    pending: Mutex<Vec<T>>,
    trigger: Notify,
    config: UploadQueueConfig,
}

impl<T: Send + 'static> UploadQueue<T> {
    pub fn new(config: UploadQueueConfig) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(Vec::new()),
            trigger: Notify::new(),
            config,
        })
    }

    /// Appends `items` to the pending batch, waking the flush loop
    /// immediately if the batch has reached `max_queue_size`.
    pub async fn enqueue(&self, items: impl IntoIterator<Item = T>) {
        let mut pending = self.pending.lock().await;
        pending.extend(items);
        if pending.len() >= self.config.max_queue_size {
            self.trigger.notify_one();
        }
    }

    /// Forces an out-of-band flush on the next loop iteration.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Atomically takes every pending item, leaving the queue empty.
    pub async fn drain(&self) -> Vec<T> {
        let mut pending = self.pending.lock().await;
        std::mem::take(&mut *pending)
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Runs the flush loop until `cancellation` fires, then performs one
    /// final drain-and-upload before returning so no buffered item is lost
    /// on shutdown.
    ///
    /// `buffer` is the on-disk overflow used when `bufferPath` is
    /// configured (§4.7 "Buffer file semantics"): every flush first reads
    /// back and prepends whatever a previous failed flush wrote there, then
    /// attempts the combined batch. On failure the whole combined batch is
    /// re-appended to the buffer file (non-fatal — the items are not lost);
    /// on success the buffer file is left drained (truncated). `on_result`
    /// is invoked once per non-empty flush with the outcome.
    pub async fn start<F, Fut, E, C>(
        self: Arc<Self>,
        cancellation: CancellationToken,
        buffer: Option<Arc<BufferFile<T>>>,
        upload: F,
        on_result: C,
    ) where
        T: Clone,
        F: Fn(Vec<T>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        C: Fn(QueueUploadResult<E>),
    {
        let mut interval = tokio::time::interval(self.config.max_upload_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => break,
                _ = interval.tick() => {}
                _ = self.trigger.notified() => {}
            }

            if let Some(result) = self.flush_once(&buffer, &upload).await {
                on_result(result);
            }
        }

        if let Some(result) = self.flush_once(&buffer, &upload).await {
            on_result(result);
        }
    }

    /// Drains the pending batch, prepends any buffered items, uploads, and
    /// reconciles the buffer file with the outcome. Returns `None` if there
    /// was nothing to do (no pending items and an empty or absent buffer).
    async fn flush_once<F, Fut, E>(
        &self,
        buffer: &Option<Arc<BufferFile<T>>>,
        upload: &F,
    ) -> Option<QueueUploadResult<E>>
    where
        T: Clone,
        F: Fn(Vec<T>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let mut batch = self.drain().await;

        let mut replayed_from_buffer = 0;
        if let Some(buffer) = buffer {
            match buffer.drain().await {
                Ok(buffered) if !buffered.is_empty() => {
                    replayed_from_buffer = buffered.len();
                    let mut combined = buffered;
                    combined.extend(batch);
                    batch = combined;
                }
                Ok(_) => {}
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(target: "queue.flush", error = %_err, "failed to read buffer file, leaving it in place");
                }
            }
        }

        if batch.is_empty() {
            return None;
        }

        #[cfg(feature = "metrics")]
        metrics::histogram!("ingest_queue_flush_size").record(batch.len() as f64);
        #[cfg(feature = "tracing")]
        tracing::debug!(target: "queue.flush", count = batch.len(), replayed_from_buffer, "flushing pending batch");

        match upload(batch.clone()).await {
            Ok(()) => Some(QueueUploadResult { uploaded: batch.len(), replayed_from_buffer, error: None }),
            Err(err) => {
                if let Some(buffer) = buffer {
                    if let Err(_io_err) = buffer.append(&batch).await {
                        #[cfg(feature = "tracing")]
                        tracing::error!(target: "queue.flush", error = %_io_err, "failed to persist failed flush to buffer file");
                    }
                }
                Some(QueueUploadResult { uploaded: 0, replayed_from_buffer, error: Some(err) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{decode_json_frame, encode_json_frame};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ingest-queues-queue-test-{name}-{}", std::process::id()))
    }

    fn json_buffer_file<T>(path: impl Into<std::path::PathBuf>) -> BufferFile<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
    {
        BufferFile::new(
            path,
            |item: &T, out: &mut Vec<u8>| encode_json_frame(item, out).unwrap(),
            |buf, cursor| decode_json_frame(buf, cursor),
        )
    }

    #[tokio::test]
    async fn drain_empties_the_pending_batch() {
        let queue: Arc<UploadQueue<i32>> = UploadQueue::new(UploadQueueConfig::default());
        queue.enqueue(vec![1, 2, 3]).await;
        assert_eq!(queue.len().await, 3);
        let drained = queue.drain().await;
        assert_eq!(drained, vec![1, 2, 3]);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn enqueue_past_the_size_threshold_wakes_the_flush_loop() {
        let config = UploadQueueConfig {
            max_queue_size: 2,
            max_upload_interval: Duration::from_secs(3600),
        };
        let queue = UploadQueue::new(config);
        let flushed = Arc::new(AtomicUsize::new(0));
        let cancellation = CancellationToken::new();

        let loop_queue = Arc::clone(&queue);
        let loop_flushed = Arc::clone(&flushed);
        let loop_cancel = cancellation.clone();
        let handle = tokio::spawn(async move {
            loop_queue
                .start(
                    loop_cancel,
                    None,
                    |batch: Vec<i32>| {
                        let flushed = Arc::clone(&loop_flushed);
                        async move {
                            flushed.fetch_add(batch.len(), Ordering::SeqCst);
                            Ok::<(), std::io::Error>(())
                        }
                    },
                    |_result| {},
                )
                .await;
        });

        queue.enqueue(vec![1, 2]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancellation.cancel();
        handle.await.unwrap();

        assert_eq!(flushed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_flushes_remaining_items_exactly_once() {
        let config = UploadQueueConfig {
            max_queue_size: 1_000,
            max_upload_interval: Duration::from_secs(3600),
        };
        let queue = UploadQueue::new(config);
        queue.enqueue(vec![1, 2, 3]).await;

        let flushed_batches = Arc::new(Mutex::new(Vec::new()));
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let recorder = Arc::clone(&flushed_batches);
        queue
            .start(
                cancellation,
                None,
                |batch: Vec<i32>| {
                    let recorder = Arc::clone(&recorder);
                    async move {
                        recorder.lock().await.push(batch);
                        Ok::<(), std::io::Error>(())
                    }
                },
                |_result| {},
            )
            .await;

        let batches = flushed_batches.lock().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec![1, 2, 3]);
    }

    /// End-to-end scenario #5: a queue with a buffer file survives two
    /// consecutive flush failures (injected HTTP 500s) without losing any
    /// item, then writes everything and truncates the buffer once the
    /// endpoint recovers.
    #[tokio::test]
    async fn buffered_items_survive_repeated_flush_failures_then_flush_clean_on_recovery() {
        let path = temp_path("scenario5");
        let _ = tokio::fs::remove_file(&path).await;
        let buffer = Arc::new(json_buffer_file::<i32>(path.clone()));

        let queue: Arc<UploadQueue<i32>> = UploadQueue::new(UploadQueueConfig::default());
        queue.enqueue(0..10).await;

        let cloud: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
        let should_fail = Arc::new(std::sync::atomic::AtomicUsize::new(2));
        let results: Arc<Mutex<Vec<QueueUploadResult<String>>>> = Arc::new(Mutex::new(Vec::new()));

        let upload = {
            let cloud = Arc::clone(&cloud);
            let should_fail = Arc::clone(&should_fail);
            move |batch: Vec<i32>| {
                let cloud = Arc::clone(&cloud);
                let should_fail = Arc::clone(&should_fail);
                async move {
                    if should_fail.load(Ordering::SeqCst) > 0 {
                        should_fail.fetch_sub(1, Ordering::SeqCst);
                        return Err("HTTP 500".to_string());
                    }
                    cloud.lock().await.extend(batch);
                    Ok(())
                }
            }
        };

        let queue_ref = Arc::clone(&queue);
        let buffer_ref = Arc::clone(&buffer);
        let results_ref = Arc::clone(&results);

        // First flush: fails, batch of 10 goes to the buffer file.
        let r1 = queue_ref
            .flush_once(&Some(Arc::clone(&buffer_ref)), &upload)
            .await
            .unwrap();
        results_ref.lock().await.push(r1);
        assert!(!results.lock().await.last().unwrap().is_ok());
        let size_after_first_failure = tokio::fs::metadata(&path).await.unwrap().len();
        assert!(size_after_first_failure > 0);
        assert!(cloud.lock().await.is_empty());

        // Second flush: no new pending items, but the buffer is replayed
        // and the probe still reports failure, so it goes right back.
        let r2 = queue_ref
            .flush_once(&Some(Arc::clone(&buffer_ref)), &upload)
            .await
            .unwrap();
        assert!(!r2.is_ok());
        assert_eq!(r2.replayed_from_buffer, 10);
        let size_after_second_failure = tokio::fs::metadata(&path).await.unwrap().len();
        assert!(size_after_second_failure > 0);
        assert!(cloud.lock().await.is_empty());

        // Recovery: the third flush succeeds, writing all 10 and leaving
        // the buffer file truncated (removed).
        let r3 = queue_ref.flush_once(&Some(Arc::clone(&buffer_ref)), &upload).await.unwrap();
        assert!(r3.is_ok());
        assert_eq!(r3.uploaded, 10);
        assert_eq!(r3.replayed_from_buffer, 10);

        let mut cloud_items = cloud.lock().await.clone();
        cloud_items.sort();
        assert_eq!(cloud_items, (0..10).collect::<Vec<_>>());

        assert!(tokio::fs::metadata(&path).await.is_err(), "buffer file should be truncated/removed after success");
    }
}
