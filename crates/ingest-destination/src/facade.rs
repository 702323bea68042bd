//! The write façade (§4.6): a small set of high-level operations that run
//! every batch through sanitize → dedup → chunk → throttle → classify →
//! clean → retry (see [`crate::engine::write_batch`]), each returning a
//! [`CogniteResult`] so partial failures stay inspectable rather than
//! aborting the whole batch.

use crate::engine::{write_batch, WriteOptions, DEFAULT_DATA_POINTS_PER_REQUEST, DEFAULT_ITEM_CHUNK_SIZE};
use crate::transport::{
    AssetsApi, DataPointsApi, EventsApi, LoginApi, RawApi, RunStatus, RunsApi, TimeSeriesApi, TransportError,
};
use futures::future::FutureExt;
use ingest_chunking::chunk_by_count;
use ingest_classify::{classify_response, classify_response_with_hint, Cleaner};
use ingest_core::model::{Asset, DataPoint, Event, RawRow, TimeRange, TimeSeries};
use ingest_core::{CogniteError, CogniteResult, ErrorType, Identity, IngestError, ResourceType};
use ingest_sanitize::clean_request_by;
use ingest_throttle::{run_throttled, Thunk};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Façade over the cloud write API. Holds one trait object per resource
/// family so a caller can compose mocked and real transports freely.
pub struct Destination {
    assets: Arc<dyn AssetsApi>,
    time_series: Arc<dyn TimeSeriesApi>,
    events: Arc<dyn EventsApi>,
    data_points: Arc<dyn DataPointsApi>,
    raw: Arc<dyn RawApi>,
    runs: Arc<dyn RunsApi>,
    login: Arc<dyn LoginApi>,
}

impl Destination {
    pub fn new(
        assets: Arc<dyn AssetsApi>,
        time_series: Arc<dyn TimeSeriesApi>,
        events: Arc<dyn EventsApi>,
        data_points: Arc<dyn DataPointsApi>,
        raw: Arc<dyn RawApi>,
        runs: Arc<dyn RunsApi>,
        login: Arc<dyn LoginApi>,
    ) -> Self {
        Self { assets, time_series, events, data_points, raw, runs, login }
    }

    /// Creates assets, treating an `ItemExists` response as success: the
    /// caller only wants the assets to exist, not that this call is the one
    /// that created them. Pre-existing assets are retrieved by external id
    /// and merged into `results` alongside the newly created ones.
    pub async fn ensure_exists(&self, items: Vec<Asset>, options: &WriteOptions) -> CogniteResult<Asset, Asset> {
        let assets = Arc::clone(&self.assets);
        let mut result = write_batch(items, options, ResourceType::ExternalId, move |chunk| {
            let assets = Arc::clone(&assets);
            async move { assets.create(chunk).await }.boxed()
        })
        .await;

        // `ItemExists` entries hold the duplicated chunk in `skipped`; the
        // caller wanted those assets to exist, so retrieve and fold them
        // into `results` instead of leaving them as failures.
        let mut remaining_errors = Vec::with_capacity(result.errors.len());
        for error in result.errors {
            if error.error_type != ErrorType::ItemExists {
                remaining_errors.push(error);
                continue;
            }
            let ids: Vec<Identity> = error
                .skipped
                .iter()
                .filter_map(|a| a.external_id.clone().map(Identity::External))
                .collect();
            match self.assets.retrieve(ids, true).await {
                Ok(existing) => result.results.extend(existing),
                // Couldn't confirm existence; keep the error so the caller
                // knows these items were not folded into results.
                Err(_) => remaining_errors.push(error),
            }
        }
        result.errors = remaining_errors;
        result
    }

    /// Retrieves `items` by external id, creating only the ones missing.
    pub async fn get_or_create<F>(
        &self,
        external_ids: Vec<String>,
        create: F,
        options: &WriteOptions,
    ) -> CogniteResult<Asset, Asset>
    where
        F: FnOnce(&[String]) -> Vec<Asset>,
    {
        let ids: Vec<Identity> = external_ids.iter().cloned().map(Identity::External).collect();
        let existing = match self.assets.retrieve(ids, true).await {
            Ok(found) => found,
            Err(err) => {
                let mut result = CogniteResult::default();
                result.push_error(into_cogniteerror(err, Vec::new(), None));
                return result;
            }
        };

        let found_ids: std::collections::HashSet<&str> =
            existing.iter().filter_map(|a| a.external_id.as_deref()).collect();
        let missing: Vec<String> = external_ids
            .into_iter()
            .filter(|id| !found_ids.contains(id.as_str()))
            .collect();

        let mut result = CogniteResult::ok(existing);
        if !missing.is_empty() {
            let created = self.ensure_exists(create(&missing), options).await;
            result = result.merge(created);
        }
        result
    }

    pub async fn update_assets(&self, items: Vec<Asset>, options: &WriteOptions) -> CogniteResult<Asset, Asset> {
        let assets = Arc::clone(&self.assets);
        write_batch(items, options, ResourceType::ExternalId, move |chunk| {
            let assets = Arc::clone(&assets);
            async move { assets.update(chunk).await }.boxed()
        })
        .await
    }

    /// Time series declare two independent unique-key dimensions
    /// (`ExternalId`, `LegacyName`, §4.3); the legacy-name pass runs first
    /// as a pre-clean, since [`write_batch`] only dedups along one
    /// dimension per call.
    pub async fn update_time_series(
        &self,
        items: Vec<TimeSeries>,
        options: &WriteOptions,
    ) -> CogniteResult<TimeSeries, TimeSeries> {
        let (items, legacy_dup_error) = dedup_time_series_by_legacy_name(items);
        let time_series = Arc::clone(&self.time_series);
        let mut result = write_batch(items, options, ResourceType::ExternalId, move |chunk| {
            let time_series = Arc::clone(&time_series);
            async move { time_series.update(chunk).await }.boxed()
        })
        .await;
        if let Some(error) = legacy_dup_error {
            result.push_error(error);
        }
        result
    }

    pub async fn update_events(&self, items: Vec<Event>, options: &WriteOptions) -> CogniteResult<Event, Event> {
        let events = Arc::clone(&self.events);
        write_batch(items, options, ResourceType::ExternalId, move |chunk| {
            let events = Arc::clone(&events);
            async move { events.update(chunk).await }.boxed()
        })
        .await
    }

    /// Tries to create `items`; for ids the cloud reports as already
    /// existing, issues an `upsert` with `replace_metadata` instead of a
    /// plain update, since an existing series needs its fields merged
    /// rather than blindly overwritten. `replace_metadata = false` with an
    /// empty metadata map on an item leaves that time series' stored
    /// metadata untouched — see [`crate::transport::TimeSeriesApi::upsert`].
    pub async fn upsert_time_series(
        &self,
        items: Vec<TimeSeries>,
        replace_metadata: bool,
        options: &WriteOptions,
    ) -> CogniteResult<TimeSeries, TimeSeries> {
        let (items, legacy_dup_error) = dedup_time_series_by_legacy_name(items);
        let time_series = Arc::clone(&self.time_series);
        let mut result = write_batch(items, options, ResourceType::ExternalId, move |chunk| {
            let time_series = Arc::clone(&time_series);
            async move { time_series.create(chunk).await }.boxed()
        })
        .await;
        if let Some(error) = legacy_dup_error {
            result.push_error(error);
        }

        let mut remaining_errors = Vec::with_capacity(result.errors.len());
        for error in result.errors {
            if error.error_type != ErrorType::ItemExists {
                remaining_errors.push(error);
                continue;
            }
            let tagged: Vec<(TimeSeries, bool)> =
                error.skipped.into_iter().map(|item| (item, replace_metadata)).collect();
            match self.time_series.upsert(tagged).await {
                Ok(updated) => result.results.extend(updated),
                Err(err) => remaining_errors.push(into_cogniteerror(err, Vec::new(), Some(ResourceType::ExternalId))),
            }
        }
        result.errors = remaining_errors;
        result
    }

    /// Inserts one series' data points, chunking by the endpoint's
    /// per-request point cap (§6's `N_dp_points`) and, on a
    /// `MismatchedType` rejection, bisecting the failing chunk to isolate
    /// exactly the points whose value type doesn't match the series
    /// (§4.4's "per-item assignment may require a probe").
    pub async fn insert_data_points(
        &self,
        identity: Identity,
        points: Vec<DataPoint>,
        chunk_size: usize,
    ) -> Result<(), CogniteError<DataPoint>> {
        let chunk_size = chunk_size.max(1).min(DEFAULT_DATA_POINTS_PER_REQUEST);
        let mut skipped = Vec::new();
        for chunk in ingest_chunking::chunk_by_count(points, chunk_size) {
            if let Err(error) = self.insert_data_point_chunk(identity.clone(), chunk).await {
                skipped.extend(error.skipped);
                if error.is_fatal() {
                    let mut fatal = error;
                    fatal.skipped = skipped;
                    return Err(fatal);
                }
            }
        }
        if skipped.is_empty() {
            Ok(())
        } else {
            let mut error = CogniteError::new(ErrorType::MismatchedType, "some data points were rejected");
            error.skipped = skipped;
            Err(error)
        }
    }

    async fn insert_data_point_chunk(
        &self,
        identity: Identity,
        points: Vec<DataPoint>,
    ) -> Result<(), CogniteError<DataPoint>> {
        match self.data_points.insert(identity.clone(), points.clone()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let error: CogniteError<DataPoint> =
                    classify_response_with_hint(err.status, &err.body_text(), Some(ResourceType::DataPointValue));
                if error.error_type != ErrorType::MismatchedType || points.len() <= 1 {
                    return Err(into_cogniteerror(err, points, None));
                }
                // Probe sub-batches to find exactly which points mismatch;
                // the probe re-sends candidate point sets, so a successful
                // probe is itself a successful partial insert.
                let cleaner = Cleaner::new(4);
                let identity = identity.clone();
                let data_points = Arc::clone(&self.data_points);
                let (_, offenders) = cleaner
                    .isolate_offenders(points, move |candidate| {
                        let identity = identity.clone();
                        let data_points = Arc::clone(&data_points);
                        async move { data_points.insert(identity, candidate).await.is_err() }
                    })
                    .await
                    .map_err(|ingest_err| data_point_ingest_error(ingest_err))?;
                if offenders.is_empty() {
                    Ok(())
                } else {
                    let mut error = CogniteError::new(ErrorType::MismatchedType, "mismatched data point value type")
                        .with_resource(ResourceType::DataPointValue)
                        .with_status(err.status);
                    error.skipped = offenders;
                    Err(error)
                }
            }
        }
    }

    /// Like [`Self::insert_data_points`], but on an `ItemMissing` time
    /// series error, creates the series (via `create_missing`) and retries
    /// the insert once.
    pub async fn insert_data_points_create_missing<F>(
        &self,
        identity: Identity,
        points: Vec<DataPoint>,
        create_missing: F,
    ) -> Result<(), CogniteError<DataPoint>>
    where
        F: FnOnce() -> TimeSeries,
    {
        match self.data_points.insert(identity.clone(), points.clone()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let error: CogniteError<DataPoint> = classify_response(err.status, &err.body_text());
                if error.error_type != ErrorType::ItemMissing {
                    return Err(into_cogniteerror(err, points, None));
                }
                if self.time_series.create(vec![create_missing()]).await.is_err() {
                    return Err(error.with_status(err.status));
                }
                self.data_points
                    .insert(identity, points.clone())
                    .await
                    .map_err(|err| into_cogniteerror(err, points, None))
            }
        }
    }

    /// For each id, composes `listLatest` (the end of the range) with a
    /// bounded backward `listRange` query from `TS_MIN` up to that latest
    /// timestamp (its first result is the series' earliest point), per
    /// §4.6. A series with no data points maps to [`TimeRange::Empty`].
    pub async fn get_extracted_ranges(
        &self,
        ids: Vec<Identity>,
    ) -> Result<Vec<(Identity, TimeRange)>, TransportError> {
        let queries = ids.into_iter().map(|id| {
            let data_points = Arc::clone(&self.data_points);
            async move {
                let latest = data_points.list_latest(id.clone(), None).await?;
                let range = match latest {
                    None => TimeRange::Empty,
                    Some(last) => {
                        let earliest = data_points
                            .list_range(id.clone(), ingest_core::time::TS_MIN, last.timestamp, 1)
                            .await?;
                        let start = earliest.first().map(|p| p.timestamp).unwrap_or(last.timestamp);
                        TimeRange::bounded(start, last.timestamp)
                    }
                };
                Ok::<_, TransportError>((id, range))
            }
        });
        futures::future::try_join_all(queries).await
    }

    /// Deletes are subject to the same per-endpoint item-count limits as
    /// creates, so the id list is chunked and the chunks throttled the same
    /// way (§4.6's delete passthroughs still go through chunking/throttling).
    pub async fn delete_assets(&self, ids: Vec<Identity>, ignore_unknown: bool) -> Result<(), TransportError> {
        let assets = Arc::clone(&self.assets);
        delete_chunked(ids, DEFAULT_ITEM_CHUNK_SIZE, 4, move |chunk| {
            let assets = Arc::clone(&assets);
            async move { assets.delete(chunk, ignore_unknown).await }.boxed()
        })
        .await
    }

    pub async fn delete_time_series(&self, ids: Vec<Identity>, ignore_unknown: bool) -> Result<(), TransportError> {
        let time_series = Arc::clone(&self.time_series);
        delete_chunked(ids, DEFAULT_ITEM_CHUNK_SIZE, 4, move |chunk| {
            let time_series = Arc::clone(&time_series);
            async move { time_series.delete(chunk, ignore_unknown).await }.boxed()
        })
        .await
    }

    pub async fn delete_events(&self, ids: Vec<Identity>, ignore_unknown: bool) -> Result<(), TransportError> {
        let events = Arc::clone(&self.events);
        delete_chunked(ids, DEFAULT_ITEM_CHUNK_SIZE, 4, move |chunk| {
            let events = Arc::clone(&events);
            async move { events.delete(chunk, ignore_unknown).await }.boxed()
        })
        .await
    }

    pub async fn delete_data_points(&self, identity: Identity, ranges: Vec<TimeRange>) -> Result<(), TransportError> {
        self.data_points.delete(identity, ranges).await
    }

    pub async fn delete_raw_rows(&self, database: String, table: String, keys: Vec<String>) -> Result<(), TransportError> {
        self.raw.delete_rows(database, table, keys).await
    }

    pub async fn insert_raw_rows(
        &self,
        database: String,
        table: String,
        rows: Vec<RawRow<serde_json::Value>>,
    ) -> Result<(), TransportError> {
        self.raw.insert_rows(database, table, rows).await
    }

    pub async fn create_extraction_pipeline_run(
        &self,
        pipeline_external_id: String,
        status: RunStatus,
        message: Option<String>,
    ) -> Result<(), IngestError> {
        self.runs
            .create_run(pipeline_external_id, status, message)
            .await
            .map_err(|err| IngestError::Config(err.to_string()))
    }

    pub async fn validate_login(&self) -> Result<crate::transport::LoginStatus, IngestError> {
        self.login.validate_login().await.map_err(|err| IngestError::Config(err.to_string()))
    }

    pub async fn retrieve_extraction_pipeline(
        &self,
        pipeline_external_id: String,
    ) -> Result<ingest_core::model::ExtractionPipeline, IngestError> {
        self.runs
            .retrieve(pipeline_external_id)
            .await
            .map_err(|err| IngestError::Config(err.to_string()))
    }
}

fn data_point_ingest_error(err: IngestError) -> CogniteError<DataPoint> {
    CogniteError::new(ErrorType::Fatal, err.to_string())
}

async fn delete_chunked<F>(
    ids: Vec<Identity>,
    chunk_size: usize,
    parallelism: usize,
    delete: F,
) -> Result<(), TransportError>
where
    F: Fn(Vec<Identity>) -> crate::transport::TransportResult<()> + Send + Sync + 'static,
{
    let delete = Arc::new(delete);
    let thunks: Vec<Thunk<(), TransportError>> = chunk_by_count(ids, chunk_size.max(1))
        .into_iter()
        .map(|chunk| {
            let delete = Arc::clone(&delete);
            Box::new(move || delete(chunk)) as Thunk<(), TransportError>
        })
        .collect();
    run_throttled(thunks, parallelism.max(1), CancellationToken::new()).await.map(|_| ())
}

fn dedup_time_series_by_legacy_name(items: Vec<TimeSeries>) -> (Vec<TimeSeries>, Option<CogniteError<TimeSeries>>) {
    clean_request_by(items, ResourceType::LegacyName, |ts: &TimeSeries| ts.legacy_name.clone())
}

fn into_cogniteerror<T>(err: TransportError, skipped: Vec<T>, resource_hint: Option<ResourceType>) -> CogniteError<T> {
    let mut error: CogniteError<T> = classify_response_with_hint(err.status, &err.body_text(), resource_hint);
    error.skipped = skipped;
    error
}
