//! The authenticated-HTTP-client boundary. Every endpoint family is its
//! own trait so a caller can swap in a mock for one resource kind without
//! faking the whole API, the same granularity the teacher's
//! `FailureClassifier`/`IntervalFunction` boundaries use for their own
//! swappable behavior.

use futures::future::BoxFuture;
use ingest_core::model::{Asset, DataPoint, Event, ExtractionPipeline, RawRow, TimeRange, TimeSeries};
use ingest_core::Identity;
use std::fmt;

/// A failed call across the transport boundary: either an HTTP response
/// with a non-2xx `status`, or a connection-level failure (`status == 0`).
#[derive(Debug)]
pub struct TransportError {
    pub status: u16,
    pub body: Option<serde_json::Value>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn from_status(status: u16, body: serde_json::Value) -> Self {
        Self { status, body: Some(body), source: None }
    }

    pub fn connection(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self { status: 0, body: None, source: Some(Box::new(source)) }
    }

    /// The response body as text, used by the classifier; connection-level
    /// failures with no body fall back to the source's `Display`.
    pub fn body_text(&self) -> String {
        match &self.body {
            Some(body) => body.to_string(),
            None => self
                .source
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error (status {}): {}", self.status, self.body_text())
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

pub type TransportResult<T> = BoxFuture<'static, Result<T, TransportError>>;

pub trait AssetsApi: Send + Sync {
    fn create(&self, items: Vec<Asset>) -> TransportResult<Vec<Asset>>;
    fn retrieve(&self, ids: Vec<Identity>, ignore_unknown: bool) -> TransportResult<Vec<Asset>>;
    fn update(&self, items: Vec<Asset>) -> TransportResult<Vec<Asset>>;
    fn delete(&self, ids: Vec<Identity>, ignore_unknown: bool) -> TransportResult<()>;
}

pub trait TimeSeriesApi: Send + Sync {
    fn create(&self, items: Vec<TimeSeries>) -> TransportResult<Vec<TimeSeries>>;
    fn retrieve(&self, ids: Vec<Identity>, ignore_unknown: bool) -> TransportResult<Vec<TimeSeries>>;
    fn update(&self, items: Vec<TimeSeries>) -> TransportResult<Vec<TimeSeries>>;
    /// `replace_metadata` on each item governs whether its (possibly empty)
    /// metadata map replaces the stored map outright or is merged into it;
    /// an empty map merged in is a no-op, which is what makes
    /// `replace_metadata = false` with no metadata supplied leave the
    /// stored map untouched.
    fn upsert(&self, items: Vec<(TimeSeries, bool)>) -> TransportResult<Vec<TimeSeries>>;
    fn delete(&self, ids: Vec<Identity>, ignore_unknown: bool) -> TransportResult<()>;
}

pub trait EventsApi: Send + Sync {
    fn create(&self, items: Vec<Event>) -> TransportResult<Vec<Event>>;
    fn update(&self, items: Vec<Event>) -> TransportResult<Vec<Event>>;
    fn delete(&self, ids: Vec<Identity>, ignore_unknown: bool) -> TransportResult<()>;
}

pub trait DataPointsApi: Send + Sync {
    fn insert(&self, identity: Identity, points: Vec<DataPoint>) -> TransportResult<()>;
    fn delete(&self, identity: Identity, ranges: Vec<TimeRange>) -> TransportResult<()>;
    /// The most recent data point at or before `before`, or the series'
    /// overall latest if `before` is `None`. `Ok(None)` if the series has
    /// no data points (§6's `listLatest`).
    fn list_latest(&self, identity: Identity, before: Option<i64>) -> TransportResult<Option<DataPoint>>;
    /// Up to `limit` data points with `start <= timestamp <= end`, ordered
    /// ascending by timestamp (§6's `listRange`).
    fn list_range(&self, identity: Identity, start: i64, end: i64, limit: usize) -> TransportResult<Vec<DataPoint>>;
}

pub trait RawApi: Send + Sync {
    fn insert_rows(&self, database: String, table: String, rows: Vec<RawRow<serde_json::Value>>) -> TransportResult<()>;
    fn delete_rows(&self, database: String, table: String, keys: Vec<String>) -> TransportResult<()>;
}

/// Outcome of one extraction pipeline run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failure,
    Seen,
}

pub trait RunsApi: Send + Sync {
    fn create_run(&self, pipeline_external_id: String, status: RunStatus, message: Option<String>) -> TransportResult<()>;
    fn retrieve(&self, pipeline_external_id: String) -> TransportResult<ExtractionPipeline>;
}

/// Outcome of a login/credentials check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStatus {
    pub user: String,
    pub logged_in: bool,
    pub project: String,
}

pub trait LoginApi: Send + Sync {
    fn validate_login(&self) -> TransportResult<LoginStatus>;
}
