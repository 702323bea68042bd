//! Error and result taxonomy for the write engine.
//!
//! This mirrors the shape of a unified resilience error: a small closed set
//! of variants produced by the classifier (§4.4), mutated by the cleaner
//! (§4.5), and merged monoidally into a [`CogniteResult`] across chunks.

use crate::identity::Identity;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// The kind of failure a [`CogniteError`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Referenced item(s) do not exist on the cloud.
    ItemMissing,
    /// Item(s) already exist (duplicate key on create).
    ItemExists,
    /// Item(s) duplicated within the same request batch.
    ItemDuplicated,
    /// Item(s) failed sanitation and could not be repaired.
    SanitationFailed,
    /// A value's type did not match the declared/expected type.
    MismatchedType,
    /// A transient server/network fault; the whole chunk is retryable.
    TransientFatal,
    /// Non-retryable failure (auth, bad config, retry budget exhausted).
    Fatal,
}

/// The dimension along which offending items are identified, used by the
/// [`Cleaner`](crate) to partition a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Id,
    ExternalId,
    ParentId,
    ParentExternalId,
    DataSetId,
    AssetId,
    Labels,
    LegacyName,
    Name,
    Description,
    Metadata,
    Source,
    Type,
    SubType,
    Unit,
    TimeRange,
    DataPointValue,
    DataPointTimestamp,
    Update,
}

/// A key used in `values`/offender sets: either an [`Identity`] or a free
/// string (legacy name, label, raw key) depending on `resource`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKey {
    Identity(Identity),
    Text(String),
}

impl fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKey::Identity(id) => write!(f, "{id}"),
            ErrorKey::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<Identity> for ErrorKey {
    fn from(id: Identity) -> Self {
        ErrorKey::Identity(id)
    }
}

impl From<String> for ErrorKey {
    fn from(s: String) -> Self {
        ErrorKey::Text(s)
    }
}

/// An error produced while writing a batch of `T` to the cloud.
///
/// `values` names the offenders (possibly incomplete, see `complete`);
/// `skipped` accumulates the actual input items the cleaner dropped because
/// of this error, and is never reset once populated — it only grows.
#[derive(Debug, Clone)]
pub struct CogniteError<T> {
    pub error_type: ErrorType,
    pub resource: Option<ResourceType>,
    /// HTTP status code, or 0 if the failure did not originate from an HTTP
    /// response (e.g. a connection-level exception).
    pub status: u16,
    pub message: String,
    /// Opaque underlying cause, for diagnostics (not retryable dispatch).
    pub exception: Option<Arc<dyn std::error::Error + Send + Sync>>,
    pub values: HashSet<ErrorKey>,
    /// Whether `values` is known to be the exhaustive offender set.
    pub complete: bool,
    pub skipped: Vec<T>,
}

impl<T> CogniteError<T> {
    /// Constructs a bare error with no offenders or skipped items yet.
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error_type,
            resource: None,
            status: 0,
            message: message.into(),
            exception: None,
            values: HashSet::new(),
            complete: true,
            skipped: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_resource(mut self, resource: ResourceType) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_values(mut self, values: HashSet<ErrorKey>) -> Self {
        self.values = values;
        self
    }

    pub fn with_complete(mut self, complete: bool) -> Self {
        self.complete = complete;
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.error_type == ErrorType::Fatal
    }

    pub fn is_transient_fatal(&self) -> bool {
        self.error_type == ErrorType::TransientFatal
    }

    /// Merges `other` into `self` when they share `(error_type, resource)`,
    /// per §7's coalescing policy. Returns `other` back if the keys differ
    /// (caller should keep it as a separate entry).
    pub fn merge(&mut self, other: CogniteError<T>) -> Option<CogniteError<T>> {
        if self.error_type == other.error_type && self.resource == other.resource {
            self.values.extend(other.values);
            self.skipped.extend(other.skipped);
            self.complete = self.complete && other.complete;
            None
        } else {
            Some(other)
        }
    }

    /// Re-tags the skipped/error payload type, used when a façade operation
    /// needs to surface an error about a differently-typed input (e.g. a
    /// per-series data point payload rather than the raw request item).
    pub fn map_skipped<U>(self, f: impl Fn(T) -> U) -> CogniteError<U> {
        CogniteError {
            error_type: self.error_type,
            resource: self.resource,
            status: self.status,
            message: self.message,
            exception: self.exception,
            values: self.values,
            complete: self.complete,
            skipped: self.skipped.into_iter().map(f).collect(),
        }
    }
}

impl<T> fmt::Display for CogniteError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}{}: {} (status {})",
            self.error_type,
            self.resource
                .map(|r| format!("/{r:?}"))
                .unwrap_or_default(),
            self.message,
            self.status
        )
    }
}

impl<T: fmt::Debug> std::error::Error for CogniteError<T> {}

/// The accumulated outcome of a (possibly chunked) write call.
#[derive(Debug, Clone)]
pub struct CogniteResult<TIn, TOut> {
    pub results: Vec<TOut>,
    pub errors: Vec<CogniteError<TIn>>,
}

impl<TIn, TOut> Default for CogniteResult<TIn, TOut> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<TIn, TOut> CogniteResult<TIn, TOut> {
    pub fn new(results: Vec<TOut>, errors: Vec<CogniteError<TIn>>) -> Self {
        Self { results, errors }
    }

    pub fn ok(results: Vec<TOut>) -> Self {
        Self {
            results,
            errors: Vec::new(),
        }
    }

    pub fn is_all_good(&self) -> bool {
        self.errors.is_empty()
    }

    /// Coalesces `error` into an existing entry sharing `(type, resource)`,
    /// or appends it as a new entry.
    pub fn push_error(&mut self, mut error: CogniteError<TIn>) {
        for existing in &mut self.errors {
            match existing.merge(error) {
                None => return,
                Some(back) => error = back,
            }
        }
        self.errors.push(error);
    }

    /// Monoidal merge of two partial results across chunks.
    pub fn merge(mut self, other: CogniteResult<TIn, TOut>) -> Self {
        self.results.extend(other.results);
        for error in other.errors {
            self.push_error(error);
        }
        self
    }

    /// Returns the first `Fatal` error, if any, consuming nothing.
    pub fn fatal_error(&self) -> Option<&CogniteError<TIn>> {
        self.errors.iter().find(|e| e.is_fatal())
    }

    /// Raises the first `Fatal` error as a `Result::Err`, leaving non-fatal
    /// errors in place for the caller to inspect via `self.errors`.
    pub fn throw_on_fatal(self) -> Result<Self, CogniteError<TIn>> {
        if let Some(idx) = self.errors.iter().position(|e| e.is_fatal()) {
            let mut errors = self.errors;
            let fatal = errors.remove(idx);
            Err(fatal)
        } else {
            Ok(self)
        }
    }
}

/// Crate-wide error for boundary failures that are not part of the
/// `CogniteResult` retry machinery (I/O, malformed input, misuse).
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("buffer file I/O error: {0}")]
    BufferIo(#[source] std::io::Error),

    #[error("malformed buffer frame: {0}")]
    MalformedFrame(String),

    #[error("row store error: {0}")]
    RowStore(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("cleaner exceeded its iteration bound ({0} iterations)")]
    CleanerIterationBoundExceeded(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_coalesces_matching_errors() {
        let mut a: CogniteError<u32> = CogniteError::new(ErrorType::ItemMissing, "missing")
            .with_resource(ResourceType::ParentId);
        a.values.insert(ErrorKey::Text("p1".into()));
        a.skipped.push(1);

        let mut b: CogniteError<u32> = CogniteError::new(ErrorType::ItemMissing, "missing")
            .with_resource(ResourceType::ParentId);
        b.values.insert(ErrorKey::Text("p2".into()));
        b.skipped.push(2);

        assert!(a.merge(b).is_none());
        assert_eq!(a.values.len(), 2);
        assert_eq!(a.skipped, vec![1, 2]);
    }

    #[test]
    fn merge_keeps_distinct_errors_separate() {
        let mut a: CogniteError<u32> = CogniteError::new(ErrorType::ItemMissing, "m")
            .with_resource(ResourceType::ParentId);
        let b: CogniteError<u32> =
            CogniteError::new(ErrorType::ItemExists, "e").with_resource(ResourceType::ExternalId);
        let leftover = a.merge(b);
        assert!(leftover.is_some());
    }

    #[test]
    fn result_conservation() {
        let mut result: CogniteResult<u32, u32> = CogniteResult::ok(vec![1, 2]);
        let mut err: CogniteError<u32> =
            CogniteError::new(ErrorType::ItemExists, "dup").with_resource(ResourceType::ExternalId);
        err.skipped.push(3);
        result.push_error(err);

        let mut combined: Vec<u32> = result.results.clone();
        combined.extend(result.errors.iter().flat_map(|e| e.skipped.clone()));
        combined.sort();
        assert_eq!(combined, vec![1, 2, 3]);
    }

    #[test]
    fn throw_on_fatal_extracts_fatal_error() {
        let mut result: CogniteResult<u32, u32> = CogniteResult::ok(vec![1]);
        result.push_error(CogniteError::new(ErrorType::Fatal, "boom"));
        assert!(result.throw_on_fatal().is_err());

        let clean: CogniteResult<u32, u32> = CogniteResult::ok(vec![1]);
        assert!(clean.throw_on_fatal().is_ok());
    }
}
