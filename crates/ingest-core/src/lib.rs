//! Core types shared across the ingestion write engine: [`Identity`], the
//! [`CogniteError`]/[`CogniteResult`] error/result taxonomy, the
//! [`IngestEvent`] observability plumbing, and small ambient helpers
//! (env-var expansion, timestamp bounds) used by the sibling crates.

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod model;
pub mod time;

pub use error::{CogniteError, CogniteResult, ErrorKey, ErrorType, IngestError, ResourceType};
pub use identity::{Identity, IdentityError};
pub use model::{
    Asset, DataPoint, DataPointValue, Event, ExtractionPipeline, Label, Millis, OffenderMatch, RawRow, TimeRange,
    TimeSeries, UniqueKey,
};
