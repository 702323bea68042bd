//! Domain entities written through the write engine (§3). Field-level
//! invariants are enforced by the sanitizer, not by these constructors —
//! these are plain data carriers so façade, queue, and sanitizer code can
//! share one definition.

use crate::error::{ErrorKey, ResourceType};
use crate::identity::Identity;
use std::collections::{BTreeMap, HashSet};

/// A label reference (e.g. `"critical"`), used on assets and events.
pub type Label = String;

/// Minimal UTC instant representation used across the write engine:
/// milliseconds since the Unix epoch. Kept as a bare `i64` (rather than a
/// datetime library type) so every crate in the workspace can depend on it
/// without picking a datetime crate on the caller's behalf.
pub type Millis = i64;

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Asset {
    pub external_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub labels: Vec<Label>,
    pub parent_id: Option<i64>,
    pub parent_external_id: Option<String>,
    pub data_set_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeSeries {
    pub external_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub legacy_name: Option<String>,
    pub is_string: bool,
    pub asset_id: Option<i64>,
    pub data_set_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub external_id: Option<String>,
    pub event_type: Option<String>,
    pub subtype: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub asset_ids: Vec<i64>,
    pub labels: Vec<Label>,
    pub data_set_id: Option<i64>,
    pub start_time: Option<Millis>,
    pub end_time: Option<Millis>,
}

/// The value carried by one data point: numeric series carry `Numeric`,
/// string series carry `String`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataPointValue {
    Numeric(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataPoint {
    pub timestamp: Millis,
    pub value: DataPointValue,
}

/// A single raw key-value row in a raw table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(bound(serialize = "T: serde::Serialize", deserialize = "T: serde::de::DeserializeOwned"))
)]
pub struct RawRow<T> {
    pub key: String,
    pub columns: T,
}

/// State of an extraction pipeline as reported by `retrieve(pipelineId)`
/// (§6): the last run an extractor reported, used by `Runner` to log
/// staleness rather than to drive any retry decision.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtractionPipeline {
    pub external_id: String,
    pub last_run_status: Option<String>,
    pub last_run_message: Option<String>,
    pub last_seen: Option<Millis>,
}

/// A half-open `[start, end)` time range; `Empty` represents "no data".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Empty,
    Bounded { start: Millis, end: Millis },
}

impl TimeRange {
    pub fn bounded(start: Millis, end: Millis) -> Self {
        if start > end {
            TimeRange::Empty
        } else {
            TimeRange::Bounded { start, end }
        }
    }
}

/// Declares how to read an item's declared unique-key set, used by
/// request-level deduplication (§4.3's `clean_request`).
pub trait UniqueKey {
    /// The composite key type, must implement `Eq + Hash`.
    type Key: Eq + std::hash::Hash + Clone;

    /// Returns the item's unique key, or `None` if it declares no unique
    /// key for this context (such items are never considered duplicates).
    fn unique_key(&self) -> Option<Self::Key>;
}

impl UniqueKey for Asset {
    type Key = Identity;

    fn unique_key(&self) -> Option<Identity> {
        self.external_id.clone().map(Identity::External)
    }
}

impl UniqueKey for Event {
    type Key = Identity;

    fn unique_key(&self) -> Option<Identity> {
        self.external_id.clone().map(Identity::External)
    }
}

/// Time series declare two independent unique-key dimensions
/// (`ExternalId` and `LegacyName`); `clean_request` runs deduplication
/// once per dimension, so this impl is deliberately not used directly —
/// see `ingest-sanitize::clean_request_time_series`.
impl UniqueKey for TimeSeries {
    type Key = Identity;

    fn unique_key(&self) -> Option<Identity> {
        self.external_id.clone().map(Identity::External)
    }
}

/// Declares which `values` (§7's `CogniteError::values`) an item matches
/// along a given [`ResourceType`] dimension, used by the cleaner (§4.5) to
/// partition a rejected batch into offenders and survivors without
/// resending candidate sub-batches for every resource kind that names its
/// offenders directly (`ExternalId`, `ParentId`, `DataSetId`, ...).
/// Dimensions with no natural per-item key (`DataPointValue`,
/// `TimeRange`, ...) are handled by bisection instead — see
/// `ingest-classify::cleaner::Cleaner::isolate_offenders`.
pub trait OffenderMatch {
    /// Returns `true` if `self` should be treated as an offender given a
    /// failure reported against `resource` naming `values`.
    fn matches_resource(&self, resource: ResourceType, values: &HashSet<ErrorKey>) -> bool;
}

impl OffenderMatch for Asset {
    fn matches_resource(&self, resource: ResourceType, values: &HashSet<ErrorKey>) -> bool {
        match resource {
            ResourceType::ExternalId => self
                .external_id
                .as_ref()
                .is_some_and(|id| values.contains(&ErrorKey::Identity(Identity::External(id.clone())))),
            ResourceType::ParentExternalId => self
                .parent_external_id
                .as_ref()
                .is_some_and(|id| values.contains(&ErrorKey::Text(id.clone()))),
            ResourceType::ParentId => self
                .parent_id
                .is_some_and(|id| values.contains(&ErrorKey::Identity(Identity::Internal(id)))),
            ResourceType::DataSetId => self
                .data_set_id
                .is_some_and(|id| values.contains(&ErrorKey::Identity(Identity::Internal(id)))),
            ResourceType::Labels => self
                .labels
                .iter()
                .any(|label| values.contains(&ErrorKey::Text(label.clone()))),
            _ => false,
        }
    }
}

impl OffenderMatch for TimeSeries {
    fn matches_resource(&self, resource: ResourceType, values: &HashSet<ErrorKey>) -> bool {
        match resource {
            ResourceType::ExternalId => self
                .external_id
                .as_ref()
                .is_some_and(|id| values.contains(&ErrorKey::Identity(Identity::External(id.clone())))),
            ResourceType::LegacyName => self
                .legacy_name
                .as_ref()
                .is_some_and(|name| values.contains(&ErrorKey::Text(name.clone()))),
            ResourceType::AssetId => self
                .asset_id
                .is_some_and(|id| values.contains(&ErrorKey::Identity(Identity::Internal(id)))),
            ResourceType::DataSetId => self
                .data_set_id
                .is_some_and(|id| values.contains(&ErrorKey::Identity(Identity::Internal(id)))),
            _ => false,
        }
    }
}

impl OffenderMatch for Event {
    fn matches_resource(&self, resource: ResourceType, values: &HashSet<ErrorKey>) -> bool {
        match resource {
            ResourceType::ExternalId => self
                .external_id
                .as_ref()
                .is_some_and(|id| values.contains(&ErrorKey::Identity(Identity::External(id.clone())))),
            ResourceType::AssetId => self
                .asset_ids
                .iter()
                .any(|id| values.contains(&ErrorKey::Identity(Identity::Internal(*id)))),
            ResourceType::DataSetId => self
                .data_set_id
                .is_some_and(|id| values.contains(&ErrorKey::Identity(Identity::Internal(id)))),
            ResourceType::Labels => self
                .labels
                .iter()
                .any(|label| values.contains(&ErrorKey::Text(label.clone()))),
            _ => false,
        }
    }
}
