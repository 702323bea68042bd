//! [`Sanitize`] implementations for the concrete write-request item types.

use crate::error::Violation;
use crate::limits::{ASSET_LIMITS, DATA_POINT_LIMITS, EVENT_LIMITS, RAW_LIMITS, TIME_SERIES_LIMITS};
use crate::mode::SanitationMode;
use crate::sanitize::{clean_metadata, verify_metadata, Sanitize};
use crate::util::truncate_utf8_bytes;
use ingest_core::model::{Asset, DataPoint, DataPointValue, Event, RawRow, TimeSeries};
use ingest_core::time::is_valid_timestamp;
use ingest_core::ResourceType;

impl Sanitize for Asset {
    fn sanitize(&mut self, mode: &SanitationMode) -> bool {
        match mode {
            SanitationMode::None => true,
            SanitationMode::Remove => self.verify().is_none(),
            SanitationMode::Clean { .. } => {
                if let Some(v) = &mut self.external_id {
                    truncate_utf8_bytes(v, ASSET_LIMITS.external_id_bytes);
                }
                if let Some(v) = &mut self.name {
                    truncate_utf8_bytes(v, ASSET_LIMITS.name_bytes);
                }
                if let Some(v) = &mut self.description {
                    truncate_utf8_bytes(v, ASSET_LIMITS.description_bytes);
                }
                if let Some(v) = &mut self.source {
                    truncate_utf8_bytes(v, ASSET_LIMITS.source_bytes);
                }
                clean_metadata(&mut self.metadata, &ASSET_LIMITS.metadata);
                self.labels.truncate(ASSET_LIMITS.max_labels);
                for label in &mut self.labels {
                    truncate_utf8_bytes(label, ASSET_LIMITS.label_bytes);
                }
                true
            }
        }
    }

    fn verify(&self) -> Option<Violation> {
        if let Some(v) = &self.external_id {
            if v.len() > ASSET_LIMITS.external_id_bytes {
                return Some(Violation::new(ResourceType::ExternalId, "external_id exceeds byte limit"));
            }
        }
        if let Some(v) = &self.name {
            if v.len() > ASSET_LIMITS.name_bytes {
                return Some(Violation::new(ResourceType::Name, "name exceeds byte limit"));
            }
        }
        if let Some(v) = &self.description {
            if v.len() > ASSET_LIMITS.description_bytes {
                return Some(Violation::new(ResourceType::Description, "description exceeds byte limit"));
            }
        }
        if let Some(v) = &self.source {
            if v.len() > ASSET_LIMITS.source_bytes {
                return Some(Violation::new(ResourceType::Source, "source exceeds byte limit"));
            }
        }
        if !verify_metadata(&self.metadata, &ASSET_LIMITS.metadata) {
            return Some(Violation::new(ResourceType::Metadata, "metadata exceeds declared limits"));
        }
        if self.labels.len() > ASSET_LIMITS.max_labels
            || self.labels.iter().any(|l| l.len() > ASSET_LIMITS.label_bytes)
        {
            return Some(Violation::new(ResourceType::Labels, "labels exceed declared limits"));
        }
        if matches!(self.parent_id, Some(id) if id <= 0) {
            return Some(Violation::new(ResourceType::ParentId, "parent_id must be positive"));
        }
        if matches!(self.data_set_id, Some(id) if id <= 0) {
            return Some(Violation::new(ResourceType::DataSetId, "data_set_id must be positive"));
        }
        None
    }
}

impl Sanitize for TimeSeries {
    fn sanitize(&mut self, mode: &SanitationMode) -> bool {
        match mode {
            SanitationMode::None => true,
            SanitationMode::Remove => self.verify().is_none(),
            SanitationMode::Clean { .. } => {
                if let Some(v) = &mut self.external_id {
                    truncate_utf8_bytes(v, TIME_SERIES_LIMITS.external_id_bytes);
                }
                if let Some(v) = &mut self.name {
                    truncate_utf8_bytes(v, TIME_SERIES_LIMITS.name_bytes);
                }
                if let Some(v) = &mut self.description {
                    truncate_utf8_bytes(v, TIME_SERIES_LIMITS.description_bytes);
                }
                if let Some(v) = &mut self.unit {
                    truncate_utf8_bytes(v, TIME_SERIES_LIMITS.unit_bytes);
                }
                if let Some(v) = &mut self.legacy_name {
                    truncate_utf8_bytes(v, TIME_SERIES_LIMITS.legacy_name_bytes);
                }
                clean_metadata(&mut self.metadata, &TIME_SERIES_LIMITS.metadata);
                true
            }
        }
    }

    fn verify(&self) -> Option<Violation> {
        if let Some(v) = &self.external_id {
            if v.len() > TIME_SERIES_LIMITS.external_id_bytes {
                return Some(Violation::new(ResourceType::ExternalId, "external_id exceeds byte limit"));
            }
        }
        if let Some(v) = &self.name {
            if v.len() > TIME_SERIES_LIMITS.name_bytes {
                return Some(Violation::new(ResourceType::Name, "name exceeds byte limit"));
            }
        }
        if let Some(v) = &self.description {
            if v.len() > TIME_SERIES_LIMITS.description_bytes {
                return Some(Violation::new(ResourceType::Description, "description exceeds byte limit"));
            }
        }
        if let Some(v) = &self.unit {
            if v.len() > TIME_SERIES_LIMITS.unit_bytes {
                return Some(Violation::new(ResourceType::Unit, "unit exceeds byte limit"));
            }
        }
        if let Some(v) = &self.legacy_name {
            if v.len() > TIME_SERIES_LIMITS.legacy_name_bytes {
                return Some(Violation::new(ResourceType::LegacyName, "legacy_name exceeds byte limit"));
            }
        }
        if !verify_metadata(&self.metadata, &TIME_SERIES_LIMITS.metadata) {
            return Some(Violation::new(ResourceType::Metadata, "metadata exceeds declared limits"));
        }
        if matches!(self.asset_id, Some(id) if id <= 0) {
            return Some(Violation::new(ResourceType::AssetId, "asset_id must be positive"));
        }
        if matches!(self.data_set_id, Some(id) if id <= 0) {
            return Some(Violation::new(ResourceType::DataSetId, "data_set_id must be positive"));
        }
        None
    }
}

impl Sanitize for Event {
    fn sanitize(&mut self, mode: &SanitationMode) -> bool {
        match mode {
            SanitationMode::None => true,
            SanitationMode::Remove => self.verify().is_none(),
            SanitationMode::Clean { .. } => {
                if let Some(v) = &mut self.external_id {
                    truncate_utf8_bytes(v, EVENT_LIMITS.external_id_bytes);
                }
                if let Some(v) = &mut self.event_type {
                    truncate_utf8_bytes(v, EVENT_LIMITS.type_bytes);
                }
                if let Some(v) = &mut self.subtype {
                    truncate_utf8_bytes(v, EVENT_LIMITS.subtype_bytes);
                }
                if let Some(v) = &mut self.description {
                    truncate_utf8_bytes(v, EVENT_LIMITS.description_bytes);
                }
                if let Some(v) = &mut self.source {
                    truncate_utf8_bytes(v, EVENT_LIMITS.source_bytes);
                }
                self.asset_ids.truncate(EVENT_LIMITS.max_asset_ids);
                self.asset_ids.retain(|id| *id > 0);
                if self.metadata.len() > EVENT_LIMITS.metadata_max_keys {
                    let excess: Vec<String> = self
                        .metadata
                        .keys()
                        .skip(EVENT_LIMITS.metadata_max_keys)
                        .cloned()
                        .collect();
                    for key in excess {
                        self.metadata.remove(&key);
                    }
                }
                true
            }
        }
    }

    fn verify(&self) -> Option<Violation> {
        if let Some(v) = &self.external_id {
            if v.len() > EVENT_LIMITS.external_id_bytes {
                return Some(Violation::new(ResourceType::ExternalId, "external_id exceeds byte limit"));
            }
        }
        if let Some(v) = &self.event_type {
            if v.len() > EVENT_LIMITS.type_bytes {
                return Some(Violation::new(ResourceType::Type, "type exceeds byte limit"));
            }
        }
        if let Some(v) = &self.subtype {
            if v.len() > EVENT_LIMITS.subtype_bytes {
                return Some(Violation::new(ResourceType::SubType, "subtype exceeds byte limit"));
            }
        }
        if let Some(v) = &self.description {
            if v.len() > EVENT_LIMITS.description_bytes {
                return Some(Violation::new(ResourceType::Description, "description exceeds byte limit"));
            }
        }
        if let Some(v) = &self.source {
            if v.len() > EVENT_LIMITS.source_bytes {
                return Some(Violation::new(ResourceType::Source, "source exceeds byte limit"));
            }
        }
        if self.asset_ids.len() > EVENT_LIMITS.max_asset_ids || self.asset_ids.iter().any(|id| *id <= 0) {
            return Some(Violation::new(ResourceType::AssetId, "asset_ids exceed count limit or contain non-positive ids"));
        }
        if self.metadata.len() > EVENT_LIMITS.metadata_max_keys {
            return Some(Violation::new(ResourceType::Metadata, "metadata exceeds declared key limit"));
        }
        if matches!(self.data_set_id, Some(id) if id <= 0) {
            return Some(Violation::new(ResourceType::DataSetId, "data_set_id must be positive"));
        }
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start > end {
                return Some(Violation::new(ResourceType::TimeRange, "start_time is after end_time"));
            }
        }
        None
    }
}

impl Sanitize for DataPoint {
    fn sanitize(&mut self, mode: &SanitationMode) -> bool {
        match mode {
            SanitationMode::None => true,
            SanitationMode::Remove => self.verify().is_none(),
            SanitationMode::Clean { non_finite_replacement } => {
                if !is_valid_timestamp(self.timestamp) {
                    return false;
                }
                match &mut self.value {
                    DataPointValue::Numeric(n) => {
                        if !n.is_finite() || n.abs() > DATA_POINT_LIMITS.numeric_value_abs_max {
                            match non_finite_replacement {
                                Some(replacement) => *n = *replacement,
                                None => return false,
                            }
                        }
                    }
                    DataPointValue::String(s) => {
                        truncate_utf8_bytes(s, DATA_POINT_LIMITS.string_value_bytes);
                    }
                }
                true
            }
        }
    }

    fn verify(&self) -> Option<Violation> {
        if !is_valid_timestamp(self.timestamp) {
            return Some(Violation::new(ResourceType::DataPointTimestamp, "timestamp outside the valid range"));
        }
        match &self.value {
            DataPointValue::Numeric(n) => {
                if !n.is_finite() || n.abs() > DATA_POINT_LIMITS.numeric_value_abs_max {
                    return Some(Violation::new(
                        ResourceType::DataPointValue,
                        "numeric value is non-finite or exceeds the magnitude bound",
                    ));
                }
            }
            DataPointValue::String(s) => {
                if s.len() > DATA_POINT_LIMITS.string_value_bytes {
                    return Some(Violation::new(ResourceType::DataPointValue, "string value exceeds byte limit"));
                }
            }
        }
        None
    }
}

impl<T> Sanitize for RawRow<T> {
    fn sanitize(&mut self, mode: &SanitationMode) -> bool {
        match mode {
            SanitationMode::None => true,
            SanitationMode::Remove => self.verify().is_none(),
            SanitationMode::Clean { .. } => {
                truncate_utf8_bytes(&mut self.key, RAW_LIMITS.key_bytes);
                true
            }
        }
    }

    fn verify(&self) -> Option<Violation> {
        if self.key.len() > RAW_LIMITS.key_bytes {
            return Some(Violation::new(ResourceType::ExternalId, "row key exceeds byte limit"));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_mode_truncates_asset_fields_to_their_limits() {
        let mut asset = Asset {
            name: Some("x".repeat(200)),
            ..Default::default()
        };
        let kept = asset.sanitize(&SanitationMode::Clean { non_finite_replacement: None });
        assert!(kept);
        assert!(asset.name.unwrap().len() <= ASSET_LIMITS.name_bytes);
    }

    #[test]
    fn remove_mode_drops_assets_that_violate_limits() {
        let mut asset = Asset {
            name: Some("x".repeat(200)),
            ..Default::default()
        };
        assert!(!asset.sanitize(&SanitationMode::Remove));
    }

    #[test]
    fn none_mode_leaves_asset_untouched() {
        let mut asset = Asset {
            name: Some("x".repeat(200)),
            ..Default::default()
        };
        assert!(asset.sanitize(&SanitationMode::None));
        assert_eq!(asset.name.unwrap().len(), 200);
    }

    #[test]
    fn clean_mode_replaces_non_finite_data_point_when_configured() {
        let mut point = DataPoint {
            timestamp: 0,
            value: DataPointValue::Numeric(f64::NAN),
        };
        let kept = point.sanitize(&SanitationMode::Clean { non_finite_replacement: Some(0.0) });
        assert!(kept);
        assert_eq!(point.value, DataPointValue::Numeric(0.0));
    }

    #[test]
    fn clean_mode_drops_non_finite_data_point_without_a_configured_replacement() {
        let mut point = DataPoint {
            timestamp: 0,
            value: DataPointValue::Numeric(f64::INFINITY),
        };
        assert!(!point.sanitize(&SanitationMode::Clean { non_finite_replacement: None }));
    }

    #[test]
    fn remove_mode_drops_non_finite_data_point_even_with_a_replacement_elsewhere_configured() {
        // Remove carries no replacement field at all: there is no way to
        // configure one, by construction.
        let mut point = DataPoint {
            timestamp: 0,
            value: DataPointValue::Numeric(f64::NAN),
        };
        assert!(!point.sanitize(&SanitationMode::Remove));
    }

    #[test]
    fn valid_data_point_survives_every_mode() {
        for mode in [
            SanitationMode::None,
            SanitationMode::Clean { non_finite_replacement: Some(0.0) },
            SanitationMode::Remove,
        ] {
            let mut point = DataPoint {
                timestamp: 1_000,
                value: DataPointValue::Numeric(42.0),
            };
            assert!(point.sanitize(&mode));
        }
    }
}
