//! Per-entity field limits (§6). Every bound is a byte count, not a
//! character count, since the cloud API counts UTF-8 bytes.

/// Metadata-map limits shared by the entities that carry a metadata map.
#[derive(Debug, Clone, Copy)]
pub struct MetadataLimits {
    pub max_keys: usize,
    pub max_key_bytes: usize,
    pub max_value_bytes: usize,
    pub max_total_bytes: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct AssetLimits {
    pub external_id_bytes: usize,
    pub name_bytes: usize,
    pub description_bytes: usize,
    pub source_bytes: usize,
    pub metadata: MetadataLimits,
    pub max_labels: usize,
    pub label_bytes: usize,
}

pub const ASSET_LIMITS: AssetLimits = AssetLimits {
    external_id_bytes: 255,
    name_bytes: 140,
    description_bytes: 500,
    source_bytes: 128,
    metadata: MetadataLimits {
        max_keys: 19,
        max_key_bytes: 128,
        max_value_bytes: 10_240,
        max_total_bytes: Some(10_240),
    },
    max_labels: 10,
    label_bytes: 255,
};

#[derive(Debug, Clone, Copy)]
pub struct TimeSeriesLimits {
    pub external_id_bytes: usize,
    pub name_bytes: usize,
    pub description_bytes: usize,
    pub unit_bytes: usize,
    pub metadata: MetadataLimits,
    pub legacy_name_bytes: usize,
}

pub const TIME_SERIES_LIMITS: TimeSeriesLimits = TimeSeriesLimits {
    external_id_bytes: 255,
    name_bytes: 255,
    description_bytes: 1_000,
    unit_bytes: 32,
    metadata: MetadataLimits {
        max_keys: 18,
        max_key_bytes: 32,
        max_value_bytes: 256,
        max_total_bytes: None,
    },
    legacy_name_bytes: 255,
};

#[derive(Debug, Clone, Copy)]
pub struct EventLimits {
    pub external_id_bytes: usize,
    pub type_bytes: usize,
    pub subtype_bytes: usize,
    pub description_bytes: usize,
    pub source_bytes: usize,
    pub max_asset_ids: usize,
    pub metadata_max_keys: usize,
}

pub const EVENT_LIMITS: EventLimits = EventLimits {
    external_id_bytes: 255,
    type_bytes: 64,
    subtype_bytes: 64,
    description_bytes: 500,
    source_bytes: 128,
    max_asset_ids: 10_000,
    metadata_max_keys: 150,
};

#[derive(Debug, Clone, Copy)]
pub struct DataPointLimits {
    pub string_value_bytes: usize,
    pub numeric_value_abs_max: f64,
}

pub const DATA_POINT_LIMITS: DataPointLimits = DataPointLimits {
    string_value_bytes: 255,
    numeric_value_abs_max: 1e100,
};

#[derive(Debug, Clone, Copy)]
pub struct RawLimits {
    pub key_bytes: usize,
}

pub const RAW_LIMITS: RawLimits = RawLimits { key_bytes: 1_024 };
