//! The [`Sanitize`] trait: one repair/validate pair per write-request item
//! type, generalized from the teacher's `FailureClassifier` shape — there
//! the trait told a circuit breaker whether a result counts as a failure;
//! here it tells the pipeline whether an item may pass through unmodified,
//! repaired, or not at all.

use crate::error::Violation;
use crate::limits::MetadataLimits;
use crate::mode::SanitationMode;
use std::collections::BTreeMap;

/// Repairs or validates one write-request item against its declared field
/// limits (§6).
pub trait Sanitize {
    /// Applies `mode` to `self`. Returns `true` if the item should remain in
    /// the batch, `false` if it must be dropped.
    fn sanitize(&mut self, mode: &SanitationMode) -> bool;

    /// Reports the first field violating a declared limit, without mutating
    /// `self`. Returns `None` if every field is within its limit.
    fn verify(&self) -> Option<Violation>;
}

pub(crate) fn clean_metadata(metadata: &mut BTreeMap<String, String>, limits: &MetadataLimits) {
    let mut cleaned = BTreeMap::new();
    for (mut key, mut value) in std::mem::take(metadata) {
        crate::util::truncate_utf8_bytes(&mut key, limits.max_key_bytes);
        crate::util::truncate_utf8_bytes(&mut value, limits.max_value_bytes);
        cleaned.insert(key, value);
    }
    while cleaned.len() > limits.max_keys {
        if let Some(last) = cleaned.keys().next_back().cloned() {
            cleaned.remove(&last);
        } else {
            break;
        }
    }
    if let Some(max_total) = limits.max_total_bytes {
        while metadata_bytes(&cleaned) > max_total && !cleaned.is_empty() {
            if let Some(last) = cleaned.keys().next_back().cloned() {
                cleaned.remove(&last);
            } else {
                break;
            }
        }
    }
    *metadata = cleaned;
}

pub(crate) fn metadata_bytes(metadata: &BTreeMap<String, String>) -> usize {
    metadata.iter().map(|(k, v)| k.len() + v.len()).sum()
}

pub(crate) fn verify_metadata(metadata: &BTreeMap<String, String>, limits: &MetadataLimits) -> bool {
    if metadata.len() > limits.max_keys {
        return false;
    }
    if metadata
        .iter()
        .any(|(k, v)| k.len() > limits.max_key_bytes || v.len() > limits.max_value_bytes)
    {
        return false;
    }
    if let Some(max_total) = limits.max_total_bytes {
        if metadata_bytes(metadata) > max_total {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> MetadataLimits {
        MetadataLimits {
            max_keys: 2,
            max_key_bytes: 4,
            max_value_bytes: 4,
            max_total_bytes: Some(10),
        }
    }

    #[test]
    fn clean_metadata_trims_keys_over_budget() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), "1".to_string());
        map.insert("b".to_string(), "2".to_string());
        map.insert("c".to_string(), "3".to_string());
        clean_metadata(&mut map, &limits());
        assert!(map.len() <= 2);
    }

    #[test]
    fn clean_metadata_truncates_oversized_values() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), "toolongvalue".to_string());
        clean_metadata(&mut map, &limits());
        assert!(map.get("a").unwrap().len() <= 4);
    }

    #[test]
    fn verify_metadata_rejects_too_many_keys() {
        let mut map = BTreeMap::new();
        for i in 0..3 {
            map.insert(format!("k{i}"), "v".to_string());
        }
        assert!(!verify_metadata(&map, &limits()));
    }
}
