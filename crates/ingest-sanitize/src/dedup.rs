//! Request-level deduplication by declared unique key (§4.3). Items are
//! kept on first occurrence; later occurrences of the same key are
//! collected into a single `ItemDuplicated` error rather than silently
//! dropped.

use ingest_core::model::UniqueKey;
use ingest_core::{CogniteError, ErrorKey, ErrorType, ResourceType};
use std::collections::HashSet;
use std::hash::Hash;

/// Deduplicates `items` by a caller-supplied key function, reporting
/// duplicates against `resource`.
pub fn clean_request_by<T, K, F>(
    items: Vec<T>,
    resource: ResourceType,
    key_fn: F,
) -> (Vec<T>, Option<CogniteError<T>>)
where
    K: Eq + Hash + Clone + Into<ErrorKey>,
    F: Fn(&T) -> Option<K>,
{
    let mut seen: HashSet<K> = HashSet::new();
    let mut kept = Vec::with_capacity(items.len());
    let mut error: Option<CogniteError<T>> = None;

    for item in items {
        match key_fn(&item) {
            None => kept.push(item),
            Some(key) => {
                if seen.insert(key.clone()) {
                    kept.push(item);
                } else {
                    let err = error.get_or_insert_with(|| {
                        CogniteError::new(ErrorType::ItemDuplicated, "duplicate unique key within request")
                            .with_resource(resource)
                    });
                    err.values.insert(key.into());
                    err.skipped.push(item);
                }
            }
        }
    }

    (kept, error)
}

/// Deduplicates `items` by their declared [`UniqueKey`].
pub fn clean_request<T>(items: Vec<T>, resource: ResourceType) -> (Vec<T>, Option<CogniteError<T>>)
where
    T: UniqueKey,
    T::Key: Into<ErrorKey>,
{
    clean_request_by(items, resource, |item| item.unique_key())
}
