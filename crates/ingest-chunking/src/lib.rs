//! Splits a logical write request into endpoint-compliant sub-requests.
//!
//! Cloud endpoints cap both item count and aggregate payload size; naive
//! per-key chunking of a `map<K, seq<V>>` request (e.g. data points keyed
//! by time series) would violate the total-item cap whenever many small
//! keys combine. [`chunk_map_by_count_and_keys`] performs two-dimensional
//! bin packing to avoid that.

use std::mem;

/// Splits `items` into contiguous chunks of at most `max_items` each. The
/// last chunk may be smaller. Order is preserved.
pub fn chunk_by_count<T>(items: Vec<T>, max_items: usize) -> Vec<Vec<T>> {
    assert!(max_items > 0, "max_items must be positive");
    if items.is_empty() {
        return Vec::new();
    }
    items
        .into_iter()
        .fold(Vec::new(), |mut chunks: Vec<Vec<T>>, item| {
            match chunks.last_mut() {
                Some(last) if last.len() < max_items => last.push(item),
                _ => chunks.push(vec![item]),
            }
            chunks
        })
}

/// Splits a sequence of `(key, values)` pairs into chunks such that each
/// chunk has at most `max_keys_per_chunk` keys and at most
/// `max_values_per_chunk` total values, a single key's values may be split
/// across chunks (appearing as separate entries with disjoint, order-
/// preserving sub-sequences), and every key's complete value list is
/// covered exactly once across the returned chunks.
///
/// `items` is a `Vec` rather than a `HashMap` so callers control key
/// iteration order; this function does not reorder keys relative to the
/// input, though the order of the returned chunks themselves is
/// unspecified by contract (callers should not depend on it).
pub fn chunk_map_by_count_and_keys<K, V>(
    items: Vec<(K, Vec<V>)>,
    max_values_per_chunk: usize,
    max_keys_per_chunk: usize,
) -> Vec<Vec<(K, Vec<V>)>>
where
    K: Clone,
    V: Clone,
{
    assert!(max_values_per_chunk > 0, "max_values_per_chunk must be positive");
    assert!(max_keys_per_chunk > 0, "max_keys_per_chunk must be positive");

    let mut chunks: Vec<Vec<(K, Vec<V>)>> = Vec::new();
    let mut current: Vec<(K, Vec<V>)> = Vec::new();
    let mut current_values = 0usize;

    for (key, values) in items {
        if values.is_empty() {
            if current.len() >= max_keys_per_chunk {
                chunks.push(mem::take(&mut current));
                current_values = 0;
            }
            current.push((key, Vec::new()));
            continue;
        }

        let mut idx = 0usize;
        while idx < values.len() {
            if current.len() >= max_keys_per_chunk {
                chunks.push(mem::take(&mut current));
                current_values = 0;
            }
            let remaining_capacity = max_values_per_chunk - current_values;
            if remaining_capacity == 0 {
                chunks.push(mem::take(&mut current));
                current_values = 0;
                continue;
            }
            let take = remaining_capacity.min(values.len() - idx);
            current.push((key.clone(), values[idx..idx + take].to_vec()));
            current_values += take;
            idx += take;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
