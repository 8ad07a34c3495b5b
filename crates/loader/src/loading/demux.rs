//! Result demultiplexing
//!
//! Rows come back in whatever order the store likes. They are matched to the
//! requested keys by value, never by position.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::key::{Key, KeyShape};
use crate::record::Record;

/// Rows matched to requested keys, plus what did not fit
pub(crate) struct Demuxed<V> {
    pub resolved: HashMap<Key, V>,
    /// Rows whose key matched no requested key
    pub unmatched: usize,
    /// Extra rows for a key that should be unique
    pub duplicates: usize,
}

/// Match rows to keys of a unique key. The first row for a key wins.
pub(crate) fn by_unique_key(
    shape: &KeyShape,
    requested: &[Key],
    records: &[Arc<Record>],
) -> Demuxed<Arc<Record>> {
    let wanted: HashSet<&Key> = requested.iter().collect();
    let mut resolved = HashMap::with_capacity(requested.len());
    let mut unmatched = 0;
    let mut duplicates = 0;

    for record in records {
        let key = record.key_for(shape);
        if !wanted.contains(&key) {
            unmatched += 1;
        } else if resolved.contains_key(&key) {
            duplicates += 1;
        } else {
            resolved.insert(key, record.clone());
        }
    }

    Demuxed {
        resolved,
        unmatched,
        duplicates,
    }
}

/// Group rows by their relation-side key, keeping the order rows were
/// returned in. Owners with no rows are absent from the map.
pub(crate) fn by_group_key(
    shape: &KeyShape,
    requested: &[Key],
    records: &[Arc<Record>],
) -> Demuxed<Vec<Arc<Record>>> {
    let wanted: HashSet<&Key> = requested.iter().collect();
    let mut resolved: HashMap<Key, Vec<Arc<Record>>> = HashMap::with_capacity(requested.len());
    let mut unmatched = 0;

    for record in records {
        let key = record.key_for(shape);
        if wanted.contains(&key) {
            resolved.entry(key).or_default().push(record.clone());
        } else {
            unmatched += 1;
        }
    }

    Demuxed {
        resolved,
        unmatched,
        duplicates: 0,
    }
}
