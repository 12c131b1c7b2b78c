use record::{Families, Key, Record};
use store::MemoryStore;
use tablet::Tablet;

use crate::{from_records, PartitionParams, Patch, StoredPartition};

/// `k0001`-style keys that sort numerically.
pub fn key(i: usize) -> Key {
    format!("k{i:04}").into_bytes()
}

pub fn rec(fields: &[(&str, &[u8])]) -> Record {
    fields
        .iter()
        .map(|(f, v)| (f.to_string(), v.to_vec()))
        .collect()
}

/// A one-field record whose value encodes its index.
pub fn numbered(i: usize) -> Record {
    rec(&[("a", i.to_string().as_bytes())])
}

/// Upsert changes for keys `lo..=hi`.
pub fn upserts(lo: usize, hi: usize) -> Patch {
    (lo..=hi).map(|i| (key(i), Some(numbered(i)))).collect()
}

/// Tombstone changes for keys `lo..=hi`.
pub fn deletes(lo: usize, hi: usize) -> Patch {
    (lo..=hi).map(|i| (key(i), None)).collect()
}

/// A virtual tablet of full records for keys `lo..=hi`.
pub fn virtual_tablet(lo: usize, hi: usize) -> Tablet {
    Tablet::from_records((lo..=hi).map(|i| (key(i), numbered(i))))
}

pub fn families(layout: &[(&str, &[&str])]) -> Families {
    Families::new(layout.iter().map(|(name, fields)| {
        (
            name.to_string(),
            fields.iter().map(|f| f.to_string()).collect::<Vec<_>>(),
        )
    }))
}

/// Builds and stores one partition holding keys `lo..=hi`.
pub fn build(store: &MemoryStore, params: &PartitionParams, lo: usize, hi: usize) -> StoredPartition {
    from_records(store, params, upserts(lo, hi))
        .expect("build partition")
        .expect("non-empty partition")
}

/// All keys of a stored partition, in order.
pub fn part_keys(store: &MemoryStore, part: &StoredPartition) -> Vec<Key> {
    crate::read_all(store, &part.node, &[])
        .expect("read partition")
        .map(|(k, _)| k)
        .collect()
}

/// Union of all records across an ordered partition run.
pub fn all_records(store: &MemoryStore, parts: &[StoredPartition]) -> Vec<(Key, Record)> {
    let mut out = Vec::new();
    for part in parts {
        out.extend(crate::read_all(store, &part.node, &[]).expect("read partition"));
    }
    out
}

/// Asserts the structural invariants of an update result: global key
/// order, strict boundaries between partitions, and size bounds for every
/// partition when the tree total warrants them.
pub fn assert_valid_run(store: &MemoryStore, params: &PartitionParams, parts: &[StoredPartition]) {
    let total: usize = parts.iter().map(|p| p.node.count()).sum();
    for (i, part) in parts.iter().enumerate() {
        assert!(
            part.node.count() <= params.limit,
            "partition {i} over limit: {}",
            part.node.count()
        );
        if total >= params.limit {
            assert!(
                part.node.count() >= params.half_full(),
                "partition {i} under half-full: {}",
                part.node.count()
            );
        }
        if i + 1 < parts.len() {
            assert!(
                part.node.last_key() < parts[i + 1].node.first_key(),
                "partition {i} overlaps its successor"
            );
        }
        let keys = part_keys(store, part);
        assert_eq!(keys.len(), part.node.count(), "partition {i} count mismatch");
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted, "partition {i} keys out of order");
    }
}
