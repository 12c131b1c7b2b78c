//! Partition construction: turning record batches into stored partitions.
//!
//! `from_records` builds and persists a single partition from at most
//! `limit` live records. `partition_records` first chunks a larger batch
//! into approximately-equal groups (`partition_limited`) and builds one
//! partition per group, so callers never have to balance sizes themselves.

use record::{Change, Key, Record, BASE_FAMILY};
use std::collections::BTreeMap;
use store::{Link, NodeStore};
use tablet::Tablet;
use tracing::debug;

use crate::{codec, Partition, PartitionError, PartitionParams, Result, StoredPartition};

/// Builds, persists, and returns one partition from the given records.
///
/// Tombstones are stripped, keys sorted, and duplicates resolved last-write
/// wins before anything is persisted. Returns `Ok(None)` when no live
/// records remain. Fails with [`PartitionError::Overflow`] when more than
/// `params.limit` live records are supplied; chunk with
/// [`partition_records`] instead.
///
/// Records are split into per-family fragments, each family's tablet is
/// stored (non-base tablets pruned of empty fragments first), and the node
/// itself is stored last, so a node link never dangles.
pub fn from_records<S, I>(
    store: &S,
    params: &PartitionParams,
    records: I,
) -> Result<Option<StoredPartition>>
where
    S: NodeStore,
    I: IntoIterator<Item = (Key, Change)>,
{
    let live = collect_live(records);
    if live.is_empty() {
        return Ok(None);
    }
    let count = live.len();
    if count > params.limit {
        return Err(PartitionError::Overflow {
            count,
            limit: params.limit,
        });
    }

    let (first_key, last_key) = match (live.keys().next(), live.keys().next_back()) {
        (Some(first), Some(last)) => (first.clone(), last.clone()),
        _ => return Ok(None),
    };

    let mut tablets = BTreeMap::new();
    for (family, fragments) in params.families.split_data(live.iter()) {
        let built = Tablet::from_records(fragments);
        let built = if family == BASE_FAMILY {
            built
        } else {
            built.prune()
        };
        if built.is_empty() {
            continue;
        }
        tablets.insert(family.clone(), store_tablet(store, &family, &built)?);
    }

    let mut membership = bloom::MembershipFilter::new(params.limit, params.bloom_fpr);
    for key in live.keys() {
        membership.insert(key);
    }

    let node = Partition {
        limit: params.limit,
        tablets,
        membership,
        count,
        families: params.families.clone(),
        first_key,
        last_key,
    };

    let id = store.put_node(codec::encode_node(&node)?)?;
    debug!(count, partition = %id, "stored partition");
    Ok(Some(StoredPartition {
        link: Link::new("partition", id),
        node,
    }))
}

/// Builds as many partitions as the batch requires, split into
/// approximately-equal groups of at most `params.limit` records each.
pub fn partition_records<S, I>(
    store: &S,
    params: &PartitionParams,
    records: I,
) -> Result<Vec<StoredPartition>>
where
    S: NodeStore,
    I: IntoIterator<Item = (Key, Change)>,
{
    let live: Vec<(Key, Record)> = collect_live(records).into_iter().collect();
    let groups = partition_limited(params.limit, live);
    let mut parts = Vec::with_capacity(groups.len());
    for group in groups {
        let upserts = group.into_iter().map(|(key, rec)| (key, Some(rec)));
        if let Some(part) = from_records(store, params, upserts)? {
            parts.push(part);
        }
    }
    Ok(parts)
}

/// Splits `items` into the fewest groups such that no group exceeds
/// `limit`, with group sizes differing by at most one and order preserved.
///
/// With `n = ceil(count / limit)` groups, boundaries fall at
/// `floor(i * count / n)`.
#[must_use]
pub fn partition_limited<T>(limit: usize, items: Vec<T>) -> Vec<Vec<T>> {
    let count = items.len();
    if count == 0 {
        return Vec::new();
    }
    let n = (count + limit - 1) / limit;
    let mut groups = Vec::with_capacity(n);
    let mut iter = items.into_iter();
    let mut taken = 0;
    for i in 1..=n {
        let end = i * count / n;
        groups.push(iter.by_ref().take(end - taken).collect());
        taken = end;
    }
    groups
}

/// Strips tombstones and resolves duplicate keys, last write wins.
pub(crate) fn collect_live<I>(records: I) -> BTreeMap<Key, Record>
where
    I: IntoIterator<Item = (Key, Change)>,
{
    let mut live = BTreeMap::new();
    for (key, change) in records {
        match change {
            Some(rec) => {
                live.insert(key, rec);
            }
            None => {
                live.remove(&key);
            }
        }
    }
    live
}

/// Adapts a tablet of full records into a change sequence of upserts.
pub(crate) fn live_changes(tablet: Tablet) -> impl Iterator<Item = (Key, Change)> {
    tablet.into_entries().map(|(key, rec)| (key, Some(rec)))
}

/// Encodes and stores one family tablet, returning its named link.
pub(crate) fn store_tablet<S: NodeStore>(store: &S, family: &str, t: &Tablet) -> Result<Link> {
    let id = store.put_node(tablet::encode(t)?)?;
    Ok(Link::new(family, id))
}
