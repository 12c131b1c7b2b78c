//! Read path: projected record reads across a partition's family tablets.
//!
//! A read selects the families whose tablets can supply the requested
//! fields, loads those tablets, and merges their per-key fragments back
//! into records with a k-way streaming merge: a binary heap holds the head
//! entry of each tablet sequence, the minimum key is popped, fragments for
//! that key are unioned across sources, and exactly those sources advance.
//!
//! With a field projection, each merged record is narrowed to the requested
//! fields and records whose projection comes up empty are dropped.

use record::{Fragment, Key, BASE_FAMILY};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, BTreeSet};
use store::{Link, NodeStore};
use tablet::Tablet;

use crate::{codec, Partition, Result};

/// Picks the families whose tablets must be read to answer a query for
/// `fields`. An empty `fields` means every stored tablet.
///
/// Named families are chosen when their claimed field set intersects the
/// request; if any requested field is left uncovered, the `base` tablet is
/// added, since it holds every unclaimed field.
#[must_use]
pub fn choose_tablets(node: &Partition, fields: &[&str]) -> Vec<String> {
    if fields.is_empty() {
        return node.tablets.keys().cloned().collect();
    }

    let wanted: BTreeSet<&str> = fields.iter().copied().collect();
    let mut chosen: BTreeSet<String> = BTreeSet::new();
    let mut covered: BTreeSet<&str> = BTreeSet::new();
    for (family, claimed) in node.families.iter() {
        let hits: Vec<&str> = claimed
            .iter()
            .map(String::as_str)
            .filter(|field| wanted.contains(field))
            .collect();
        if !hits.is_empty() {
            chosen.insert(family.clone());
            covered.extend(hits);
        }
    }
    if wanted.iter().any(|field| !covered.contains(field)) {
        chosen.insert(BASE_FAMILY.to_string());
    }

    // A family may have no stored tablet when all its fragments pruned empty.
    chosen.retain(|family| node.tablets.contains_key(family));
    chosen.into_iter().collect()
}

/// Reads every record of the partition, projected to `fields` (empty =
/// all fields).
pub fn read_all<S: NodeStore>(store: &S, node: &Partition, fields: &[&str]) -> Result<RecordStream> {
    read_with(store, node, fields, |t| {
        t.read_all().map(clone_entry).collect()
    })
}

/// Reads records in `[lo, hi]` (inclusive; `None` = open bound).
pub fn read_range<S: NodeStore>(
    store: &S,
    node: &Partition,
    fields: &[&str],
    lo: Option<&[u8]>,
    hi: Option<&[u8]>,
) -> Result<RecordStream> {
    read_with(store, node, fields, |t| {
        t.read_range(lo, hi).map(clone_entry).collect()
    })
}

/// Reads the records for the given keys, pruning through the membership
/// filter first: keys the filter rules out never touch a tablet.
pub fn read_batch<S: NodeStore>(
    store: &S,
    node: &Partition,
    fields: &[&str],
    keys: &[Key],
) -> Result<RecordStream> {
    let candidates: Vec<Key> = keys
        .iter()
        .filter(|key| node.membership.may_contain(key))
        .cloned()
        .collect();
    read_with(store, node, fields, |t| {
        t.read_batch(&candidates).map(clone_entry).collect()
    })
}

fn read_with<S, F>(store: &S, node: &Partition, fields: &[&str], mut extract: F) -> Result<RecordStream>
where
    S: NodeStore,
    F: FnMut(&Tablet) -> Vec<(Key, Fragment)>,
{
    let mut per_family = Vec::new();
    for family in choose_tablets(node, fields) {
        if let Some(link) = node.tablets.get(&family) {
            let t = load_tablet(store, link)?;
            per_family.push(extract(&t));
        }
    }
    let projection = if fields.is_empty() {
        None
    } else {
        Some(fields.iter().map(|f| (*f).to_string()).collect())
    };
    Ok(RecordStream::new(per_family, projection))
}

fn clone_entry((key, fragment): (&Key, &Fragment)) -> (Key, Fragment) {
    (key.clone(), fragment.clone())
}

/// Fetches and decodes one family tablet.
pub(crate) fn load_tablet<S: NodeStore>(store: &S, link: &Link) -> Result<Tablet> {
    let bytes = store.get_node(&link.target)?;
    Ok(tablet::decode(&bytes)?)
}

/// Fetches and decodes a partition node.
pub(crate) fn load_node<S: NodeStore>(store: &S, link: &Link) -> Result<Partition> {
    let bytes = store.get_node(&link.target)?;
    codec::decode_node(&bytes)
}

/// Reads a partition back into a virtual tablet of full records, all
/// families, no projection.
pub(crate) fn read_full<S: NodeStore>(store: &S, node: &Partition) -> Result<Tablet> {
    Ok(Tablet::from_records(read_all(store, node, &[])?))
}

/// The head of one tablet sequence, ordered for min-first popping.
struct HeapEntry {
    key: Key,
    source: usize,
    fragment: Fragment,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest key pops first.
        // Ties pop lower source index first, so later families override
        // earlier ones during the fragment union.
        record::key::compare(&other.key, &self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Ordered stream of `(key, record)` pairs merged across family tablets.
///
/// Advancing the stream advances exactly the tablet sequences whose head
/// matched the yielded key.
pub struct RecordStream {
    iters: Vec<std::vec::IntoIter<(Key, Fragment)>>,
    heap: BinaryHeap<HeapEntry>,
    projection: Option<BTreeSet<String>>,
}

impl RecordStream {
    fn new(per_family: Vec<Vec<(Key, Fragment)>>, projection: Option<BTreeSet<String>>) -> Self {
        let mut iters = Vec::with_capacity(per_family.len());
        let mut heap = BinaryHeap::new();
        for (source, entries) in per_family.into_iter().enumerate() {
            let mut iter = entries.into_iter();
            if let Some((key, fragment)) = iter.next() {
                heap.push(HeapEntry {
                    key,
                    source,
                    fragment,
                });
            }
            iters.push(iter);
        }
        Self {
            iters,
            heap,
            projection,
        }
    }

    fn advance(&mut self, source: usize) {
        if let Some((key, fragment)) = self.iters[source].next() {
            self.heap.push(HeapEntry {
                key,
                source,
                fragment,
            });
        }
    }
}

impl Iterator for RecordStream {
    type Item = (Key, Fragment);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.heap.pop()?;
            self.advance(top.source);
            let key = top.key;
            let mut merged = top.fragment;

            // Union every source whose head carries the same key. Families
            // partition the field space, so the union has no collisions to
            // resolve in practice.
            while self.heap.peek().map_or(false, |entry| entry.key == key) {
                if let Some(dup) = self.heap.pop() {
                    merged.extend(dup.fragment);
                    self.advance(dup.source);
                }
            }

            if let Some(fields) = &self.projection {
                merged.retain(|field, _| fields.contains(field));
                if merged.is_empty() {
                    continue;
                }
            }
            return Some((key, merged));
        }
    }
}
