//! # Tablet — immutable sorted map of key to record fragment
//!
//! A tablet holds the fragments of one column family for a contiguous run of
//! record keys. Tablets are *write-once*: every mutating operation returns a
//! new value and leaves the input untouched, so a persisted tablet's content
//! address never changes out from under a reader.
//!
//! During an update the engine also uses tablets as **virtual** carry
//! buffers: plain in-memory values holding full records (all families) that
//! have not been persisted yet. The type is the same; only the surrounding
//! [`PartitionRef`] tag differs.
//!
//! Reads (`read_all`, `read_range`, `read_batch`) yield ordered, finite
//! sequences. `read_range` bounds are inclusive, with `None` meaning open.
//!
//! [`PartitionRef`]: https://docs.rs/partition

use record::{Change, Fragment, Key};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::ops::Bound;
use thiserror::Error;

mod codec;

pub use codec::{decode, encode, TABLET_MAGIC};

/// Errors from tablet decoding.
#[derive(Debug, Error)]
pub enum TabletError {
    /// The payload failed structural validation: bad magic, CRC mismatch,
    /// or keys out of order.
    #[error("corrupt tablet: {0}")]
    Corrupt(&'static str),

    /// The payload was truncated mid-record.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// An immutable, sorted mapping from record key to fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tablet {
    entries: BTreeMap<Key, Fragment>,
}

impl Tablet {
    /// Builds a tablet from any iterable of `(key, fragment)` pairs.
    ///
    /// Input need not be sorted or unique; the last write wins per key.
    #[must_use]
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = (Key, Fragment)>,
    {
        Self {
            entries: records.into_iter().collect(),
        }
    }

    /// All entries in ascending key order.
    pub fn read_all(&self) -> impl Iterator<Item = (&Key, &Fragment)> {
        self.entries.iter()
    }

    /// Entries within `[lo, hi]`, both bounds inclusive, `None` = open.
    pub fn read_range<'a>(
        &'a self,
        lo: Option<&'a [u8]>,
        hi: Option<&'a [u8]>,
    ) -> impl Iterator<Item = (&'a Key, &'a Fragment)> + 'a {
        let lower = lo.map_or(Bound::Unbounded, Bound::Included);
        let upper = hi.map_or(Bound::Unbounded, Bound::Included);
        self.entries.range::<[u8], _>((lower, upper))
    }

    /// Entries restricted to the given keys, in ascending key order.
    pub fn read_batch<'a>(&'a self, keys: &[Key]) -> impl Iterator<Item = (&'a Key, &'a Fragment)> + 'a {
        let mut wanted = keys.to_vec();
        wanted.sort();
        wanted.dedup();
        wanted
            .into_iter()
            .filter_map(move |key| self.entries.get_key_value(&key))
    }

    /// Applies deletions, then unions in additions (additions win on
    /// collision), producing a new tablet.
    #[must_use]
    pub fn update_records<I>(&self, additions: I, deleted_keys: &BTreeSet<Key>) -> Self
    where
        I: IntoIterator<Item = (Key, Fragment)>,
    {
        let mut entries = self.entries.clone();
        for key in deleted_keys {
            entries.remove(key);
        }
        for (key, fragment) in additions {
            entries.insert(key, fragment);
        }
        Self { entries }
    }

    /// Applies a key-ordered patch of upserts and tombstones.
    ///
    /// Returns `None` when `changes` is empty, signalling that the tablet is
    /// unchanged and the caller may keep using the original.
    #[must_use]
    pub fn apply_patch<I>(&self, changes: I) -> Option<Self>
    where
        I: IntoIterator<Item = (Key, Change)>,
    {
        let mut additions: Vec<(Key, Fragment)> = Vec::new();
        let mut deleted: BTreeSet<Key> = BTreeSet::new();
        let mut touched = false;
        for (key, change) in changes {
            touched = true;
            match change {
                Some(record) => additions.push((key, record)),
                None => {
                    deleted.insert(key);
                }
            }
        }
        if !touched {
            return None;
        }
        Some(self.update_records(additions, &deleted))
    }

    /// Unions two tablets; `b` wins where both hold the same key.
    #[must_use]
    pub fn join(a: &Self, b: &Self) -> Self {
        let mut entries = a.entries.clone();
        for (key, fragment) in &b.entries {
            entries.insert(key.clone(), fragment.clone());
        }
        Self { entries }
    }

    /// Drops entries whose fragment is an empty map.
    ///
    /// Applied to every non-base tablet before persistence; the base tablet
    /// keeps empty fragments because it is authoritative on key existence.
    #[must_use]
    pub fn prune(self) -> Self {
        Self {
            entries: self
                .entries
                .into_iter()
                .filter(|(_, fragment)| !fragment.is_empty())
                .collect(),
        }
    }

    /// Splits off the first `n` entries, returning `(head, rest)`.
    #[must_use]
    pub fn split_at(self, n: usize) -> (Self, Self) {
        let mut iter = self.entries.into_iter();
        let head: BTreeMap<Key, Fragment> = iter.by_ref().take(n).collect();
        let rest: BTreeMap<Key, Fragment> = iter.collect();
        (Self { entries: head }, Self { entries: rest })
    }

    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&Fragment> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    #[must_use]
    pub fn first_key(&self) -> Option<&Key> {
        self.entries.keys().next()
    }

    #[must_use]
    pub fn last_key(&self) -> Option<&Key> {
        self.entries.keys().next_back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the tablet, yielding owned entries in key order.
    pub fn into_entries(self) -> impl Iterator<Item = (Key, Fragment)> {
        self.entries.into_iter()
    }
}

impl FromIterator<(Key, Fragment)> for Tablet {
    fn from_iter<I: IntoIterator<Item = (Key, Fragment)>>(iter: I) -> Self {
        Self::from_records(iter)
    }
}
