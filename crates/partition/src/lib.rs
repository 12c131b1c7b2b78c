//! # Partition — record containers and the partition update engine
//!
//! A table in the database is a forest of immutable, content-addressed
//! nodes. Underneath the index tree sits an ordered run of **partitions**,
//! each owning a disjoint, contiguous key range and storing its records as
//! one tablet per column family:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ PARTITION NODE                                               │
//! │                                                              │
//! │ limit | count | first_key | last_key | families | membership │
//! │                                                              │
//! │ tablets: { "base" → link, "props" → link, ... }              │
//! └──────┬───────────────────────┬───────────────────────────────┘
//!        v                       v
//! ┌──────────────┐        ┌──────────────┐
//! │ base TABLET  │        │ props TABLET │   (one sorted key →
//! │ k1 k2 k3 ... │        │ k1 k3 ...    │    fragment map each)
//! └──────────────┘        └──────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module       | Purpose                                                |
//! |--------------|--------------------------------------------------------|
//! | [`lib.rs`]   | Node type, parameters, errors, `PartitionRef`          |
//! | [`codec`]    | Binary node encoding (magic type tag, byteorder, CRC'd tablets downstream) |
//! | [`build`]    | `from_records`, `partition_records`, `partition_limited` |
//! | [`update`]   | The merge/split/borrow update walk over an ordered partition run |
//! | [`read`]     | Family selection, k-way merged reads, field projection |
//! | [`validate`] | Integrity audit collecting rule violations             |
//!
//! ## The update walk
//!
//! [`update_partitions`] consumes `(partition, patch)` tuples in ascending
//! key order and streams new partitions out, carrying at most one in-memory
//! "pending" tablet of not-yet-emitted records between steps:
//!
//! ```text
//! input:   [P1, patch] [P2, patch] [P3, ∅] ...
//!              |            |          |
//!              v            v          v
//!          merge into   merge into  pass through unchanged
//!          pending ─────> emit full partitions when pending
//!                         reaches limit + half_full
//! ```
//!
//! Untouched partitions are re-emitted by link without reserialization, so
//! an update that misses a partition writes zero new nodes for it. If the
//! final pending tablet is too small to stand alone and nothing was emitted
//! before it, the engine hands the tablet back to the caller
//! ([`UpdateOutcome::Carry`]) so the parent index layer can borrow from a
//! sibling subtree.
//!
//! ## Immutability
//!
//! Partition and tablet values are immutable; every rewrite stores new
//! nodes and the old ones stay reachable from prior table roots. Equality
//! of persisted values is equality of content addresses.

use bloom::MembershipFilter;
use record::{Change, Families, Key};
use std::collections::BTreeMap;
use store::{Link, StoreError};
use tablet::{Tablet, TabletError};
use thiserror::Error;

mod build;
mod codec;
mod read;
mod update;
mod validate;

pub use build::{from_records, partition_limited, partition_records};
pub use codec::{decode_node, encode_node, PARTITION_TYPE};
pub use read::{choose_tablets, read_all, read_batch, read_range, RecordStream};
pub use update::{check_partition, update_partitions, UpdateOutcome};
pub use validate::{validate_partition, KeyBounds, ValidationFailure};

/// Default maximum records per partition.
pub const DEFAULT_LIMIT: usize = 10_000;

/// Default false-positive target for the membership filter.
pub const DEFAULT_BLOOM_FPR: f64 = 0.01;

/// Errors from building, reading, or updating partitions.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// A single partition was asked to hold more than `limit` records.
    /// Never retried; it indicates a chunking bug in the caller.
    #[error("partition overflow: {count} records exceed limit {limit}")]
    Overflow { count: usize, limit: usize },

    /// A partition node payload failed deserialization or schema checks.
    #[error("corrupt partition node: {0}")]
    CorruptNode(&'static str),

    /// A referenced tablet failed deserialization.
    #[error(transparent)]
    Tablet(#[from] TabletError),

    /// The object store failed. The engine does not retry; the whole
    /// update is restartable because nothing becomes visible until a new
    /// table root commits.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PartitionError>;

/// A key-ordered sequence of pending changes for one partition.
pub type Patch = Vec<(Key, Change)>;

/// Sizing and layout parameters for partition construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionParams {
    /// Maximum records per partition. Must be at least 2.
    pub limit: usize,
    /// Field-family partitioning; empty means everything lands in `base`.
    pub families: Families,
    /// False-positive target for the membership filter.
    pub bloom_fpr: f64,
}

impl Default for PartitionParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            families: Families::default(),
            bloom_fpr: DEFAULT_BLOOM_FPR,
        }
    }
}

impl PartitionParams {
    /// Creates parameters with the given record limit.
    ///
    /// # Panics
    ///
    /// Panics if `limit < 2`; a partition must be able to hold at least one
    /// record on each side of a split.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        assert!(limit >= 2, "partition limit must be >= 2");
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Sets the field-family layout.
    #[must_use]
    pub fn with_families(mut self, families: Families) -> Self {
        self.families = families;
        self
    }

    /// Minimum records a non-boundary partition may hold once the tree
    /// total reaches `limit`: `ceil(limit / 2)`.
    #[must_use]
    pub fn half_full(&self) -> usize {
        (self.limit + 1) / 2
    }

    /// Pending-tablet size at which the engine splits off a full partition:
    /// `limit + half_full`. The remainder after taking `limit` records is
    /// then still at least `half_full` and can stand alone or be carried.
    #[must_use]
    pub fn emit_threshold(&self) -> usize {
        self.limit + self.half_full()
    }
}

/// An immutable partition node.
///
/// Owns the records in `[first_key, last_key]` through one tablet link per
/// non-empty family; `base` is always present. The node stores its own
/// `limit` so a tree remains re-validatable without external parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub(crate) limit: usize,
    pub(crate) tablets: BTreeMap<String, Link>,
    pub(crate) membership: MembershipFilter,
    pub(crate) count: usize,
    pub(crate) families: Families,
    pub(crate) first_key: Key,
    pub(crate) last_key: Key,
}

impl Partition {
    /// Maximum records this partition may hold.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of records contained.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Smallest key present.
    #[must_use]
    pub fn first_key(&self) -> &[u8] {
        &self.first_key
    }

    /// Largest key present.
    #[must_use]
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }

    /// Per-family tablet links; `base` is always present.
    #[must_use]
    pub fn tablets(&self) -> &BTreeMap<String, Link> {
        &self.tablets
    }

    /// The family layout this partition was built with.
    #[must_use]
    pub fn families(&self) -> &Families {
        &self.families
    }

    /// Membership filter over all contained keys (no false negatives).
    #[must_use]
    pub fn membership(&self) -> &MembershipFilter {
        &self.membership
    }
}

/// A partition node together with the link it was stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPartition {
    pub link: Link,
    pub node: Partition,
}

/// Runtime discriminator for the update engine's inputs and carry value.
#[derive(Debug, Clone)]
pub enum PartitionRef {
    /// A stored partition identified by link only; loaded on demand.
    Link(Link),
    /// A stored partition already loaded into memory.
    Node(StoredPartition),
    /// An in-memory tablet of full records, not yet persisted.
    Virtual(Tablet),
}

#[cfg(test)]
mod tests;
