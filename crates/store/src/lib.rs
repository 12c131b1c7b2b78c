//! # Store — content-addressed node storage
//!
//! Every node in the database forest (partitions, tablets, index nodes) is
//! serialized to bytes and stored under the blake3 hash of those bytes. The
//! address of a node therefore *is* its content: storing the same bytes twice
//! yields the same [`NodeId`] and writes nothing new, and any two values that
//! serialize identically are the same node.
//!
//! Nodes are immutable. An "update" to the tree writes new nodes and leaves
//! the old ones in place; garbage collection of unreachable nodes is the
//! store's concern, not the engine's.
//!
//! The engine consumes the [`NodeStore`] trait. [`MemoryStore`] is the
//! in-process implementation used by tests and single-process embedding; a
//! networked or on-disk store plugs in behind the same trait.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by a node store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested node is not present in the store.
    #[error("node {0} not found")]
    NotFound(NodeId),

    /// The store backend failed transiently. The engine never retries;
    /// the whole update is restartable because no new node is reachable
    /// until a table root commits.
    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

/// The content address of a stored node: the blake3 hash of its bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId([u8; 32]);

impl NodeId {
    /// Computes the id for a byte payload.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Raw hash bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Reconstructs an id from raw hash bytes (used by node decoders).
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeId({self})")
    }
}

/// A named reference to a stored node.
///
/// The name is display metadata only (the family name for tablet links);
/// identity and equality are decided by the target id alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub target: NodeId,
}

impl Link {
    /// Tags `target` with a display name.
    #[must_use]
    pub fn new(name: impl Into<String>, target: NodeId) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.target)
    }
}

/// The storage seam the partition engine is generic over.
///
/// `put_node` must be idempotent: storing bytes already present returns the
/// existing id without error. `get_node` must return exactly the bytes that
/// were stored; callers verify structure, not the store.
pub trait NodeStore {
    /// Stores a serialized node, returning its content address.
    fn put_node(&self, bytes: Vec<u8>) -> Result<NodeId, StoreError>;

    /// Fetches the bytes of a previously stored node.
    fn get_node(&self, id: &NodeId) -> Result<Arc<[u8]>, StoreError>;
}

/// In-memory content-addressed store.
///
/// Multiple readers may traverse concurrently; the single writer of an
/// update only ever inserts new keys, so a plain read-write lock suffices.
#[derive(Debug, Default)]
pub struct MemoryStore {
    nodes: RwLock<HashMap<NodeId, Arc<[u8]>>>,
    writes: AtomicU64,
    reads: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct nodes held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Total `put_node` calls observed, including rewrites of existing
    /// content. Tests use this to assert that untouched partitions cost
    /// zero writes.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Total `get_node` calls observed. Tests use this to assert that
    /// projected reads skip unneeded tablets.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns `true` if a node with this id is present.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.read().contains_key(id)
    }
}

impl NodeStore for MemoryStore {
    fn put_node(&self, bytes: Vec<u8>) -> Result<NodeId, StoreError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let id = NodeId::of(&bytes);
        self.nodes.write().entry(id).or_insert_with(|| bytes.into());
        Ok(id)
    }

    fn get_node(&self, id: &NodeId) -> Result<Arc<[u8]>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.nodes
            .read()
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }
}
