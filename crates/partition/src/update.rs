//! The partition update engine.
//!
//! Walks an ordered sequence of `(partition, patch)` inputs and produces a
//! new ordered sequence of valid partitions whose union reflects every
//! patch. The walk keeps at most one in-memory **pending** tablet between
//! steps, bounding memory to roughly `2 * limit` records immediately
//! before an emit.
//!
//! Per input, the engine either:
//!
//! * **passes through** — no pending records and an empty patch. Stored
//!   partitions are re-emitted by their existing link (zero writes) unless
//!   they under- or overflow, in which case they are absorbed into pending
//!   or re-split.
//! * **merges** — the input's records are loaded, patched, and joined with
//!   pending. An empty result drops the partition; a result identical to
//!   the loaded records falls back to pass-through (preserving the
//!   original link); a result of `limit + half_full` or more records emits
//!   `limit`-sized partitions until fewer than that remain.
//!
//! [`finish_update`] then either flushes the final pending tablet, merges
//! it backward into the last emitted partition when it is too small to
//! stand alone, or — when nothing at all was emitted — returns it as
//! [`UpdateOutcome::Carry`] for the parent index layer to place.

use store::NodeStore;
use tablet::Tablet;
use tracing::debug;

use crate::build::{live_changes, partition_records};
use crate::read::{load_node, read_full};
use crate::{from_records, PartitionParams, PartitionRef, Patch, Result, StoredPartition};

/// Applies per-partition patches to an ordered run of partitions.
///
/// `inputs` must arrive in ascending first-key order; the output preserves
/// that order. `carry` is an optional run of records handed down from a
/// preceding sibling subtree; its keys must precede every input key.
///
/// Returns the updated partition list, or [`UpdateOutcome::Carry`] when the surviving
/// records are fewer than `half_full` and there is no result partition to
/// merge them into.
pub fn update_partitions<S, I>(
    store: &S,
    params: &PartitionParams,
    carry: Option<PartitionRef>,
    inputs: I,
) -> Result<UpdateOutcome>
where
    S: NodeStore,
    I: IntoIterator<Item = (PartitionRef, Patch)>,
{
    let mut result: Vec<StoredPartition> = Vec::new();
    let mut pending: Option<Tablet> = match carry {
        Some(part) => non_empty(load_ref(store, &part)?),
        None => None,
    };

    for (part, changes) in inputs {
        pending = step(store, params, &mut result, pending, part, changes)?;
    }
    finish_update(store, params, result, pending)
}

/// Processes one `(partition, patch)` input, returning the new pending
/// tablet.
fn step<S: NodeStore>(
    store: &S,
    params: &PartitionParams,
    result: &mut Vec<StoredPartition>,
    pending: Option<Tablet>,
    part: PartitionRef,
    changes: Patch,
) -> Result<Option<Tablet>> {
    // Nothing buffered and nothing to apply: the partition flows through
    // untouched (modulo size triage).
    if pending.is_none() && changes.is_empty() {
        return match part {
            PartitionRef::Link(link) => {
                let node = load_node(store, &link)?;
                pass_through(store, params, result, StoredPartition { link, node })
            }
            PartitionRef::Node(stored) => pass_through(store, params, result, stored),
            PartitionRef::Virtual(t) => Ok(non_empty(t)),
        };
    }

    // Merge: load the input's full records, apply the patch, fold in
    // whatever is pending.
    let (loaded, origin) = match part {
        PartitionRef::Link(link) => {
            let node = load_node(store, &link)?;
            let records = read_full(store, &node)?;
            (records, Some(StoredPartition { link, node }))
        }
        PartitionRef::Node(stored) => {
            let records = read_full(store, &stored.node)?;
            (records, Some(stored))
        }
        PartitionRef::Virtual(t) => (t, None),
    };

    let patched = loaded.apply_patch(changes);
    let merged = match (pending, patched) {
        (Some(buf), Some(t)) => Tablet::join(&buf, &t),
        (Some(buf), None) => Tablet::join(&buf, &loaded),
        (None, Some(t)) => t,
        (None, None) => loaded.clone(),
    };

    if merged.is_empty() {
        debug!("all records deleted, dropping partition");
        return Ok(None);
    }

    if merged == loaded {
        // The patch was a no-op; keep the original node (and link) instead
        // of rewriting identical content.
        return match origin {
            Some(stored) => pass_through(store, params, result, stored),
            None => Ok(Some(merged)),
        };
    }

    if merged.len() >= params.emit_threshold() {
        emit_parts(store, params, result, merged)
    } else {
        Ok(Some(merged))
    }
}

/// Triages an unchanged stored partition.
///
/// * underflow (`count < half_full`): absorb its records into pending;
/// * overflow (`count > limit`): re-split into valid partitions;
/// * otherwise: re-emit the stored partition as-is, no writes.
pub fn check_partition<S: NodeStore>(
    store: &S,
    params: &PartitionParams,
    part: StoredPartition,
) -> Result<(Vec<StoredPartition>, Option<Tablet>)> {
    let count = part.node.count();
    if count < params.half_full() {
        debug!(count, "partition under half full, absorbing into pending");
        let records = read_full(store, &part.node)?;
        Ok((Vec::new(), Some(records)))
    } else if count > params.limit {
        debug!(count, limit = params.limit, "partition over limit, splitting");
        let records = read_full(store, &part.node)?;
        let parts = partition_records(store, params, live_changes(records))?;
        Ok((parts, None))
    } else {
        Ok((vec![part], None))
    }
}

fn pass_through<S: NodeStore>(
    store: &S,
    params: &PartitionParams,
    result: &mut Vec<StoredPartition>,
    part: StoredPartition,
) -> Result<Option<Tablet>> {
    let (mut parts, tab) = check_partition(store, params, part)?;
    result.append(&mut parts);
    Ok(tab)
}

/// Splits full partitions off the front of `merged` until fewer than
/// `emit_threshold` records remain; the remainder becomes the new pending
/// tablet (always at least `half_full` records, so it can stand alone or
/// be carried).
fn emit_parts<S: NodeStore>(
    store: &S,
    params: &PartitionParams,
    result: &mut Vec<StoredPartition>,
    merged: Tablet,
) -> Result<Option<Tablet>> {
    let mut rest = merged;
    while rest.len() >= params.emit_threshold() {
        let (head, tail) = rest.split_at(params.limit);
        debug!(emitted = head.len(), remaining = tail.len(), "emitting full partition");
        if let Some(part) = from_records(store, params, live_changes(head))? {
            result.push(part);
        }
        rest = tail;
    }
    Ok(Some(rest))
}

/// Resolves the final pending tablet once all inputs are consumed.
fn finish_update<S: NodeStore>(
    store: &S,
    params: &PartitionParams,
    mut result: Vec<StoredPartition>,
    pending: Option<Tablet>,
) -> Result<UpdateOutcome> {
    let Some(pending) = pending else {
        return Ok(UpdateOutcome::Partitions(result));
    };

    if pending.len() < params.half_full() {
        match result.pop() {
            Some(last) => {
                // Borrow backward: redistribute the last emitted partition
                // together with the leftover records.
                debug!(
                    leftover = pending.len(),
                    borrowed = last.node.count(),
                    "merging undersized remainder into last partition"
                );
                let records = read_full(store, &last.node)?;
                let combined = Tablet::join(&records, &pending);
                let mut parts = partition_records(store, params, live_changes(combined))?;
                result.append(&mut parts);
                Ok(UpdateOutcome::Partitions(result))
            }
            None => {
                debug!(leftover = pending.len(), "returning carry tablet to caller");
                Ok(UpdateOutcome::Carry(pending))
            }
        }
    } else {
        let mut parts = partition_records(store, params, live_changes(pending))?;
        result.append(&mut parts);
        Ok(UpdateOutcome::Partitions(result))
    }
}

/// Loads any partition reference into a virtual tablet of full records.
fn load_ref<S: NodeStore>(store: &S, part: &PartitionRef) -> Result<Tablet> {
    match part {
        PartitionRef::Virtual(t) => Ok(t.clone()),
        PartitionRef::Node(stored) => read_full(store, &stored.node),
        PartitionRef::Link(link) => {
            let node = load_node(store, link)?;
            read_full(store, &node)
        }
    }
}

fn non_empty(t: Tablet) -> Option<Tablet> {
    if t.is_empty() {
        None
    } else {
        Some(t)
    }
}

/// The result of an update walk.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The updated, ordered partition run; empty when every record was
    /// deleted.
    Partitions(Vec<StoredPartition>),
    /// Fewer than `half_full` records survived and nothing was emitted;
    /// the caller must merge these into a sibling subtree.
    Carry(Tablet),
}

impl UpdateOutcome {
    /// Unwraps the partition list, treating a carry as empty. Convenience
    /// for callers that know a sibling exists (or accept a short root).
    #[must_use]
    pub fn into_partitions(self) -> Vec<StoredPartition> {
        match self {
            UpdateOutcome::Partitions(parts) => parts,
            UpdateOutcome::Carry(_) => Vec::new(),
        }
    }
}
