//! Integrity audit for stored partitions.
//!
//! Checks are collected rather than thrown so that one audit pass can
//! report every violation in a subtree instead of stopping at the first.

use record::{key, BASE_FAMILY};
use store::{Link, NodeStore};

use crate::read::{load_node, load_tablet};
use crate::{Partition, PartitionParams};

/// One violated integrity rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Stable rule identifier, e.g. `"partition/half-full"`.
    pub rule: &'static str,
    /// Human-readable description of the violation.
    pub detail: String,
}

impl ValidationFailure {
    fn new(rule: &'static str, detail: impl Into<String>) -> Self {
        Self {
            rule,
            detail: detail.into(),
        }
    }
}

/// Key bounds a partition must fall within, supplied by the parent
/// subtree. `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyBounds<'a> {
    pub lower: Option<&'a [u8]>,
    pub upper: Option<&'a [u8]>,
}

/// Validates one stored partition against its context.
///
/// `tree_total` is the record count of the whole tree; the half-full rule
/// only binds once the tree holds at least `limit` records (a small tree
/// is allowed a single short partition).
pub fn validate_partition<S: NodeStore>(
    store: &S,
    params: &PartitionParams,
    link: &Link,
    bounds: KeyBounds<'_>,
    tree_total: usize,
) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();

    let node = match load_node(store, link) {
        Ok(node) => node,
        Err(err) => {
            failures.push(ValidationFailure::new("node/readable", err.to_string()));
            return failures;
        }
    };

    check_node(&mut failures, params, &node, bounds, tree_total);
    check_tablets(store, &mut failures, &node);
    failures
}

fn check_node(
    failures: &mut Vec<ValidationFailure>,
    params: &PartitionParams,
    node: &Partition,
    bounds: KeyBounds<'_>,
    tree_total: usize,
) {
    let half_full = (node.limit + 1) / 2;

    if node.count > node.limit {
        failures.push(ValidationFailure::new(
            "partition/limit",
            format!("{} records exceed limit {}", node.count, node.limit),
        ));
    }
    if tree_total >= node.limit && node.count < half_full {
        failures.push(ValidationFailure::new(
            "partition/half-full",
            format!(
                "{} records below half-full threshold {}",
                node.count, half_full
            ),
        ));
    }
    if node.families != params.families {
        failures.push(ValidationFailure::new(
            "partition/families",
            "family layout differs from expected layout",
        ));
    }
    if key::after(&node.first_key, &node.last_key) {
        failures.push(ValidationFailure::new(
            "partition/key-bounds",
            "first key sorts after last key",
        ));
    }
    if let Some(lower) = bounds.lower {
        if key::before(&node.first_key, lower) {
            failures.push(ValidationFailure::new(
                "partition/subtree-bounds",
                "first key below subtree lower bound",
            ));
        }
    }
    if let Some(upper) = bounds.upper {
        if key::after(&node.last_key, upper) {
            failures.push(ValidationFailure::new(
                "partition/subtree-bounds",
                "last key above subtree upper bound",
            ));
        }
    }
    if !node.tablets.contains_key(BASE_FAMILY) {
        failures.push(ValidationFailure::new(
            "partition/base-tablet",
            "base tablet link missing",
        ));
    }
}

fn check_tablets<S: NodeStore>(
    store: &S,
    failures: &mut Vec<ValidationFailure>,
    node: &Partition,
) {
    for (family, link) in &node.tablets {
        let tablet = match load_tablet(store, link) {
            Ok(t) => t,
            Err(err) => {
                failures.push(ValidationFailure::new(
                    "tablet/readable",
                    format!("family {family}: {err}"),
                ));
                continue;
            }
        };

        if family == BASE_FAMILY && tablet.len() != node.count {
            failures.push(ValidationFailure::new(
                "tablet/record-count",
                format!(
                    "base tablet holds {} records, node claims {}",
                    tablet.len(),
                    node.count
                ),
            ));
        }

        for k in tablet.keys() {
            if key::before(k, &node.first_key) || key::after(k, &node.last_key) {
                failures.push(ValidationFailure::new(
                    "tablet/key-bounds",
                    format!("family {family}: key outside [first_key, last_key]"),
                ));
                break;
            }
        }

        for k in tablet.keys() {
            if !node.membership.may_contain(k) {
                failures.push(ValidationFailure::new(
                    "partition/membership",
                    format!("family {family}: contained key reports absent"),
                ));
                break;
            }
        }
    }
}
