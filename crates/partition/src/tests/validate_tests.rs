use super::helpers::*;
use crate::*;
use anyhow::Result;
use store::{MemoryStore, NodeId, NodeStore};

fn rules(failures: &[ValidationFailure]) -> Vec<&'static str> {
    failures.iter().map(|f| f.rule).collect()
}

#[test]
fn valid_partition_passes_clean() -> Result<()> {
    let store = MemoryStore::new();
    let params = PartitionParams::new(6).with_families(families(&[("ab", &["a"])]));

    let part = from_records(
        &store,
        &params,
        vec![
            (key(1), Some(rec(&[("a", b"1"), ("x", b"2")]))),
            (key(2), Some(numbered(2))),
            (key(3), Some(numbered(3))),
        ],
    )?
    .expect("partition");

    let failures = validate_partition(&store, &params, &part.link, KeyBounds::default(), 3);
    assert!(failures.is_empty(), "unexpected failures: {failures:?}");
    Ok(())
}

#[test]
fn unreadable_node_is_reported_not_thrown() {
    let store = MemoryStore::new();
    let params = PartitionParams::new(6);
    let dangling = store::Link::new("partition", NodeId::of(b"missing"));

    let failures = validate_partition(&store, &params, &dangling, KeyBounds::default(), 0);
    assert_eq!(rules(&failures), vec!["node/readable"]);
}

#[test]
fn half_full_rule_binds_only_for_large_trees() -> Result<()> {
    let store = MemoryStore::new();
    let params = PartitionParams::new(10);
    let part = build(&store, &params, 1, 2);

    // Tree of 2 records: a short partition is fine.
    let small = validate_partition(&store, &params, &part.link, KeyBounds::default(), 2);
    assert!(small.is_empty(), "unexpected failures: {small:?}");

    // Same partition inside a tree of 100 records: underflow.
    let large = validate_partition(&store, &params, &part.link, KeyBounds::default(), 100);
    assert!(rules(&large).contains(&"partition/half-full"));
    Ok(())
}

#[test]
fn subtree_bounds_are_enforced() -> Result<()> {
    let store = MemoryStore::new();
    let params = PartitionParams::new(10);
    let part = build(&store, &params, 5, 9);

    let (lo, hi) = (key(1), key(20));
    let inside = KeyBounds {
        lower: Some(&lo),
        upper: Some(&hi),
    };
    assert!(validate_partition(&store, &params, &part.link, inside, 5).is_empty());

    let shifted_lo = key(7);
    let shifted = KeyBounds {
        lower: Some(&shifted_lo),
        upper: None,
    };
    let failures = validate_partition(&store, &params, &part.link, shifted, 5);
    assert!(rules(&failures).contains(&"partition/subtree-bounds"));
    Ok(())
}

#[test]
fn family_layout_mismatch_is_reported() -> Result<()> {
    let store = MemoryStore::new();
    let params = PartitionParams::new(10);
    let part = build(&store, &params, 1, 5);

    let expecting = params.clone().with_families(families(&[("ab", &["a"])]));
    let failures = validate_partition(&store, &expecting, &part.link, KeyBounds::default(), 5);
    assert!(rules(&failures).contains(&"partition/families"));
    Ok(())
}

#[test]
fn count_mismatch_against_base_tablet_is_reported() -> Result<()> {
    let store = MemoryStore::new();
    let params = PartitionParams::new(10);
    let part = build(&store, &params, 1, 5);

    // Re-store the node with a lying record count.
    let mut node = part.node.clone();
    node.count = 4;
    let id = store.put_node(encode_node(&node)?)?;
    let link = store::Link::new("partition", id);

    let failures = validate_partition(&store, &params, &link, KeyBounds::default(), 5);
    assert!(rules(&failures).contains(&"tablet/record-count"));
    Ok(())
}

#[test]
fn missing_base_tablet_is_reported() -> Result<()> {
    let store = MemoryStore::new();
    let params = PartitionParams::new(10);
    let part = build(&store, &params, 1, 5);

    let mut node = part.node.clone();
    node.tablets.remove("base");
    let id = store.put_node(encode_node(&node)?)?;
    let link = store::Link::new("partition", id);

    let failures = validate_partition(&store, &params, &link, KeyBounds::default(), 5);
    assert!(rules(&failures).contains(&"partition/base-tablet"));
    Ok(())
}

#[test]
fn dangling_tablet_link_is_reported() -> Result<()> {
    let store = MemoryStore::new();
    let params = PartitionParams::new(10);
    let part = build(&store, &params, 1, 5);

    let mut node = part.node.clone();
    node.tablets
        .insert("base".to_string(), store::Link::new("base", NodeId::of(b"gone")));
    let id = store.put_node(encode_node(&node)?)?;
    let link = store::Link::new("partition", id);

    let failures = validate_partition(&store, &params, &link, KeyBounds::default(), 5);
    assert!(rules(&failures).contains(&"tablet/readable"));
    Ok(())
}

#[test]
fn keys_outside_declared_bounds_are_reported() -> Result<()> {
    let store = MemoryStore::new();
    let params = PartitionParams::new(10);
    let part = build(&store, &params, 1, 5);

    // Claim a narrower key range than the base tablet actually spans.
    let mut node = part.node.clone();
    node.first_key = key(2);
    let id = store.put_node(encode_node(&node)?)?;
    let link = store::Link::new("partition", id);

    let failures = validate_partition(&store, &params, &link, KeyBounds::default(), 5);
    assert!(rules(&failures).contains(&"tablet/key-bounds"));
    Ok(())
}
