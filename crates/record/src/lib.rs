//! # Record — keys, fields, and families
//!
//! The logical data model shared by every crate in the workspace.
//!
//! A **record** is a map from field name to opaque value bytes, addressed by
//! a unique byte-string **key**. Keys are totally ordered by lexicographic
//! byte comparison, so partitions can own contiguous, disjoint key ranges.
//!
//! A **field family** groups fields that are stored together in one tablet.
//! The `families` mapping claims fields for named families; whatever is left
//! over lands in the reserved `base` family. Splitting a record by family
//! ([`Families::split_record`]) and re-joining the per-family fragments must
//! reconstruct the original record exactly.
//!
//! Pending mutations are `(key, Option<record>)` pairs where `None` is the
//! **tombstone** marking a deletion.

use std::collections::{BTreeMap, BTreeSet};

pub mod key;

/// The reserved family that collects every field not claimed by a named
/// family. Every surviving record key has a `base` fragment, even an empty
/// one, so the base tablet stays authoritative on key existence.
pub const BASE_FAMILY: &str = "base";

/// An opaque record key; ordering is lexicographic over the bytes.
pub type Key = Vec<u8>;

/// A full record: field name to value bytes.
pub type Record = BTreeMap<String, Vec<u8>>;

/// The subset of a record's fields belonging to one family.
pub type Fragment = BTreeMap<String, Vec<u8>>;

/// A pending change: `Some(record)` upserts, `None` is a tombstone.
pub type Change = Option<Record>;

/// Returns `true` if the change is a tombstone.
#[must_use]
pub fn is_tombstone(change: &Change) -> bool {
    change.is_none()
}

/// Drops tombstoned entries, keeping only live `(key, record)` pairs.
pub fn remove_tombstones<I>(changes: I) -> impl Iterator<Item = (Key, Record)>
where
    I: IntoIterator<Item = (Key, Change)>,
{
    changes
        .into_iter()
        .filter_map(|(k, change)| change.map(|record| (k, record)))
}

/// The field-family partitioning used when building partition tablets.
///
/// Maps family name to the set of field names it claims. Families never
/// claim the [`BASE_FAMILY`] name; unclaimed fields implicitly belong to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Families {
    claimed: BTreeMap<String, BTreeSet<String>>,
}

impl Families {
    /// Builds a family mapping from `(family, fields)` pairs.
    ///
    /// # Panics
    ///
    /// Panics if a family is named `base` (the reserved default) or if two
    /// families claim the same field, since the mapping must partition the
    /// field space.
    pub fn new<I, F>(families: I) -> Self
    where
        I: IntoIterator<Item = (String, F)>,
        F: IntoIterator<Item = String>,
    {
        let mut claimed: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for (family, fields) in families {
            assert!(family != BASE_FAMILY, "family name `base` is reserved");
            let fields: BTreeSet<String> = fields.into_iter().collect();
            for field in &fields {
                assert!(
                    seen.insert(field.clone()),
                    "field {field:?} claimed by more than one family"
                );
            }
            claimed.insert(family, fields);
        }
        Self { claimed }
    }

    /// Returns `true` if no named family exists (everything goes to `base`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    /// Iterates over the named families and their claimed field sets.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.claimed.iter()
    }

    /// Returns the field set claimed by `family`, if it is a named family.
    #[must_use]
    pub fn fields_of(&self, family: &str) -> Option<&BTreeSet<String>> {
        self.claimed.get(family)
    }

    /// Returns the family that stores `field`.
    #[must_use]
    pub fn family_of(&self, field: &str) -> &str {
        for (family, fields) in &self.claimed {
            if fields.contains(field) {
                return family;
            }
        }
        BASE_FAMILY
    }

    /// Splits one record into per-family fragments.
    ///
    /// Fragments that would be empty are omitted, except `base`, which is
    /// always present so the key itself survives in the base tablet.
    #[must_use]
    pub fn split_record(&self, record: &Record) -> BTreeMap<String, Fragment> {
        let mut fragments: BTreeMap<String, Fragment> = BTreeMap::new();
        fragments.insert(BASE_FAMILY.to_string(), Fragment::new());
        for (field, value) in record {
            let family = self.family_of(field);
            fragments
                .entry(family.to_string())
                .or_default()
                .insert(field.clone(), value.clone());
        }
        fragments
    }

    /// Splits a sorted sequence of records into per-family fragment
    /// sequences, preserving key order within each family.
    #[must_use]
    pub fn split_data<'a, I>(&self, records: I) -> BTreeMap<String, Vec<(Key, Fragment)>>
    where
        I: IntoIterator<Item = (&'a Key, &'a Record)>,
    {
        let mut out: BTreeMap<String, Vec<(Key, Fragment)>> = BTreeMap::new();
        for (key, record) in records {
            for (family, fragment) in self.split_record(record) {
                out.entry(family).or_default().push((key.clone(), fragment));
            }
        }
        out
    }
}
