//! Change detection between two snapshots.
//!
//! Records are matched by identity. Output order follows the input order of
//! each side, since adapters pre-sort snapshots for reproducible diffs. When
//! one side holds several records with the same identity, the first one wins
//! and the rest are ignored.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::models::Record;
use crate::pipeline::identity::{IdentityKey, IdentityResolver};

/// Added/removed/changed partition between two snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub added: Vec<Record>,
    pub removed: Vec<Record>,
    /// `(old, new)` pairs sharing an identity whose contents differ
    pub changed: Vec<(Record, Record)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

/// Calculator for computing diffs between snapshots.
#[derive(Debug, Clone, Default)]
pub struct DiffCalculator;

impl DiffCalculator {
    /// Create a new diff calculator.
    pub fn new() -> Self {
        Self
    }

    /// Calculate the diff between previous and current snapshots.
    ///
    /// Every record on both sides must resolve to an identity; the first
    /// failure aborts the diff.
    pub fn calculate(
        &self,
        previous: &[Record],
        current: &[Record],
        identity: &IdentityResolver,
    ) -> Result<ChangeSet> {
        let prev_keys = resolve_all(previous, identity)?;
        let curr_keys = resolve_all(current, identity)?;

        // First occurrence wins on both sides
        let mut prev_first: HashMap<&IdentityKey, usize> = HashMap::new();
        for (i, key) in prev_keys.iter().enumerate() {
            prev_first.entry(key).or_insert(i);
        }
        let curr_ids: HashSet<&IdentityKey> = curr_keys.iter().collect();

        let mut changes = ChangeSet::default();

        let mut seen = HashSet::new();
        for (record, key) in current.iter().zip(&curr_keys) {
            if !seen.insert(key) {
                continue;
            }
            match prev_first.get(key) {
                None => changes.added.push(record.clone()),
                Some(&i) if previous[i] != *record => {
                    changes.changed.push((previous[i].clone(), record.clone()));
                }
                Some(_) => {}
            }
        }

        let mut seen = HashSet::new();
        for (record, key) in previous.iter().zip(&prev_keys) {
            if seen.insert(key) && !curr_ids.contains(key) {
                changes.removed.push(record.clone());
            }
        }

        Ok(changes)
    }
}

fn resolve_all(records: &[Record], identity: &IdentityResolver) -> Result<Vec<IdentityKey>> {
    records.iter().map(|r| identity.resolve(r)).collect()
}

/// Convenience function to calculate diff.
pub fn calculate_diff(
    previous: &[Record],
    current: &[Record],
    identity: &IdentityResolver,
) -> Result<ChangeSet> {
    DiffCalculator::new().calculate(previous, current, identity)
}
