//! Three-way diff between expected and applied migrations, keyed by
//! fingerprint. Pure: nothing here touches storage.

use crate::core::identity::fingerprint;
use crate::core::migration::Migration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Result of [`compare`]. Each list is sorted ascending by id, and no
/// fingerprint appears in more than one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationState {
    /// In both sets.
    pub shared: Vec<Migration>,
    /// Expected but not applied.
    pub missing: Vec<Migration>,
    /// Applied but not expected.
    pub unexpected: Vec<Migration>,
}

impl MigrationState {
    /// Nothing missing and nothing unexpected.
    pub fn is_synchronized(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }

    /// Highest-id shared migration.
    pub fn latest_shared(&self) -> Option<&Migration> {
        self.shared.iter().max_by_key(|m| m.id)
    }
}

/// First occurrence of each fingerprint, paired with its fingerprint.
fn dedup(migrations: &[Migration]) -> Vec<(String, &Migration)> {
    let mut seen = HashSet::new();
    migrations
        .iter()
        .filter_map(|m| {
            let fp = fingerprint(m);
            seen.insert(fp.clone()).then_some((fp, m))
        })
        .collect()
}

pub fn compare(expected: &[Migration], applied: &[Migration]) -> MigrationState {
    let expected = dedup(expected);
    let applied = dedup(applied);

    let expected_fps: HashSet<&str> = expected.iter().map(|(fp, _)| fp.as_str()).collect();
    let applied_fps: HashSet<&str> = applied.iter().map(|(fp, _)| fp.as_str()).collect();

    let mut state = MigrationState::default();
    for (fp, m) in &expected {
        if applied_fps.contains(fp.as_str()) {
            state.shared.push((*m).clone());
        } else {
            state.missing.push((*m).clone());
        }
    }
    for (fp, m) in &applied {
        if !expected_fps.contains(fp.as_str()) {
            state.unexpected.push((*m).clone());
        }
    }

    state.shared.sort_by_key(|m| m.id);
    state.missing.sort_by_key(|m| m.id);
    state.unexpected.sort_by_key(|m| m.id);
    state
}
