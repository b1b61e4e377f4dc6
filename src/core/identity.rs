//! Canonical identity of a migration.
//!
//! Two migrations are the same migration only when their fingerprints match.
//! The digest covers every field, so an edited script under an old id is a
//! different migration.

use crate::core::migration::Migration;
use sha2::{Digest, Sha256};

/// Canonical byte form hashed by [`fingerprint`]. Outer whitespace of each
/// text field is insignificant.
pub fn canonical_text(migration: &Migration) -> String {
    format!(
        "id: {}\nname: {}\nupgrade: {}\ndowngrade: {}",
        migration.id,
        migration.name.trim(),
        migration.upgrade.trim(),
        migration.downgrade.trim()
    )
}

/// SHA-256 hex digest of [`canonical_text`].
pub fn fingerprint(migration: &Migration) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_text(migration).as_bytes());
    format!("{:x}", hasher.finalize())
}
