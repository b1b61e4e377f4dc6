//! Synchronizer: converge the ledger (and schema) on the expected set.
//!
//! One run moves through fixed stages:
//!
//! 1. **Load** expected and applied sets, compute `before`.
//! 2. **Abort** with no changes if anything is unexpected and the options say so.
//! 3. **Downgrade unexpected**, highest id first.
//! 4. **Upgrade missing**, lowest id first.
//! 5. **Rerun latest** (forced upgrade of the newest shared migration) when the
//!    database was already synchronized and the options ask for it.
//! 6. **Summarize**: re-read the ledger and compute `after`.
//!
//! Each apply commits on its own. A failing apply stops the run and leaves
//! earlier changes in place.

use crate::core::apply;
use crate::core::compare::{MigrationState, compare};
use crate::core::error::TrudgeError;
use crate::core::ledger;
use crate::core::migration::{Direction, Migration};
use crate::core::progress::{NoopReporter, ProgressReporter};
use crate::core::source;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Approval callback consulted before each change; `false` skips it.
pub type Veto<'a> = &'a dyn Fn(&Migration) -> bool;

pub struct SyncOptions<'a> {
    /// Stop before touching anything when applied migrations are unknown to
    /// the directory.
    pub abort_on_unexpected: bool,
    pub downgrade_veto: Option<Veto<'a>>,
    pub upgrade_veto: Option<Veto<'a>>,
    /// Force the newest shared migration's upgrade again when there is
    /// nothing else to do.
    pub rerun_latest_if_synchronized: bool,
    pub reporter: &'a dyn ProgressReporter,
}

impl Default for SyncOptions<'_> {
    fn default() -> Self {
        Self {
            abort_on_unexpected: true,
            downgrade_veto: None,
            upgrade_veto: None,
            rerun_latest_if_synchronized: false,
            reporter: &NoopReporter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub migration: Migration,
    pub direction: Direction,
    pub forced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynchronizeState {
    pub before: MigrationState,
    pub after: MigrationState,
    /// Changes that actually ran, in the order they ran.
    pub changes: Vec<Change>,
    /// The run stopped at the abort stage because of unexpected migrations.
    pub aborted: bool,
}

/// Synchronize `conn` with the migrations in `dir`.
pub fn synchronize(
    conn: &Connection,
    dir: &Path,
    table: &str,
    options: &SyncOptions<'_>,
) -> Result<SynchronizeState, TrudgeError> {
    let expected = source::load_directory(dir)?;
    synchronize_with(conn, &expected, table, options)
}

/// Synchronize `conn` with an already-loaded expected set.
pub fn synchronize_with(
    conn: &Connection,
    expected: &[Migration],
    table: &str,
    options: &SyncOptions<'_>,
) -> Result<SynchronizeState, TrudgeError> {
    ledger::ensure_table(conn, table)?;
    let before = compare(expected, &ledger::read_all(conn, table)?);

    if !before.unexpected.is_empty() && options.abort_on_unexpected {
        return summarize(conn, expected, table, before, Vec::new(), true);
    }

    let mut changes = Vec::new();

    for migration in before.unexpected.iter().rev() {
        if approved(options.downgrade_veto, migration)
            && apply::apply_reported(
                conn,
                table,
                migration,
                Direction::Downgrade,
                false,
                options.reporter,
            )?
        {
            changes.push(Change {
                migration: migration.clone(),
                direction: Direction::Downgrade,
                forced: false,
            });
        }
    }

    for migration in &before.missing {
        if approved(options.upgrade_veto, migration)
            && apply::apply_reported(
                conn,
                table,
                migration,
                Direction::Upgrade,
                false,
                options.reporter,
            )?
        {
            changes.push(Change {
                migration: migration.clone(),
                direction: Direction::Upgrade,
                forced: false,
            });
        }
    }

    if options.rerun_latest_if_synchronized && before.is_synchronized() {
        if let Some(latest) = before.latest_shared() {
            if approved(options.upgrade_veto, latest)
                && apply::apply_reported(
                    conn,
                    table,
                    latest,
                    Direction::Upgrade,
                    true,
                    options.reporter,
                )?
            {
                changes.push(Change {
                    migration: latest.clone(),
                    direction: Direction::Upgrade,
                    forced: true,
                });
            }
        }
    }

    summarize(conn, expected, table, before, changes, false)
}

/// Current diff without changing anything but the (lazily created) ledger table.
pub fn status(
    conn: &Connection,
    expected: &[Migration],
    table: &str,
) -> Result<MigrationState, TrudgeError> {
    ledger::ensure_table(conn, table)?;
    Ok(compare(expected, &ledger::read_all(conn, table)?))
}

fn approved(veto: Option<Veto<'_>>, migration: &Migration) -> bool {
    veto.is_none_or(|approve| approve(migration))
}

fn summarize(
    conn: &Connection,
    expected: &[Migration],
    table: &str,
    before: MigrationState,
    changes: Vec<Change>,
    aborted: bool,
) -> Result<SynchronizeState, TrudgeError> {
    let after = compare(expected, &ledger::read_all(conn, table)?);
    Ok(SynchronizeState {
        before,
        after,
        changes,
        aborted,
    })
}
