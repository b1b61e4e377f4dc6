//! Applying one migration in one direction.
//!
//! The script and the ledger mutation share a transaction: either both land
//! or neither does.
//!
//! A non-forced upgrade records the ledger row *before* running the script.
//! Both happen in one transaction, so a failing script rolls the row back,
//! but a process killed between the two statements under a non-transactional
//! script (one that commits on its own) leaves a row for a schema change that
//! never happened. That ordering is kept deliberately; callers that need to
//! recover use a forced downgrade.

use crate::core::error::TrudgeError;
use crate::core::ledger;
use crate::core::migration::{Direction, Migration};
use crate::core::progress::{ProgressEvent, ProgressReporter};
use rusqlite::Connection;

/// Apply `migration` in `direction`. Returns whether the script ran.
///
/// Without `force`, the ledger decides: an upgrade only runs if its row was
/// newly inserted, a downgrade only if a row was deleted. With `force`, the
/// script always runs and the ledger is made to match afterwards.
pub fn apply(
    conn: &Connection,
    table: &str,
    migration: &Migration,
    direction: Direction,
    force: bool,
) -> Result<bool, TrudgeError> {
    let tx = conn.unchecked_transaction()?;

    let ran = match (direction, force) {
        (Direction::Upgrade, false) => {
            if ledger::insert(&tx, table, migration)? {
                run_script(&tx, migration, direction)?;
                true
            } else {
                false
            }
        }
        (Direction::Downgrade, false) => {
            if ledger::remove(&tx, table, migration.id)? {
                run_script(&tx, migration, direction)?;
                true
            } else {
                false
            }
        }
        (Direction::Upgrade, true) => {
            run_script(&tx, migration, direction)?;
            ledger::replace(&tx, table, migration)?;
            true
        }
        (Direction::Downgrade, true) => {
            run_script(&tx, migration, direction)?;
            ledger::remove(&tx, table, migration.id)?;
            true
        }
    };

    tx.commit()?;
    Ok(ran)
}

/// [`apply`], bracketed by progress events.
pub fn apply_reported(
    conn: &Connection,
    table: &str,
    migration: &Migration,
    direction: Direction,
    force: bool,
    reporter: &dyn ProgressReporter,
) -> Result<bool, TrudgeError> {
    reporter.report(&ProgressEvent::Applying {
        migration,
        direction,
        forced: force,
    });

    match apply(conn, table, migration, direction, force) {
        Ok(true) => {
            reporter.report(&ProgressEvent::Applied {
                migration,
                direction,
                forced: force,
            });
            Ok(true)
        }
        Ok(false) => {
            reporter.report(&ProgressEvent::Skipped {
                migration,
                direction,
            });
            Ok(false)
        }
        Err(error) => {
            reporter.report(&ProgressEvent::Failed {
                migration,
                direction,
                forced: force,
                error: &error,
            });
            Err(error)
        }
    }
}

fn run_script(
    conn: &Connection,
    migration: &Migration,
    direction: Direction,
) -> Result<(), TrudgeError> {
    conn.execute_batch(migration.script(direction))
        .map_err(|source| TrudgeError::ScriptExecutionFailure {
            id: migration.id,
            name: migration.name.clone(),
            direction,
            source,
        })
}
