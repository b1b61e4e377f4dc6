//! The applied-migration ledger: one row per migration currently applied,
//! stored in a tracking table inside the migrated database itself.
//!
//! `insert`, `replace` and `remove` are only called by [`crate::core::apply`]
//! from inside the transaction that also runs the script.

use crate::core::error::TrudgeError;
use crate::core::migration::Migration;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::OnceLock;

pub const DEFAULT_TABLE: &str = "trudge_migrations";

fn table_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static table regex"))
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<(), TrudgeError> {
    if table_name_regex().is_match(table) {
        Ok(())
    } else {
        Err(TrudgeError::InvalidTableName(table.to_string()))
    }
}

/// Create the tracking table if it is absent, in its own transaction.
pub fn ensure_table(conn: &Connection, table: &str) -> Result<(), TrudgeError> {
    validate_table_name(table)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            upgrade TEXT NOT NULL,
            downgrade TEXT NOT NULL
        );"
    ))?;
    tx.commit()?;
    Ok(())
}

/// Every ledger row as a [`Migration`]. Row order carries no meaning.
pub fn read_all(conn: &Connection, table: &str) -> Result<Vec<Migration>, TrudgeError> {
    validate_table_name(table)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT id, name, upgrade, downgrade FROM \"{table}\""
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok(Migration {
            id: row.get(0)?,
            name: row.get(1)?,
            upgrade: row.get(2)?,
            downgrade: row.get(3)?,
        })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn find(conn: &Connection, table: &str, id: i64) -> Result<Option<Migration>, TrudgeError> {
    validate_table_name(table)?;
    let found = conn
        .query_row(
            &format!("SELECT id, name, upgrade, downgrade FROM \"{table}\" WHERE id = ?1"),
            params![id],
            |row| {
                Ok(Migration {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    upgrade: row.get(2)?,
                    downgrade: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(found)
}

/// Insert unless a row with this id already exists. Returns whether a row
/// was added.
pub fn insert(conn: &Connection, table: &str, migration: &Migration) -> Result<bool, TrudgeError> {
    validate_table_name(table)?;
    let changed = conn.execute(
        &format!(
            "INSERT OR IGNORE INTO \"{table}\" (id, name, upgrade, downgrade) VALUES (?1, ?2, ?3, ?4)"
        ),
        params![
            migration.id,
            migration.name,
            migration.upgrade,
            migration.downgrade
        ],
    )?;
    Ok(changed > 0)
}

/// Insert, overwriting any row with the same id.
pub fn replace(conn: &Connection, table: &str, migration: &Migration) -> Result<(), TrudgeError> {
    validate_table_name(table)?;
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO \"{table}\" (id, name, upgrade, downgrade) VALUES (?1, ?2, ?3, ?4)"
        ),
        params![
            migration.id,
            migration.name,
            migration.upgrade,
            migration.downgrade
        ],
    )?;
    Ok(())
}

/// Delete the row for `id`. Returns whether a row was deleted.
pub fn remove(conn: &Connection, table: &str, id: i64) -> Result<bool, TrudgeError> {
    validate_table_name(table)?;
    let changed = conn.execute(
        &format!("DELETE FROM \"{table}\" WHERE id = ?1"),
        params![id],
    )?;
    Ok(changed > 0)
}
