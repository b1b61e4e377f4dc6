//! Connection boundary.
//!
//! The engine only ever issues statements against a `&Connection` it is handed.
//! Opening and closing the database belongs to the caller; this module is the
//! one place the CLI does that.

use crate::core::error::TrudgeError;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT_SECS: u64 = 5;

pub fn db_connect(db_path: &Path) -> Result<Connection, TrudgeError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(TrudgeError::IoError)?;
        }
    }
    let conn = Connection::open(db_path)?;
    configure(&conn)?;
    Ok(conn)
}

/// In-memory database with the same pragmas as [`db_connect`].
pub fn db_connect_in_memory() -> Result<Connection, TrudgeError> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<(), TrudgeError> {
    conn.busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))
        .map_err(TrudgeError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(TrudgeError::RusqliteError)?;
    Ok(())
}

/// True when a table (or view) with this exact name exists.
pub fn table_exists(conn: &Connection, name: &str) -> Result<bool, TrudgeError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
