use crate::core::migration::Direction;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrudgeError {
    #[error("Malformed migration filename: {} (expected <digits>.<name>.sql)", path.display())]
    MalformedFilename { path: PathBuf },
    #[error("Malformed migration {}: {reason}", path.display())]
    MalformedMigration { path: PathBuf, reason: String },
    #[error("Duplicate migration ids: {}", format_ids(ids))]
    DuplicateId { ids: Vec<i64> },
    #[error("Migration {id}.{name} failed during {direction}: {source}")]
    ScriptExecutionFailure {
        id: i64,
        name: String,
        direction: Direction,
        #[source]
        source: rusqlite::Error,
    },
    #[error("Invalid ledger table name: {0}")]
    InvalidTableName(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

fn format_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
