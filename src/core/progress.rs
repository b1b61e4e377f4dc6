//! Progress reporting.
//!
//! Reporters are called synchronously before and after every apply and on
//! failure. Nothing is buffered: a reporter sees each event as it happens.

use crate::core::error::TrudgeError;
use crate::core::migration::{Direction, Migration};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use ulid::Ulid;

#[derive(Debug, Clone)]
pub enum ProgressEvent<'a> {
    /// About to apply.
    Applying {
        migration: &'a Migration,
        direction: Direction,
        forced: bool,
    },
    /// The script ran and the ledger was updated.
    Applied {
        migration: &'a Migration,
        direction: Direction,
        forced: bool,
    },
    /// The ledger already reflected this direction; nothing ran.
    Skipped {
        migration: &'a Migration,
        direction: Direction,
    },
    /// The apply rolled back.
    Failed {
        migration: &'a Migration,
        direction: Direction,
        forced: bool,
        error: &'a TrudgeError,
    },
}

impl ProgressEvent<'_> {
    pub fn migration(&self) -> &Migration {
        match self {
            ProgressEvent::Applying { migration, .. }
            | ProgressEvent::Applied { migration, .. }
            | ProgressEvent::Skipped { migration, .. }
            | ProgressEvent::Failed { migration, .. } => migration,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            ProgressEvent::Applying { direction, .. }
            | ProgressEvent::Applied { direction, .. }
            | ProgressEvent::Skipped { direction, .. }
            | ProgressEvent::Failed { direction, .. } => *direction,
        }
    }

    pub fn forced(&self) -> bool {
        match self {
            ProgressEvent::Applying { forced, .. }
            | ProgressEvent::Applied { forced, .. }
            | ProgressEvent::Failed { forced, .. } => *forced,
            ProgressEvent::Skipped { .. } => false,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            ProgressEvent::Applying { .. } => "pending",
            ProgressEvent::Applied { .. } => "success",
            ProgressEvent::Skipped { .. } => "skipped",
            ProgressEvent::Failed { .. } => "error",
        }
    }
}

impl fmt::Display for ProgressEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.migration().label();
        let force = if self.forced() { " (forced)" } else { "" };
        match self {
            ProgressEvent::Applying { direction, .. } => {
                write!(f, "Applying {direction} {label}{force}")
            }
            ProgressEvent::Applied { direction, .. } => {
                write!(f, "Applied {direction} {label}{force}")
            }
            ProgressEvent::Skipped { direction, .. } => {
                write!(f, "Skipped {direction} {label}: ledger already up to date")
            }
            ProgressEvent::Failed {
                direction, error, ..
            } => write!(f, "Failed {direction} {label}{force}: {error}"),
        }
    }
}

pub trait ProgressReporter {
    fn report(&self, event: &ProgressEvent<'_>);
}

pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: &ProgressEvent<'_>) {}
}

/// Forwards each event to every inner reporter, in order.
pub struct Fanout<'a> {
    reporters: Vec<&'a dyn ProgressReporter>,
}

impl<'a> Fanout<'a> {
    pub fn new(reporters: Vec<&'a dyn ProgressReporter>) -> Self {
        Self { reporters }
    }
}

impl ProgressReporter for Fanout<'_> {
    fn report(&self, event: &ProgressEvent<'_>) {
        for r in &self.reporters {
            r.report(event);
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProgressRecord {
    pub ts: String,
    pub event_id: String,
    pub op: String,
    pub migration_id: i64,
    pub migration_name: String,
    pub direction: Direction,
    pub forced: bool,
    pub status: String,
    pub message: String,
}

impl ProgressRecord {
    pub fn from_event(event: &ProgressEvent<'_>) -> Self {
        let migration = event.migration();
        Self {
            ts: record_timestamp(),
            event_id: Ulid::new().to_string(),
            op: format!("migration.{}", event.direction()),
            migration_id: migration.id,
            migration_name: migration.name.clone(),
            direction: event.direction(),
            forced: event.forced(),
            status: event.status().to_string(),
            message: event.to_string(),
        }
    }
}

/// Seconds since the epoch, suffixed `Z`: `1771220592Z`.
fn record_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{secs}Z")
}

/// Append-only JSON-lines event log, one record per event.
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &ProgressRecord) -> Result<(), TrudgeError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(TrudgeError::IoError)?;
            }
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(TrudgeError::IoError)?;
        writeln!(f, "{}", serde_json::to_string(record)?).map_err(TrudgeError::IoError)?;
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<ProgressRecord>, TrudgeError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(TrudgeError::IoError)?;
        let mut out = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            out.push(serde_json::from_str(line)?);
        }
        Ok(out)
    }
}

impl ProgressReporter for EventLog {
    fn report(&self, event: &ProgressEvent<'_>) {
        // A broken log must not abort a migration that already committed.
        if let Err(e) = self.append(&ProgressRecord::from_event(event)) {
            eprintln!("warning: could not write {}: {}", self.path.display(), e);
        }
    }
}
