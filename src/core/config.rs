//! `trudge.toml` configuration.
//!
//! Every key is optional. Relative paths are resolved against the directory
//! holding the config file.

use crate::core::error::TrudgeError;
use crate::core::ledger;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "trudge.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrudgeConfig {
    /// Directory of `<digits>.<name>.sql` files.
    pub directory: PathBuf,
    /// SQLite database file.
    pub database: PathBuf,
    /// Ledger table name.
    pub table: String,
    /// Optional JSON-lines event log.
    pub log_file: Option<PathBuf>,
    pub abort_on_unexpected: bool,
}

impl Default for TrudgeConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("migrations"),
            database: PathBuf::from("trudge.db"),
            table: ledger::DEFAULT_TABLE.to_string(),
            log_file: None,
            abort_on_unexpected: true,
        }
    }
}

impl TrudgeConfig {
    pub fn parse(content: &str) -> Result<Self, TrudgeError> {
        let config: TrudgeConfig =
            toml::from_str(content).map_err(|e| TrudgeError::ConfigError(e.to_string()))?;
        ledger::validate_table_name(&config.table)?;
        Ok(config)
    }

    fn resolve_against(mut self, base: &Path) -> Self {
        let join = |p: &Path| {
            if p.is_relative() {
                base.join(p)
            } else {
                p.to_path_buf()
            }
        };
        self.directory = join(&self.directory);
        self.database = join(&self.database);
        self.log_file = self.log_file.as_deref().map(join);
        self
    }
}

/// Load configuration.
///
/// With an explicit path the file must exist. Otherwise `trudge.toml` in
/// `working_dir` is used when present, and defaults when it is not.
pub fn load_config(
    explicit: Option<&Path>,
    working_dir: &Path,
) -> Result<TrudgeConfig, TrudgeError> {
    let path = match explicit {
        Some(p) => {
            if !p.exists() {
                return Err(TrudgeError::ConfigError(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            p.to_path_buf()
        }
        None => {
            let candidate = working_dir.join(CONFIG_FILE);
            if !candidate.exists() {
                return Ok(TrudgeConfig::default().resolve_against(working_dir));
            }
            candidate
        }
    };

    let content = fs::read_to_string(&path).map_err(TrudgeError::IoError)?;
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(working_dir);
    Ok(TrudgeConfig::parse(&content)?.resolve_against(base))
}
