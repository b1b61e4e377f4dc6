//! CLI struct definitions for the trudge command-line interface.
//!
//! All clap-derived types live here. Dispatch logic lives in `lib.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "trudge",
    version = env!("CARGO_PKG_VERSION"),
    about = "Reconcile a directory of versioned SQL migrations with a SQLite database."
)]
pub(crate) struct Cli {
    #[clap(flatten)]
    pub global: GlobalArgs,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug)]
pub(crate) struct GlobalArgs {
    /// Config file (defaults to ./trudge.toml when present).
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory of `<digits>.<name>.sql` migration files.
    #[clap(short, long, global = true)]
    pub directory: Option<PathBuf>,
    /// SQLite database file.
    #[clap(long, global = true)]
    pub database: Option<PathBuf>,
    /// Ledger table name.
    #[clap(long, global = true)]
    pub table: Option<String>,
    /// Append a JSON-lines record of every apply to this file.
    #[clap(long, global = true)]
    pub log_file: Option<PathBuf>,
    /// Suppress per-migration progress lines.
    #[clap(short, long, global = true)]
    pub quiet: bool,
}

#[derive(clap::Args, Debug)]
pub(crate) struct FormatArgs {
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
}

#[derive(clap::Args, Debug)]
pub(crate) struct SyncCli {
    /// Downgrade applied migrations that are no longer in the directory
    /// instead of aborting.
    #[clap(long)]
    pub allow_unexpected: bool,
    /// When already synchronized, force the latest migration's upgrade again.
    #[clap(long)]
    pub rerun_latest: bool,
    /// Ask before each downgrade and upgrade.
    #[clap(short, long)]
    pub interactive: bool,
    #[clap(flatten)]
    pub output: FormatArgs,
}

#[derive(clap::Args, Debug)]
pub(crate) struct ApplyCli {
    /// Migration id.
    pub id: i64,
    /// Run the script regardless of the ledger, then make the ledger match.
    #[clap(long)]
    pub force: bool,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create an empty migration file numbered after the latest one
    #[clap(name = "new", visible_alias = "n")]
    New {
        /// Descriptive name, slugified into the file name.
        name: String,
    },

    /// Show shared, missing and unexpected migrations
    #[clap(name = "status", visible_alias = "s")]
    Status(FormatArgs),

    /// Apply every downgrade and upgrade needed to match the directory
    #[clap(name = "sync")]
    Sync(SyncCli),

    /// Apply a single migration's upgrade
    #[clap(name = "upgrade", visible_alias = "up")]
    Upgrade(ApplyCli),

    /// Apply a single migration's downgrade
    #[clap(name = "downgrade", visible_alias = "down")]
    Downgrade(ApplyCli),
}
