//! Trudge: migration-state reconciliation for SQLite
//!
//! Trudge keeps a SQLite database in agreement with a directory of numbered,
//! paired upgrade/downgrade SQL scripts.
//!
//! # Core Principles
//!
//! - **Content identity**: a migration is identified by a SHA-256 fingerprint
//!   of its id, name and both scripts, never by id alone
//! - **Three-way diff**: expected (files) vs applied (ledger) yields shared,
//!   missing and unexpected migrations
//! - **Atomic applies**: each script runs in one transaction with its ledger
//!   row
//! - **Safety first**: unexpected applied migrations abort a sync unless the
//!   operator opts in
//!
//! # Migration files
//!
//! ```text
//! migrations/001.init.sql
//!
//! --trudge:upgrade
//! CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL);
//! --trudge:downgrade
//! DROP TABLE users;
//! ```
//!
//! # Examples
//!
//! ```bash
//! trudge new "add users"
//! trudge status
//! trudge sync
//! trudge sync --allow-unexpected --rerun-latest
//! trudge downgrade 3 --force
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: the engine (source, ledger, identity, comparator, applicator,
//!   synchronizer) plus configuration and progress reporting

pub mod core;
mod cli;

use crate::core::{
    apply,
    compare::MigrationState,
    config, db,
    error::TrudgeError,
    ledger,
    migration::{Direction, Migration},
    output,
    progress::{EventLog, Fanout, ProgressEvent, ProgressReporter},
    source,
    sync::{self, SyncOptions, SynchronizeState},
};
use clap::Parser;
use cli::{ApplyCli, Cli, Command, GlobalArgs, SyncCli};
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;

/// Exit code for a sync that stopped on unexpected migrations.
pub const EXIT_UNEXPECTED_ABORT: u8 = 2;

const PREVIEW_CHARS: usize = 60;

/// Prints each progress event to stderr.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn report(&self, event: &ProgressEvent<'_>) {
        let line = event.to_string();
        let styled = match event {
            ProgressEvent::Applying { .. } => format!("{} {}", "▸".bright_cyan(), line.dimmed()),
            ProgressEvent::Applied { .. } => format!("{} {}", "✓".bright_green(), line),
            ProgressEvent::Skipped { .. } => format!("{} {}", "·".yellow(), line.yellow()),
            ProgressEvent::Failed { .. } => format!("{} {}", "✗".bright_red(), line.red()),
        };
        eprintln!("  {}", styled);
    }
}

struct Context {
    config: config::TrudgeConfig,
    quiet: bool,
}

impl Context {
    fn from_args(global: &GlobalArgs) -> Result<Self, TrudgeError> {
        let cwd = std::env::current_dir().map_err(TrudgeError::IoError)?;
        let mut config = config::load_config(global.config.as_deref(), &cwd)?;
        if let Some(dir) = &global.directory {
            config.directory = dir.clone();
        }
        if let Some(database) = &global.database {
            config.database = database.clone();
        }
        if let Some(table) = &global.table {
            ledger::validate_table_name(table)?;
            config.table = table.clone();
        }
        if let Some(log_file) = &global.log_file {
            config.log_file = Some(log_file.clone());
        }
        Ok(Self {
            config,
            quiet: global.quiet,
        })
    }

    /// Console and event-log reporters as configured, wrapped in a fanout.
    fn with_reporter<R>(&self, f: impl FnOnce(&dyn ProgressReporter) -> R) -> R {
        let console = ConsoleReporter;
        let log = self.config.log_file.as_deref().map(EventLog::new);
        let mut reporters: Vec<&dyn ProgressReporter> = Vec::new();
        if !self.quiet {
            reporters.push(&console);
        }
        if let Some(log) = &log {
            reporters.push(log);
        }
        f(&Fanout::new(reporters))
    }
}

pub fn run() -> Result<ExitCode, TrudgeError> {
    let cli = Cli::parse();
    let ctx = Context::from_args(&cli.global)?;

    match cli.command {
        Command::New { name } => {
            let file_name = source::create_migration(&ctx.config.directory, &name)?;
            println!("{}", ctx.config.directory.join(file_name).display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Status(args) => {
            let expected = source::load_directory(&ctx.config.directory)?;
            let conn = db::db_connect(&ctx.config.database)?;
            let state = sync::status(&conn, &expected, &ctx.config.table)?;
            if args.format == "json" {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                print_status(&ctx, &state);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Sync(args) => run_sync(&ctx, &args),
        Command::Upgrade(args) => run_single(&ctx, &args, Direction::Upgrade),
        Command::Downgrade(args) => run_single(&ctx, &args, Direction::Downgrade),
    }
}

fn run_sync(ctx: &Context, args: &SyncCli) -> Result<ExitCode, TrudgeError> {
    let expected = source::load_directory(&ctx.config.directory)?;
    let conn = db::db_connect(&ctx.config.database)?;

    let ask_downgrade = |m: &Migration| confirm(&format!("Downgrade {}?", m.label()));
    let ask_upgrade = |m: &Migration| confirm(&format!("Upgrade {}?", m.label()));

    let state = ctx.with_reporter(|reporter| {
        let options = SyncOptions {
            abort_on_unexpected: ctx.config.abort_on_unexpected && !args.allow_unexpected,
            downgrade_veto: args.interactive.then_some(&ask_downgrade as sync::Veto),
            upgrade_veto: args.interactive.then_some(&ask_upgrade as sync::Veto),
            rerun_latest_if_synchronized: args.rerun_latest,
            reporter,
        };
        sync::synchronize_with(&conn, &expected, &ctx.config.table, &options)
    })?;

    if args.output.format == "json" {
        println!("{}", serde_json::to_string_pretty(&state)?);
    } else {
        print_sync(&state);
    }

    if state.aborted {
        Ok(ExitCode::from(EXIT_UNEXPECTED_ABORT))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn run_single(
    ctx: &Context,
    args: &ApplyCli,
    direction: Direction,
) -> Result<ExitCode, TrudgeError> {
    // An upgrade reads the directory before the database is opened.
    let from_directory = match direction {
        Direction::Upgrade => Some(find_in_directory(&ctx.config.directory, args.id)?),
        Direction::Downgrade => None,
    };

    let conn = db::db_connect(&ctx.config.database)?;
    ledger::ensure_table(&conn, &ctx.config.table)?;

    // A downgrade prefers the applied copy so a deleted file can still be undone.
    let migration = match from_directory {
        Some(m) => m,
        None => match ledger::find(&conn, &ctx.config.table, args.id)? {
            Some(m) => m,
            None => find_in_directory(&ctx.config.directory, args.id)?,
        },
    };

    let ran = ctx.with_reporter(|reporter| {
        apply::apply_reported(
            &conn,
            &ctx.config.table,
            &migration,
            direction,
            args.force,
            reporter,
        )
    })?;

    if ran {
        println!("{} {} {}", "✓".bright_green(), direction, migration.label());
    } else {
        println!(
            "{} {} {} not needed (use --force to run anyway)",
            "·".yellow(),
            direction,
            migration.label()
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn find_in_directory(dir: &Path, id: i64) -> Result<Migration, TrudgeError> {
    source::load_directory(dir)?
        .into_iter()
        .find(|m| m.id == id)
        .ok_or_else(|| TrudgeError::NotFound(format!("migration {} in {}", id, dir.display())))
}

/// Prompt on stderr, read a y/N answer from stdin. Anything but yes declines.
fn confirm(prompt: &str) -> bool {
    ask(prompt, io::stdin().lock(), io::stderr())
}

fn ask(prompt: &str, mut input: impl BufRead, mut out: impl Write) -> bool {
    if write!(out, "{} [y/N] ", prompt).and_then(|_| out.flush()).is_err() {
        return false;
    }
    let mut answer = String::new();
    if input.read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_status(ctx: &Context, state: &MigrationState) {
    println!(
        "{} {} ({})",
        "Database:".bold(),
        ctx.config.database.display(),
        ctx.config.table
    );
    println!(
        "{} {}",
        "Directory:".bold(),
        ctx.config.directory.display()
    );
    println!();

    let all: Vec<&Migration> = state
        .shared
        .iter()
        .chain(&state.missing)
        .chain(&state.unexpected)
        .collect();
    let width = output::id_width(&all);

    let sections = [
        ("Shared", &state.shared, "green"),
        ("Missing", &state.missing, "yellow"),
        ("Unexpected", &state.unexpected, "red"),
    ];
    for (title, list, color) in sections {
        println!("{}", format!("{} ({})", title, list.len()).color(color).bold());
        for line in output::migration_lines(list, width, PREVIEW_CHARS) {
            println!("  {}", line);
        }
    }
}

fn print_sync(state: &SynchronizeState) {
    if state.aborted {
        eprintln!(
            "{} {} unexpected migration(s) applied; nothing changed. Re-run with --allow-unexpected to downgrade them.",
            "✗".bright_red(),
            state.before.unexpected.len()
        );
        for m in &state.before.unexpected {
            eprintln!("    {}", m.label().red());
        }
        return;
    }

    if state.changes.is_empty() {
        println!("{} Already synchronized", "✓".bright_green());
    } else {
        for change in &state.changes {
            let arrow = match change.direction {
                Direction::Upgrade => "↑".bright_green(),
                Direction::Downgrade => "↓".bright_yellow(),
            };
            let forced = if change.forced { " (forced)" } else { "" };
            println!(
                "{} {} {}{}",
                arrow,
                change.direction,
                change.migration.label(),
                forced
            );
        }
    }
    println!(
        "  before: {}\n  after:  {}",
        output::state_summary(&state.before),
        output::state_summary(&state.after)
    );
}
