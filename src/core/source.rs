//! Expected migrations, read from a directory of `<digits>.<name>.sql` files.

use crate::core::error::TrudgeError;
use crate::core::migration::{self, FileName, Migration};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Minimum id width for files created by [`create_migration`].
const DEFAULT_ID_WIDTH: usize = 3;

/// Parse a single migration file. A name that does not match the
/// `<digits>.<name>.sql` shape is an error here.
pub fn load_file(path: &Path) -> Result<Migration, TrudgeError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(migration::parse_filename)
        .ok_or_else(|| TrudgeError::MalformedFilename {
            path: path.to_path_buf(),
        })?;
    parse_file(path, file_name)
}

fn parse_file(path: &Path, file_name: FileName) -> Result<Migration, TrudgeError> {
    let content = fs::read_to_string(path).map_err(TrudgeError::IoError)?;
    let (upgrade, downgrade) =
        migration::parse_content(&content).map_err(|e| TrudgeError::MalformedMigration {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(Migration {
        id: file_name.id,
        name: file_name.name,
        upgrade,
        downgrade,
    })
}

/// Candidate files in `dir`, sorted by file name. Files whose names do not
/// match are skipped. A missing directory has no candidates.
fn candidates(dir: &Path) -> Result<Vec<(PathBuf, FileName)>, TrudgeError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(TrudgeError::IoError)? {
        let entry = entry.map_err(TrudgeError::IoError)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(migration::parse_filename)
        else {
            continue;
        };
        out.push((path, file_name));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

/// Load every well-formed migration in `dir`.
///
/// Fails on the first malformed body, and fails with the complete list of
/// colliding ids when two files share an id. The result is unordered as far
/// as callers should be concerned.
pub fn load_directory(dir: &Path) -> Result<Vec<Migration>, TrudgeError> {
    let mut migrations = Vec::new();
    for (path, file_name) in candidates(dir)? {
        migrations.push(parse_file(&path, file_name)?);
    }

    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for m in &migrations {
        *counts.entry(m.id).or_default() += 1;
    }
    let duplicates: Vec<i64> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id)
        .collect();
    if !duplicates.is_empty() {
        return Err(TrudgeError::DuplicateId { ids: duplicates });
    }

    Ok(migrations)
}

/// Write `migration` into `dir` in the file format, padding its id to the
/// directory's widest id. Returns the file name. Never overwrites.
pub fn write_new_file(dir: &Path, migration: &Migration) -> Result<String, TrudgeError> {
    let existing = candidates(dir)?;
    let width = id_width(&existing);
    let file_name = migration::format_filename(
        &migration::pad_id(migration.id, width),
        migration.name.trim(),
    );
    let path = dir.join(&file_name);

    // The rendered name has to survive a directory scan.
    match migration::parse_filename(&file_name) {
        Some(parsed)
            if parsed.id == migration.id
                && parsed.name == migration.name.trim()
                && !parsed.name.contains(['/', '\\']) => {}
        _ => return Err(TrudgeError::MalformedFilename { path }),
    }

    fs::create_dir_all(dir).map_err(TrudgeError::IoError)?;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(TrudgeError::IoError)?;
    file.write_all(migration::render_content(&migration.upgrade, &migration.downgrade).as_bytes())
        .map_err(TrudgeError::IoError)?;
    Ok(file_name)
}

/// Create an empty migration template named after `name`, numbered one past
/// the highest id in `dir`. Returns the file name.
pub fn create_migration(dir: &Path, name: &str) -> Result<String, TrudgeError> {
    let slug = migration::slugify(name);
    let existing = candidates(dir)?;
    let highest = existing.iter().map(|(_, f)| f.id).max().unwrap_or(0);
    let Some(next_id) = highest.checked_add(1) else {
        return Err(TrudgeError::MalformedFilename {
            path: dir.join(migration::format_filename(&format!("{highest}+1"), &slug)),
        });
    };
    let file_name =
        migration::format_filename(&migration::pad_id(next_id, id_width(&existing)), &slug);
    let path = dir.join(&file_name);

    if slug.is_empty() || migration::parse_filename(&file_name).is_none() {
        return Err(TrudgeError::MalformedFilename { path });
    }

    fs::create_dir_all(dir).map_err(TrudgeError::IoError)?;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(TrudgeError::IoError)?;
    file.write_all(migration::render_content("", "").as_bytes())
        .map_err(TrudgeError::IoError)?;
    Ok(file_name)
}

fn id_width(existing: &[(PathBuf, FileName)]) -> usize {
    existing
        .iter()
        .map(|(_, f)| f.digits.len())
        .max()
        .unwrap_or(DEFAULT_ID_WIDTH)
        .max(DEFAULT_ID_WIDTH)
}
