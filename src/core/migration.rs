//! Migration data model and the on-disk file format.
//!
//! A migration file is named `<digits>.<name>.sql` and holds two sections:
//!
//! ```text
//! --trudge:upgrade
//! CREATE TABLE users (id INTEGER PRIMARY KEY);
//! --trudge:downgrade
//! DROP TABLE users;
//! ```
//!
//! Comment lines (`--...`) are dropped from both sections before trimming, so
//! the markers themselves never reach the stored script text.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

pub const UPGRADE_MARKER: &str = "--trudge:upgrade";
pub const DOWNGRADE_MARKER: &str = "--trudge:downgrade";

/// A numbered, named pair of upgrade/downgrade scripts.
///
/// Equality is field-wise; the engine matches expected against applied
/// migrations by [`crate::core::identity::fingerprint`], not by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    pub id: i64,
    pub name: String,
    pub upgrade: String,
    pub downgrade: String,
}

impl Migration {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        upgrade: impl Into<String>,
        downgrade: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            upgrade: upgrade.into(),
            downgrade: downgrade.into(),
        }
    }

    pub fn script(&self, direction: Direction) -> &str {
        match direction {
            Direction::Upgrade => &self.upgrade,
            Direction::Downgrade => &self.downgrade,
        }
    }

    /// `<id>.<name>`, as used in progress messages.
    pub fn label(&self) -> String {
        format!("{}.{}", self.id, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upgrade,
    Downgrade,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upgrade => "upgrade",
            Direction::Downgrade => "downgrade",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Id and name split out of a migration file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileName {
    pub id: i64,
    /// The digits exactly as written, leading zeros included.
    pub digits: String,
    pub name: String,
}

fn filename_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\.(.+?)\.sql$").expect("static filename regex"))
}

fn downgrade_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^[ \t]*--trudge:downgrade[ \t]*\r?$").expect("static marker regex")
    })
}

/// Parse `<digits>.<name>.sql`. Returns `None` for anything else, including
/// an id of zero or one that does not fit in an `i64`.
pub fn parse_filename(file_name: &str) -> Option<FileName> {
    let caps = filename_regex().captures(file_name)?;
    let digits = caps.get(1)?.as_str();
    let name = caps.get(2)?.as_str();
    let id = digits.parse::<i64>().ok().filter(|id| *id > 0)?;
    Some(FileName {
        id,
        digits: digits.to_string(),
        name: name.to_string(),
    })
}

pub fn format_filename(digits: &str, name: &str) -> String {
    format!("{}.{}.sql", digits, name)
}

/// Zero-pad `id` to at least `width` digits.
pub fn pad_id(id: i64, width: usize) -> String {
    format!("{:0width$}", id, width = width)
}

/// Why a file body could not be split into sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    MissingDowngradeMarker,
    EmptyUpgrade,
    EmptyDowngrade,
}

impl fmt::Display for ContentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentError::MissingDowngradeMarker => {
                write!(f, "missing `{}` marker line", DOWNGRADE_MARKER)
            }
            ContentError::EmptyUpgrade => f.write_str("upgrade section is empty"),
            ContentError::EmptyDowngrade => f.write_str("downgrade section is empty"),
        }
    }
}

/// Split a file body into `(upgrade, downgrade)` scripts.
pub fn parse_content(content: &str) -> Result<(String, String), ContentError> {
    let marker = downgrade_marker_regex()
        .find(content)
        .ok_or(ContentError::MissingDowngradeMarker)?;

    let upgrade = strip_comments(&content[..marker.start()]);
    let downgrade = strip_comments(&content[marker.end()..]);

    if upgrade.is_empty() {
        return Err(ContentError::EmptyUpgrade);
    }
    if downgrade.is_empty() {
        return Err(ContentError::EmptyDowngrade);
    }
    Ok((upgrade, downgrade))
}

fn strip_comments(section: &str) -> String {
    section
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Render scripts back into the file format.
pub fn render_content(upgrade: &str, downgrade: &str) -> String {
    let mut out = String::new();
    out.push_str(UPGRADE_MARKER);
    out.push('\n');
    if !upgrade.trim().is_empty() {
        out.push_str(upgrade.trim());
        out.push('\n');
    }
    out.push_str(DOWNGRADE_MARKER);
    out.push('\n');
    if !downgrade.trim().is_empty() {
        out.push_str(downgrade.trim());
        out.push('\n');
    }
    out
}

/// Lowercase slug suitable for the name part of a file name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
