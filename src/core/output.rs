//! Compact output rendering helpers for CLI surfaces.

use crate::core::compare::MigrationState;
use crate::core::migration::Migration;

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Width of the widest id in `migrations`, for aligned listings.
pub fn id_width(migrations: &[&Migration]) -> usize {
    migrations
        .iter()
        .map(|m| m.id.to_string().len())
        .max()
        .unwrap_or(1)
}

/// One line per migration: `<id> <name>  <upgrade preview>`.
pub fn migration_lines(migrations: &[Migration], width: usize, max_chars: usize) -> Vec<String> {
    migrations
        .iter()
        .map(|m| {
            format!(
                "{:>width$} {}  {}",
                m.id,
                m.name,
                compact_line(&m.upgrade, max_chars),
                width = width
            )
        })
        .collect()
}

/// `N shared, N missing, N unexpected`.
pub fn state_summary(state: &MigrationState) -> String {
    format!(
        "{} shared, {} missing, {} unexpected",
        state.shared.len(),
        state.missing.len(),
        state.unexpected.len()
    )
}
