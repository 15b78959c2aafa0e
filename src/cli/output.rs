//! Output formatting for CLI commands (JSON or table).

use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

/// Print data as pretty JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Truncate string to maximum length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Print a table header followed by a separator
pub fn print_table_header(columns: &[(&str, usize)]) {
    let mut header = String::new();
    let mut width = 0;
    for (name, column_width) in columns {
        header.push_str(&format!("{:<width$} ", name, width = *column_width));
        width += column_width + 1;
    }
    println!("{}", header.trim_end());
    println!("{}", "-".repeat(width.saturating_sub(1)));
}

/// Print one row using the widths of [`print_table_header`]
pub fn print_table_row(cells: &[(&str, usize)]) {
    let mut row = String::new();
    for (value, column_width) in cells {
        row.push_str(&format!("{:<width$} ", truncate(value, *column_width), width = *column_width));
    }
    println!("{}", row.trim_end());
}
