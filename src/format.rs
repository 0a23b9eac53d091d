//! Text rendering shared by the agents and the dictionary preview.
//!
//! Query results are rendered as ASCII tables in the style of the MySQL CLI.

use serde_json::{Map, Value as JsonValue};
use unicode_width::UnicodeWidthStr;

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(arr) => serde_json::to_string(arr).unwrap_or_default(),
        JsonValue::Object(obj) => serde_json::to_string(obj).unwrap_or_default(),
    }
}

/// Render rows as an ASCII table.
///
/// Numbers are right-aligned. The footer reports `total_rows`, which may be
/// larger than `rows.len()` when the caller shows a prefix.
pub fn format_as_table(
    columns: &[String],
    rows: &[Map<String, JsonValue>],
    total_rows: usize,
    execution_time_ms: u64,
) -> String {
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in rows {
        for (i, col) in columns.iter().enumerate() {
            if let Some(value) = row.get(col) {
                widths[i] = widths[i].max(format_value(value).width());
            }
        }
    }

    let mut output = String::new();
    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(col, w)| pad_center(col, *w))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for row in rows {
        let line: String = columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| {
                let value = row.get(col).unwrap_or(&JsonValue::Null);
                let formatted = format_value(value);
                if value.is_number() {
                    pad_right_aligned(&formatted, *w)
                } else {
                    pad_left_aligned(&formatted, *w)
                }
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&separator);

    let row_text = if total_rows == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        total_rows,
        row_text,
        execution_time_ms as f64 / 1000.0
    ));

    output
}

// `format!` width specifiers count chars, not display columns.
fn pad_left_aligned(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("| {}{} ", text, " ".repeat(fill))
}

fn pad_right_aligned(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("| {}{} ", " ".repeat(fill), text)
}

fn pad_center(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    let left = fill / 2;
    format!("| {}{}{} ", " ".repeat(left), text, " ".repeat(fill - left))
}

/// Cut `text` to `max` chars, marking the cut with "...".
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut s: String = text.chars().take(max).collect();
        s.push_str("...");
        s
    }
}

/// "a, b, c" for the first `limit` names, then "and N more".
pub fn list_with_overflow(names: &[String], limit: usize) -> String {
    let shown = names.iter().take(limit).cloned().collect::<Vec<_>>().join(", ");
    if names.len() > limit {
        format!("{} ... and {} more", shown, names.len() - limit)
    } else {
        shown
    }
}
