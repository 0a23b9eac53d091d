//! Schema dictionaries.
//!
//! A dictionary is a free-form JSON document describing tables and columns
//! in business terms. Documents are persisted through a [`DictionaryStore`]
//! and carried in the session to enrich SQL generation.
//!
//! The expected shape is:
//!
//! ```text
//! { database, schema, generated_at,
//!   tables: { <name>: { name, description, columns: [...], row_count, tags } },
//!   relationships: [], business_rules: [] }
//! ```
//!
//! Loaded documents may also carry `tables` as an array of named objects.

mod store;

pub use store::{DictionaryFormat, FileDictionaryStore};

use crate::error::AppResult;
use crate::format::truncate_chars;
use crate::models::{ColumnDescriptor, TableMetadata};
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeSet;
use std::fmt::Write;
use std::path::PathBuf;

/// Tables shown by [`render_preview`].
pub const PREVIEW_TABLES: usize = 5;
/// Columns shown per table by [`render_preview`].
pub const PREVIEW_COLUMNS: usize = 3;
const PREVIEW_DESCRIPTION_CHARS: usize = 100;

/// Where a document was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDictionary {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Persistence for dictionary documents.
#[async_trait]
pub trait DictionaryStore: Send + Sync {
    async fn read(&self, name: &str) -> AppResult<JsonValue>;

    async fn write(&self, name: &str, document: &JsonValue) -> AppResult<StoredDictionary>;

    /// Candidate dictionary files, for prompting the user.
    async fn list(&self) -> AppResult<Vec<String>>;
}

/// A document is usable when it is an object with `tables` or `schema`.
pub fn is_valid_dictionary(document: &JsonValue) -> bool {
    document
        .as_object()
        .is_some_and(|o| o.contains_key("tables") || o.contains_key("schema"))
}

/// Iterate `(name, entry)` over a `tables` section in either shape.
fn table_entries(document: &JsonValue) -> Vec<(String, &JsonValue)> {
    match document.get("tables") {
        Some(JsonValue::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(|item| {
                item.get("name")
                    .and_then(JsonValue::as_str)
                    .map(|name| (name.to_string(), item))
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Mutable `(name, entry)` pairs over a `tables` section in either shape.
pub fn table_entries_mut(document: &mut JsonValue) -> Vec<(String, &mut JsonValue)> {
    match document.get_mut("tables") {
        Some(JsonValue::Object(map)) => map.iter_mut().map(|(k, v)| (k.clone(), v)).collect(),
        Some(JsonValue::Array(items)) => items
            .iter_mut()
            .filter_map(|item| {
                let name = item.get("name").and_then(JsonValue::as_str)?.to_string();
                Some((name, item))
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Names of the tables a document describes.
pub fn dictionary_table_names(document: &JsonValue) -> BTreeSet<String> {
    table_entries(document).into_iter().map(|(name, _)| name).collect()
}

/// Rebuild table snapshots from a loaded document.
///
/// Returns `None` when the document has no usable `tables` section.
pub fn tables_from_dictionary(
    document: &JsonValue,
    default_catalog: &str,
    default_schema: &str,
) -> Option<Vec<TableMetadata>> {
    let entries = table_entries(document);
    if entries.is_empty() {
        return None;
    }
    let catalog = document
        .get("database")
        .and_then(JsonValue::as_str)
        .unwrap_or(default_catalog);
    let schema = document
        .get("schema")
        .and_then(JsonValue::as_str)
        .unwrap_or(default_schema);

    let tables = entries
        .into_iter()
        .map(|(name, entry)| {
            let columns = entry
                .get("columns")
                .and_then(JsonValue::as_array)
                .map(|cols| {
                    cols.iter()
                        .filter_map(|c| serde_json::from_value::<ColumnDescriptor>(c.clone()).ok())
                        .collect()
                })
                .unwrap_or_default();
            let mut table = TableMetadata::new(name, catalog, schema).with_columns(columns);
            if let Some(desc) = entry.get("description").and_then(JsonValue::as_str) {
                table = table.with_description(desc);
            }
            if let Some(count) = entry.get("row_count").and_then(JsonValue::as_u64) {
                table = table.with_row_count(count);
            }
            table
        })
        .collect();
    Some(tables)
}

/// Empty document for a catalog and schema.
pub fn new_dictionary(database: &str, schema: &str) -> JsonValue {
    json!({
        "database": database,
        "schema": schema,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "tables": {},
        "relationships": [],
        "business_rules": [],
    })
}

/// Dictionary entry for one table.
pub fn table_entry(table: &TableMetadata) -> JsonValue {
    json!({
        "name": table.name,
        "description": table.description.clone().unwrap_or_default(),
        "columns": table.columns,
        "row_count": table.row_count,
        "tags": table.tags,
    })
}

/// Mutable access to the `tables` object of a document, if it has one.
pub fn tables_mut(document: &mut JsonValue) -> Option<&mut Map<String, JsonValue>> {
    document.get_mut("tables").and_then(JsonValue::as_object_mut)
}

fn field<'a>(value: &'a JsonValue, key: &str) -> &'a str {
    value.get(key).and_then(JsonValue::as_str).unwrap_or("Unknown")
}

fn section_len(document: &JsonValue, key: &str) -> Option<usize> {
    match document.get(key)? {
        JsonValue::Array(a) => Some(a.len()),
        JsonValue::Object(o) => Some(o.len()),
        _ => Some(0),
    }
}

/// Bounded, human-readable summary of a document.
pub fn render_preview(document: &JsonValue) -> String {
    let mut out = String::from("Data Dictionary Preview:\n\n");
    let _ = writeln!(out, "Database: {}", field(document, "database"));
    let _ = writeln!(out, "Schema: {}", field(document, "schema"));
    let _ = writeln!(out, "Generated: {}", field(document, "generated_at"));

    let entries = table_entries(document);
    let _ = writeln!(out, "\nTables ({}):", entries.len());
    for (name, entry) in entries.iter().take(PREVIEW_TABLES) {
        let _ = writeln!(out, "\n- {}", name);
        if let Some(desc) = entry
            .get("description")
            .and_then(JsonValue::as_str)
            .filter(|d| !d.is_empty())
        {
            let _ = writeln!(
                out,
                "  Description: {}",
                truncate_chars(desc, PREVIEW_DESCRIPTION_CHARS)
            );
        }
        let columns = entry
            .get("columns")
            .and_then(JsonValue::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let _ = writeln!(out, "  Columns: {}", columns.len());
        for col in columns.iter().take(PREVIEW_COLUMNS) {
            let _ = writeln!(out, "    - {} ({})", field(col, "name"), field(col, "type"));
        }
        if columns.len() > PREVIEW_COLUMNS {
            let _ = writeln!(
                out,
                "    ... and {} more columns",
                columns.len() - PREVIEW_COLUMNS
            );
        }
    }
    if entries.len() > PREVIEW_TABLES {
        let _ = writeln!(out, "\n... and {} more tables", entries.len() - PREVIEW_TABLES);
    }

    if let Some(n) = section_len(document, "relationships") {
        let _ = writeln!(out, "\nRelationships: {}", n);
    }
    if let Some(n) = section_len(document, "business_rules") {
        let _ = writeln!(out, "Business Rules: {}", n);
    }
    out
}
