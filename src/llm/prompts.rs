//! Prompt construction for the chat-completions client.

use serde_json::{Map, Value as JsonValue};
use std::fmt::Write;

pub const CLASSIFY_SYSTEM: &str = "You route messages for a database assistant. \
Answer with exactly one lowercase word and nothing else.";

pub const SQL_SYSTEM: &str = "You are an expert SQL writer. Return only a single SQL \
statement with no explanation and no markdown.";

pub const RESPONSE_SYSTEM: &str = "You are a concise, friendly assistant that helps people \
query SQL databases in natural language.";

pub const SUMMARY_SYSTEM: &str = "You explain query results to business users in plain language.";

/// Maximum columns listed per table in the SQL prompt.
const MAX_PROMPT_COLUMNS: usize = 25;

/// Number of rows shown to the model when summarizing.
const SUMMARY_SAMPLE_ROWS: usize = 3;

fn flag(context: &JsonValue, key: &str) -> bool {
    context.get(key).and_then(JsonValue::as_bool).unwrap_or(false)
}

fn text<'a>(context: &'a JsonValue, key: &str) -> &'a str {
    context.get(key).and_then(JsonValue::as_str).unwrap_or("unknown")
}

pub fn classify_prompt(utterance: &str, context: &JsonValue) -> String {
    format!(
        r#"Classify the user's intent from this text: "{utterance}"

Context:
- Connected to database: {}
- Has selected tables: {}
- Has schema dictionary: {}

Possible intents:
- connection: connect to, disconnect from, or check the database connection
- query: run a data query or change data
- exploration: list databases, schemas or tables, or select tables to work with
- dictionary: generate, load, save, preview or enhance a data dictionary
- help: needs help or information

Return only the intent name (one word)."#,
        flag(context, "has_connection"),
        flag(context, "has_selected_tables"),
        flag(context, "has_dictionary"),
    )
}

/// Render the table section of a schema context.
pub fn describe_tables(schema_context: &JsonValue) -> String {
    let mut out = String::new();
    let Some(tables) = schema_context.get("tables").and_then(JsonValue::as_array) else {
        return out;
    };
    out.push_str("Available tables:\n");
    for table in tables {
        let name = table.get("name").and_then(JsonValue::as_str).unwrap_or("unknown");
        let description = table
            .get("description")
            .and_then(JsonValue::as_str)
            .unwrap_or("No description");
        let _ = writeln!(out, "- {}: {}", name, description);
        if let Some(columns) = table.get("columns").and_then(JsonValue::as_array) {
            for col in columns.iter().take(MAX_PROMPT_COLUMNS) {
                let col_name = col.get("name").and_then(JsonValue::as_str).unwrap_or("unknown");
                let col_type = col.get("type").and_then(JsonValue::as_str).unwrap_or("unknown");
                let _ = write!(out, "  - {}: {}", col_name, col_type);
                if let Some(desc) = col.get("description").and_then(JsonValue::as_str) {
                    let _ = write!(out, " ({})", desc);
                }
                out.push('\n');
            }
        }
    }
    out
}

pub fn sql_prompt(question: &str, schema_context: &JsonValue) -> String {
    let mut prompt = format!("Convert this natural language query to SQL:\nQuery: {question}\n\n");
    prompt.push_str(&describe_tables(schema_context));

    let _ = write!(
        prompt,
        "\nDialect: {}\nDatabase: {}\nSchema: {}\n",
        text(schema_context, "dialect"),
        text(schema_context, "database"),
        text(schema_context, "schema"),
    );

    if let Some(dictionary) = schema_context.get("dictionary").filter(|d| !d.is_null()) {
        let _ = write!(prompt, "\nData dictionary:\n{}\n", dictionary);
    }

    if let Some(recent) = schema_context
        .get("recent_queries")
        .and_then(JsonValue::as_array)
        .filter(|r| !r.is_empty())
    {
        prompt.push_str("\nRecent queries in this conversation:\n");
        for sql in recent.iter().filter_map(JsonValue::as_str) {
            let _ = writeln!(prompt, "- {}", sql);
        }
    }

    if let Some(kind) = schema_context.get("query_type").and_then(JsonValue::as_str) {
        let _ = write!(prompt, "\nThe statement must be a {} statement.\n", kind);
    }

    prompt.push_str("\nReturn only the SQL query, no explanation.");
    prompt
}

pub fn summary_prompt(question: &str, sql: &str, rows: &[Map<String, JsonValue>]) -> String {
    let sample: Vec<&Map<String, JsonValue>> = rows.iter().take(SUMMARY_SAMPLE_ROWS).collect();
    let sample = serde_json::to_string(&sample).unwrap_or_default();
    format!(
        "Summarize these query results in a conversational way:\n\n\
         Original Question: {question}\n\
         SQL Query: {sql}\n\
         Results: {sample}... ({} rows shown)\n\n\
         Provide a brief, helpful summary of what the data shows.",
        rows.len()
    )
}

/// Attach the caller's context to a free-form prompt.
pub fn response_prompt(prompt: &str, context: &JsonValue) -> String {
    match context {
        JsonValue::Object(map) if !map.is_empty() => {
            format!("{prompt}\n\nContext:\n{}", context)
        }
        _ => prompt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_prompt_includes_flags() {
        let prompt = classify_prompt(
            "show tables",
            &json!({"has_connection": true, "has_selected_tables": false}),
        );
        assert!(prompt.contains("\"show tables\""));
        assert!(prompt.contains("Connected to database: true"));
        assert!(prompt.contains("Has selected tables: false"));
        assert!(prompt.contains("Has schema dictionary: false"));
    }

    #[test]
    fn test_sql_prompt_lists_tables_and_history() {
        let ctx = json!({
            "dialect": "PostgreSQL",
            "database": "shop",
            "schema": "public",
            "tables": [{
                "name": "orders",
                "columns": [{"name": "id", "type": "integer"}, {"name": "total", "type": "numeric"}]
            }],
            "recent_queries": ["SELECT 1"]
        });
        let prompt = sql_prompt("total sales", &ctx);
        assert!(prompt.contains("- orders: No description"));
        assert!(prompt.contains("  - total: numeric"));
        assert!(prompt.contains("Dialect: PostgreSQL"));
        assert!(prompt.contains("- SELECT 1"));
    }

    #[test]
    fn test_response_prompt_without_context() {
        assert_eq!(response_prompt("hi", &json!({})), "hi");
        assert!(response_prompt("hi", &json!({"a": 1})).contains("Context:"));
    }
}
