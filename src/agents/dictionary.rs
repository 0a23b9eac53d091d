//! Schema dictionary generation, persistence and AI enrichment.

use super::{Agent, detect_action, has_word};
use crate::dictionary::{
    self, DictionaryStore, is_valid_dictionary, new_dictionary, render_preview, table_entry,
    tables_from_dictionary,
};
use crate::error::AppResult;
use crate::llm::LlmClient;
use crate::models::{
    AgentKind, AgentResponse, DatabaseConnection, QueryRequest, SessionContext, TableMetadata,
};
use crate::repository::MetadataRepository;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value as JsonValue, json};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

pub const DEFAULT_DICTIONARY_FILE: &str = "data_dictionary.yaml";

/// Free-text enrichment kept when the model does not answer in JSON.
const AI_DESCRIPTION_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DictionaryAction {
    Save,
    Load,
    Enhance,
    Preview,
    Generate,
}

const ACTIONS: &[(DictionaryAction, &[&str])] = &[
    (DictionaryAction::Save, &["save", "export", "write"]),
    (DictionaryAction::Load, &["load", "import", "read", "open"]),
    (DictionaryAction::Enhance, &["enhance", "improve", "enrich"]),
    (DictionaryAction::Preview, &["show", "display", "view", "preview"]),
    (DictionaryAction::Generate, &["generate", "create", "build"]),
];

static FILENAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"["']([^"']+\.(?:yaml|yml|json))["']"#,
        r"(?i)\b([a-zA-Z0-9_\-\./]+\.(?:yaml|yml|json))\b",
        r"(?i)\bfile\s+(?:(?:called|named)\s+)?([a-zA-Z0-9_\-\./]+)",
        r"(?i)\b(?:named?|called)\s+([a-zA-Z0-9_\-\./]+)",
    ]
    .into_iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// File name mentioned in an utterance, tried pattern by pattern.
pub fn extract_filename(text: &str) -> Option<String> {
    FILENAME_PATTERNS
        .iter()
        .find_map(|re| re.captures(text).map(|c| c[1].to_string()))
}

fn with_dictionary_extension(name: &str) -> String {
    let lower = name.to_lowercase();
    if [".yaml", ".yml", ".json"].iter().any(|ext| lower.ends_with(ext)) {
        name.to_string()
    } else {
        format!("{}.yaml", name)
    }
}

/// Pull the first `{...}` block out of a completion, ignoring code fences.
fn parse_enrichment(text: &str) -> Option<Map<String, JsonValue>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<JsonValue>(&text[start..=end]) {
        Ok(JsonValue::Object(map)) => Some(map),
        _ => None,
    }
}

fn enrichment_prompt(name: &str, entry: &JsonValue) -> String {
    let columns: Vec<String> = entry
        .get("columns")
        .and_then(JsonValue::as_array)
        .map(|cols| {
            cols.iter()
                .map(|c| {
                    format!(
                        "{} ({})",
                        c.get("name").and_then(JsonValue::as_str).unwrap_or("?"),
                        c.get("type").and_then(JsonValue::as_str).unwrap_or("?")
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    format!(
        "Describe the business meaning of the database table '{}' with columns: {}.\n\
         Respond with JSON only, in the form \
         {{\"description\": \"...\", \"relationships\": [{{\"column\": \"...\", \"references\": \"table.column\"}}]}}.",
        name,
        columns.join(", ")
    )
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct EnrichmentStats {
    processed: usize,
    enhanced: usize,
}

pub struct DictionaryAgent {
    metadata: Arc<MetadataRepository>,
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn DictionaryStore>,
}

impl DictionaryAgent {
    pub fn new(
        metadata: Arc<MetadataRepository>,
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn DictionaryStore>,
    ) -> Self {
        Self {
            metadata,
            llm,
            store,
        }
    }

    /// Ask the model about every table in `document`.
    ///
    /// Failures mark the table `ai_enhanced: false` and move on.
    async fn enrich(&self, document: &mut JsonValue) -> EnrichmentStats {
        let mut stats = EnrichmentStats::default();
        let mut relationships: Vec<JsonValue> = Vec::new();

        for (name, entry) in dictionary::table_entries_mut(document) {
            stats.processed += 1;
            let prompt = enrichment_prompt(&name, entry);
            let Some(fields) = entry.as_object_mut() else {
                continue;
            };

            match self.llm.generate_response(&prompt, &json!({ "table": name })).await {
                Ok(text) => {
                    match parse_enrichment(&text) {
                        Some(parsed) => {
                            if let Some(desc) = parsed.get("description").and_then(JsonValue::as_str) {
                                fields.insert("ai_description".into(), desc.into());
                            }
                            let suggested = parsed
                                .get("relationships")
                                .and_then(JsonValue::as_array)
                                .cloned()
                                .unwrap_or_default();
                            relationships.extend(suggested.iter().map(|r| match r {
                                JsonValue::Object(o) => {
                                    let mut o = o.clone();
                                    o.entry("table").or_insert_with(|| name.clone().into());
                                    JsonValue::Object(o)
                                }
                                other => other.clone(),
                            }));
                            fields.insert("suggested_relationships".into(), suggested.into());
                        }
                        None => {
                            let truncated: String = text.chars().take(AI_DESCRIPTION_CHARS).collect();
                            fields.insert("ai_description".into(), truncated.into());
                        }
                    }
                    fields.insert("ai_enhanced".into(), true.into());
                    fields.insert("enhanced_at".into(), chrono::Utc::now().to_rfc3339().into());
                    stats.enhanced += 1;
                }
                Err(e) => {
                    debug!(table = %name, error = %e, "Table enrichment failed");
                    fields.insert("ai_enhanced".into(), false.into());
                }
            }
        }

        if let Some(obj) = document.as_object_mut().filter(|_| !relationships.is_empty()) {
            let slot = obj
                .entry("relationships")
                .or_insert_with(|| JsonValue::Array(Vec::new()));
            match slot {
                JsonValue::Array(existing) => existing.extend(relationships),
                other => *other = relationships.into(),
            }
        }
        stats
    }

    async fn generate(
        &self,
        text: &str,
        session: &mut SessionContext,
        connection: &DatabaseConnection,
    ) -> AgentResponse {
        let tables: Vec<TableMetadata> = if has_word(text, &["all", "entire"]) {
            let listed = match self
                .metadata
                .get_tables(
                    connection,
                    connection.current_catalog(),
                    connection.current_schema(),
                )
                .await
            {
                Ok(listed) => listed,
                Err(e) => {
                    return AgentResponse::failure(format!("Failed to list tables: {}", e))
                        .with_data("error", e.to_string());
                }
            };
            let mut detailed = Vec::with_capacity(listed.len());
            for table in &listed {
                detailed.push(self.metadata.get_table_metadata(connection, table).await);
            }
            detailed
        } else {
            session.selected_tables.clone()
        };

        if tables.is_empty() {
            return AgentResponse::failure(
                "No tables to document. Select tables first, or say 'generate dictionary for all tables'.",
            );
        }

        let mut document = new_dictionary(connection.current_catalog(), connection.current_schema());
        if let Some(entries) = dictionary::tables_mut(&mut document) {
            for table in &tables {
                entries.insert(table.name.clone(), table_entry(table));
            }
        }

        let stats = self.enrich(&mut document).await;
        info!(
            session_id = %session.id,
            tables = stats.processed,
            enhanced = stats.enhanced,
            "Dictionary generated"
        );

        let message = format!(
            "Generated a data dictionary for {} table(s), {} enhanced with AI descriptions.\n\n{}",
            stats.processed,
            stats.enhanced,
            render_preview(&document)
        );
        let response = AgentResponse::success(message)
            .with_data("dictionary", document.clone())
            .with_data("tables_processed", stats.processed)
            .with_data("tables_enhanced", stats.enhanced);
        session.dictionary = Some(document);
        response
    }

    async fn load(&self, request: &QueryRequest, session: &mut SessionContext) -> AgentResponse {
        let Some(name) = extract_filename(&request.text) else {
            let files = self.store.list().await.unwrap_or_else(|e| {
                warn!(error = %e, "Listing dictionary files failed");
                Vec::new()
            });
            let message = if files.is_empty() {
                "Which file should I load? No dictionary files were found; name one, e.g. 'load sales.yaml'."
                    .to_string()
            } else {
                format!(
                    "Which file should I load? Available dictionaries:\n{}",
                    files
                        .iter()
                        .map(|f| format!("  - {}", f))
                        .collect::<Vec<_>>()
                        .join("\n")
                )
            };
            return AgentResponse::failure(message).with_data("available_files", files);
        };

        let document = match self.store.read(&name).await {
            Ok(document) => document,
            Err(e) => {
                return AgentResponse::failure(format!("Failed to load {}: {}", name, e))
                    .with_data("error", e.to_string());
            }
        };
        if !is_valid_dictionary(&document) {
            return AgentResponse::failure(format!(
                "{} is not a data dictionary: expected a 'tables' or 'schema' section.",
                name
            ));
        }

        let (catalog, schema) = session
            .connection
            .as_ref()
            .map(|c| (c.current_catalog().to_string(), c.current_schema().to_string()))
            .unwrap_or_default();
        let mut message = format!("Loaded data dictionary from {}.", name);
        if let Some(tables) = tables_from_dictionary(&document, &catalog, &schema) {
            message.push_str(&format!(" Selected {} table(s) from it.", tables.len()));
            session.set_selected_tables(tables);
        }
        message.push_str("\n\n");
        message.push_str(&render_preview(&document));

        info!(session_id = %session.id, file = %name, "Dictionary loaded");
        let response = AgentResponse::success(message)
            .with_data("dictionary", document.clone())
            .with_data("file", name)
            .with_data("selected_tables", session.selected_table_names());
        session.dictionary = Some(document);
        response
    }

    async fn save(&self, request: &QueryRequest, session: &SessionContext) -> AgentResponse {
        let Some(document) = &session.dictionary else {
            return AgentResponse::failure(
                "There is no dictionary to save. Generate or load one first.",
            );
        };
        let name = with_dictionary_extension(
            &extract_filename(&request.text).unwrap_or_else(|| DEFAULT_DICTIONARY_FILE.to_string()),
        );

        match self.store.write(&name, document).await {
            Ok(stored) => AgentResponse::success(format!(
                "Saved the data dictionary to {} ({} bytes).",
                stored.path.display(),
                stored.bytes
            ))
            .with_data("path", stored.path.display().to_string())
            .with_data("bytes", stored.bytes),
            Err(e) => AgentResponse::failure(format!("Failed to save {}: {}", name, e))
                .with_data("error", e.to_string()),
        }
    }

    fn preview(&self, session: &SessionContext) -> AgentResponse {
        match &session.dictionary {
            Some(document) => AgentResponse::success(render_preview(document)),
            None => AgentResponse::failure(
                "No data dictionary is loaded. Say 'generate dictionary' or 'load <file>'.",
            ),
        }
    }

    async fn enhance(&self, session: &mut SessionContext) -> AgentResponse {
        let Some(mut document) = session.dictionary.clone() else {
            return AgentResponse::failure(
                "No data dictionary is loaded. Generate or load one before enhancing it.",
            );
        };
        let stats = self.enrich(&mut document).await;
        let response = AgentResponse::success(format!(
            "Enhanced {} of {} table(s) with AI descriptions.",
            stats.enhanced, stats.processed
        ))
        .with_data("dictionary", document.clone())
        .with_data("tables_processed", stats.processed)
        .with_data("tables_enhanced", stats.enhanced);
        session.dictionary = Some(document);
        response
    }
}

#[async_trait]
impl Agent for DictionaryAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Dictionary
    }

    async fn execute(
        &self,
        request: &QueryRequest,
        session: &mut SessionContext,
    ) -> AppResult<AgentResponse> {
        let Some(connection) = session.connection.clone().filter(|c| c.is_active()) else {
            return Ok(AgentResponse::failure(
                "Not connected to a database. Say 'connect' before working with dictionaries.",
            ));
        };

        let text = request.normalized_text();
        let action = detect_action(&text, ACTIONS).unwrap_or(if session.has_dictionary() {
            DictionaryAction::Preview
        } else {
            DictionaryAction::Generate
        });

        let response = match action {
            DictionaryAction::Save => self.save(request, session).await,
            DictionaryAction::Load => self.load(request, session).await,
            DictionaryAction::Enhance => self.enhance(session).await,
            DictionaryAction::Preview => self.preview(session),
            DictionaryAction::Generate => self.generate(&text, session, &connection).await,
        };
        Ok(response)
    }
}
