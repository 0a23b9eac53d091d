//! Catalog, schema and table browsing, and table selection.

use super::{Agent, detect_action, has_word};
use crate::error::AppResult;
use crate::format::truncate_chars;
use crate::models::{
    AgentKind, AgentResponse, DatabaseConnection, QueryRequest, SessionContext, TableMetadata,
};
use crate::repository::MetadataRepository;
use async_trait::async_trait;
use regex::Regex;
use std::fmt::Write;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

const TABLE_DESCRIPTION_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExplorationAction {
    Select,
    Describe,
    Catalogs,
    Schemas,
    Tables,
}

const ACTIONS: &[(ExplorationAction, &[&str])] = &[
    (ExplorationAction::Select, &["select", "choose", "pick", "work with"]),
    (
        ExplorationAction::Describe,
        &["describe", "detail", "info", "structure", "columns of"],
    ),
    (ExplorationAction::Catalogs, &["database", "catalog"]),
    (ExplorationAction::Schemas, &["schema"]),
    (ExplorationAction::Tables, &["table"]),
];

static ORDINAL: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b(\d+)\b").ok());

/// Tables picked out of `available` by an utterance.
///
/// "all" takes everything, then name mentions, then 1-based ordinals.
fn pick_tables(text: &str, available: &[TableMetadata]) -> Vec<TableMetadata> {
    if has_word(text, &["all"]) {
        return available.to_vec();
    }

    let by_name: Vec<TableMetadata> = available
        .iter()
        .filter(|t| text.contains(&t.name.to_lowercase()))
        .cloned()
        .collect();
    if !by_name.is_empty() {
        return by_name;
    }

    let Some(re) = ORDINAL.as_ref() else {
        return Vec::new();
    };
    let mut picked: Vec<TableMetadata> = Vec::new();
    for caps in re.captures_iter(text) {
        let Ok(n) = caps[1].parse::<usize>() else {
            continue;
        };
        if let Some(table) = n.checked_sub(1).and_then(|i| available.get(i)) {
            if !picked.iter().any(|t| t.name == table.name) {
                picked.push(table.clone());
            }
        }
    }
    picked
}

fn numbered_tables(tables: &[TableMetadata], selected: &[String]) -> String {
    let mut out = String::new();
    for (i, table) in tables.iter().enumerate() {
        let _ = write!(out, "  {}. {}", i + 1, table.name);
        if let Some(count) = table.row_count {
            let _ = write!(out, " ({} rows)", count);
        }
        if let Some(desc) = table.description.as_deref().filter(|d| !d.is_empty()) {
            let _ = write!(out, " - {}", truncate_chars(desc, TABLE_DESCRIPTION_CHARS));
        }
        if selected.contains(&table.name) {
            out.push_str(" [selected]");
        }
        out.push('\n');
    }
    out
}

fn describe_columns(table: &TableMetadata) -> String {
    let mut out = format!("Table: {}\n", table.qualified_name());
    if let Some(count) = table.row_count {
        let _ = writeln!(out, "Rows: {}", count);
    }
    if let Some(desc) = &table.description {
        let _ = writeln!(out, "Description: {}", desc);
    }
    let _ = writeln!(out, "\nColumns ({}):", table.columns.len());
    for col in &table.columns {
        let _ = write!(out, "  - {} {}", col.name, col.data_type);
        if !col.nullable {
            out.push_str(" NOT NULL");
        }
        if col.is_primary_key {
            out.push_str(" PRIMARY KEY");
        }
        if let Some(desc) = &col.description {
            let _ = write!(out, " - {}", desc);
        }
        out.push('\n');
    }
    out
}

pub struct ExplorationAgent {
    metadata: Arc<MetadataRepository>,
}

impl ExplorationAgent {
    pub fn new(metadata: Arc<MetadataRepository>) -> Self {
        Self { metadata }
    }

    async fn catalogs(&self, connection: &DatabaseConnection) -> AgentResponse {
        let databases = match self.metadata.get_catalogs(connection).await {
            Ok(databases) => databases,
            Err(e) => return metadata_failure("databases", &e),
        };
        let current = connection.current_catalog();

        let mut message = format!("Available databases ({}):\n", databases.len());
        for (i, name) in databases.iter().enumerate() {
            let _ = write!(message, "  {}. {}", i + 1, name);
            if name == current {
                message.push_str(" (current)");
            }
            message.push('\n');
        }
        AgentResponse::success(message)
            .with_data("databases", databases)
            .with_data("current_database", current)
    }

    async fn schemas(&self, text: &str, connection: &DatabaseConnection) -> AgentResponse {
        let mut catalog = connection.current_catalog().to_string();
        if let Ok(catalogs) = self.metadata.get_catalogs(connection).await {
            if let Some(named) = catalogs
                .into_iter()
                .find(|c| has_word(text, &[c.to_lowercase().as_str()]))
            {
                catalog = named;
            }
        }

        let schemas = match self.metadata.get_schemas(connection, &catalog).await {
            Ok(schemas) => schemas,
            Err(e) => return metadata_failure("schemas", &e),
        };
        let current = connection.current_schema();

        let mut message = format!("Schemas in {} ({}):\n", catalog, schemas.len());
        for (i, name) in schemas.iter().enumerate() {
            let _ = write!(message, "  {}. {}", i + 1, name);
            if name == current {
                message.push_str(" (current)");
            }
            message.push('\n');
        }
        AgentResponse::success(message)
            .with_data("schemas", schemas)
            .with_data("database", catalog)
    }

    async fn list_tables(
        &self,
        connection: &DatabaseConnection,
    ) -> Result<Vec<TableMetadata>, AgentResponse> {
        self.metadata
            .get_tables(
                connection,
                connection.current_catalog(),
                connection.current_schema(),
            )
            .await
            .map_err(|e| metadata_failure("tables", &e))
    }

    async fn tables(&self, session: &SessionContext, connection: &DatabaseConnection) -> AgentResponse {
        let tables = match self.list_tables(connection).await {
            Ok(tables) => tables,
            Err(response) => return response,
        };
        let location = location(connection);
        if tables.is_empty() {
            return AgentResponse::success(format!("No tables found in {}.", location))
                .with_data("tables", Vec::<String>::new())
                .with_data("database", connection.current_catalog())
                .with_data("schema", connection.current_schema());
        }

        let mut message = format!("Tables in {} ({}):\n", location, tables.len());
        message.push_str(&numbered_tables(&tables, &session.selected_table_names()));
        message.push_str("\nSay 'select <table>' or 'select 1, 2' to work with tables.");

        AgentResponse::success(message)
            .with_serialized("tables", &tables)
            .with_data("database", connection.current_catalog())
            .with_data("schema", connection.current_schema())
    }

    async fn select(
        &self,
        text: &str,
        session: &mut SessionContext,
        connection: &DatabaseConnection,
    ) -> AgentResponse {
        let available = match self.list_tables(connection).await {
            Ok(tables) => tables,
            Err(response) => return response,
        };
        if available.is_empty() {
            return AgentResponse::failure(format!(
                "No tables found in {} to select from.",
                location(connection)
            ));
        }

        let picked = pick_tables(text, &available);
        if picked.is_empty() {
            let mut message = String::from(
                "I couldn't tell which tables you want. Name them or use their numbers:\n",
            );
            message.push_str(&numbered_tables(&available, &session.selected_table_names()));
            return AgentResponse::failure(message)
                .with_data("selected_tables", session.selected_table_names());
        }

        let mut selected = Vec::with_capacity(picked.len());
        for table in &picked {
            selected.push(self.metadata.get_table_metadata(connection, table).await);
        }
        session.set_selected_tables(selected);
        info!(
            session_id = %session.id,
            count = session.selected_tables.len(),
            "Tables selected"
        );

        let mut message = format!("Selected {} table(s):\n", session.selected_tables.len());
        for table in &session.selected_tables {
            let _ = writeln!(message, "  - {} ({} columns)", table.name, table.columns.len());
        }
        message.push_str("\nYou can now ask questions about this data.");

        AgentResponse::success(message).with_data("selected_tables", session.selected_table_names())
    }

    async fn describe(
        &self,
        text: &str,
        session: &SessionContext,
        connection: &DatabaseConnection,
    ) -> AgentResponse {
        let mentioned = |t: &&TableMetadata| text.contains(&t.name.to_lowercase());

        let table = if let Some(t) = session.selected_tables.iter().find(mentioned) {
            Some(t.clone())
        } else {
            let listed = match self.list_tables(connection).await {
                Ok(tables) => tables,
                Err(response) => return response,
            };
            match listed.iter().find(mentioned) {
                Some(t) => Some(self.metadata.get_table_metadata(connection, t).await),
                None if session.selected_tables.len() == 1 => session.selected_tables.first().cloned(),
                None => None,
            }
        };

        match table {
            Some(table) => {
                AgentResponse::success(describe_columns(&table)).with_serialized("table", &table)
            }
            None => AgentResponse::failure(
                "Which table should I describe? Mention its name, e.g. 'describe orders'.",
            ),
        }
    }

    fn contextual(&self, session: &SessionContext, connection: &DatabaseConnection) -> AgentResponse {
        let names = session.selected_table_names();
        AgentResponse::success(format!(
            "Working with {} selected table(s) in {}: {}.\n\nAsk a question about the data, \
             or say 'show tables' to change the selection.",
            names.len(),
            location(connection),
            names.join(", ")
        ))
        .with_data("selected_tables", names)
    }
}

fn location(connection: &DatabaseConnection) -> String {
    match (connection.current_catalog(), connection.current_schema()) {
        ("", "") => "the current database".to_string(),
        (catalog, "") => catalog.to_string(),
        ("", schema) => schema.to_string(),
        (catalog, schema) => format!("{}.{}", catalog, schema),
    }
}

fn metadata_failure(what: &str, err: &crate::error::AppError) -> AgentResponse {
    warn!(error = %err, "Listing {} failed", what);
    let mut response =
        AgentResponse::failure(format!("Failed to list {}: {}", what, err)).with_data("error", err.to_string());
    if let Some(suggestion) = err.suggestion() {
        response = response.with_note(format!("Suggestion: {}", suggestion));
    }
    response
}

#[async_trait]
impl Agent for ExplorationAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Exploration
    }

    async fn execute(
        &self,
        request: &QueryRequest,
        session: &mut SessionContext,
    ) -> AppResult<AgentResponse> {
        let Some(connection) = session.connection.clone().filter(|c| c.is_active()) else {
            return Ok(AgentResponse::failure(
                "Not connected to a database. Say 'connect' first, then explore tables.",
            ));
        };

        let text = request.normalized_text();
        let response = match detect_action(&text, ACTIONS) {
            Some(ExplorationAction::Select) => self.select(&text, session, &connection).await,
            Some(ExplorationAction::Describe) => self.describe(&text, session, &connection).await,
            Some(ExplorationAction::Catalogs) => self.catalogs(&connection).await,
            Some(ExplorationAction::Schemas) => self.schemas(&text, &connection).await,
            Some(ExplorationAction::Tables) => self.tables(session, &connection).await,
            None if session.has_selected_tables() => self.contextual(session, &connection),
            None => self.tables(session, &connection).await,
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Vec<TableMetadata> {
        ["orders", "customers", "order_items"]
            .iter()
            .map(|n| TableMetadata::new(*n, "shop", "public"))
            .collect()
    }

    fn names(tables: &[TableMetadata]) -> Vec<&str> {
        tables.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_pick_all() {
        assert_eq!(pick_tables("select all tables", &listing()).len(), 3);
    }

    #[test]
    fn test_pick_by_name() {
        assert_eq!(
            names(&pick_tables("work with customers", &listing())),
            vec!["customers"]
        );
    }

    #[test]
    fn test_pick_by_ordinal() {
        assert_eq!(
            names(&pick_tables("select 1 and 3", &listing())),
            vec!["orders", "order_items"]
        );
        assert!(pick_tables("select 9", &listing()).is_empty());
        assert!(pick_tables("select 0", &listing()).is_empty());
    }

    #[test]
    fn test_names_win_over_ordinals() {
        assert_eq!(
            names(&pick_tables("pick customers 1", &listing())),
            vec!["customers"]
        );
    }

    #[test]
    fn test_action_order() {
        assert_eq!(
            detect_action("select the orders table", ACTIONS),
            Some(ExplorationAction::Select)
        );
        assert_eq!(
            detect_action("show me the databases", ACTIONS),
            Some(ExplorationAction::Catalogs)
        );
        assert_eq!(
            detect_action("list schemas", ACTIONS),
            Some(ExplorationAction::Schemas)
        );
        assert_eq!(detect_action("show tables", ACTIONS), Some(ExplorationAction::Tables));
        assert_eq!(detect_action("what next", ACTIONS), None);
    }

    #[test]
    fn test_numbered_tables_marks_selection() {
        let tables = vec![
            TableMetadata::new("orders", "", "")
                .with_row_count(12)
                .with_description("All orders placed through the web shop since the very first day of trading"),
            TableMetadata::new("customers", "", ""),
        ];
        let out = numbered_tables(&tables, &["customers".to_string()]);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].starts_with("  1. orders (12 rows) - All orders placed"));
        assert!(lines[0].ends_with("..."));
        assert_eq!(lines[1], "  2. customers [selected]");
    }
}
