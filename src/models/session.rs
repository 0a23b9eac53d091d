//! Per-conversation state.

use crate::models::{DatabaseConnection, QueryResult, SqlCache, TableMetadata};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// State carried across the turns of one conversation.
///
/// The session store owns these values. Agents mutate a working copy during
/// a turn and the orchestrator writes it back.
#[derive(Debug, Clone, Serialize)]
pub struct SessionContext {
    pub id: String,
    pub connection: Option<DatabaseConnection>,
    pub selected_tables: Vec<TableMetadata>,
    /// Append-only.
    pub query_history: Vec<QueryResult>,
    pub dictionary: Option<JsonValue>,
    pub preferences: Map<String, JsonValue>,
    /// SQL generated for earlier questions, valid for the current selection.
    #[serde(skip)]
    pub sql_cache: SqlCache,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionContext {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            connection: None,
            selected_tables: Vec::new(),
            query_history: Vec::new(),
            dictionary: None,
            preferences: Map::new(),
            sql_cache: SqlCache::default(),
            created_at: now,
            last_activity: now,
        }
    }

    /// True iff a connection is attached and its status is `connected`.
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.is_active())
    }

    pub fn has_selected_tables(&self) -> bool {
        !self.selected_tables.is_empty()
    }

    pub fn has_dictionary(&self) -> bool {
        self.dictionary.is_some()
    }

    pub fn selected_table_names(&self) -> Vec<String> {
        self.selected_tables.iter().map(|t| t.name.clone()).collect()
    }

    /// Replace the working table set. Cached SQL was written against the old
    /// set, so it is dropped.
    pub fn set_selected_tables(&mut self, tables: Vec<TableMetadata>) {
        self.selected_tables = tables;
        self.sql_cache.clear();
    }

    pub fn record_query(&mut self, result: QueryResult) {
        self.query_history.push(result);
    }

    /// The most recent `n` history entries, oldest first.
    pub fn recent_queries(&self, n: usize) -> &[QueryResult] {
        let start = self.query_history.len().saturating_sub(n);
        &self.query_history[start..]
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionStatus, Credentials, Intent, QueryKind, RowSet};

    #[test]
    fn test_is_connected_requires_connected_status() {
        let mut session = SessionContext::new();
        assert!(!session.is_connected());

        let mut conn = DatabaseConnection::new(Credentials::default());
        session.connection = Some(conn.clone());
        assert!(!session.is_connected());

        conn.status = ConnectionStatus::Connected;
        session.connection = Some(conn);
        assert!(session.is_connected());
    }

    #[test]
    fn test_selecting_tables_drops_cached_sql() {
        let mut session = SessionContext::new();
        session
            .sql_cache
            .insert("how many orders", Intent::Query, QueryKind::Select, "SELECT COUNT(*) FROM orders");

        session.set_selected_tables(vec![TableMetadata::new("customers", "db", "public")]);

        assert!(session.sql_cache.is_empty());
        assert_eq!(session.selected_table_names(), vec!["customers"]);
    }

    #[test]
    fn test_recent_queries_window() {
        let mut session = SessionContext::new();
        for i in 0..5 {
            session.record_query(QueryResult::from_rows(
                "r",
                format!("SELECT {}", i),
                RowSet::default(),
                0,
            ));
        }
        let recent = session.recent_queries(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].sql_query, "SELECT 2");
        assert_eq!(recent[2].sql_query, "SELECT 4");
        assert_eq!(session.recent_queries(10).len(), 5);
    }
}
