//! Query-related data models.
//!
//! This module defines intents, the per-utterance request record, and the
//! execution result that is appended to a session's history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// The classified purpose of one user utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Connection,
    Query,
    Exploration,
    Dictionary,
    Help,
    Unknown,
}

impl Intent {
    /// Parse a classifier label. Surrounding quotes, whitespace and trailing
    /// punctuation are ignored.
    pub fn from_label(label: &str) -> Option<Self> {
        let cleaned = label
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_ascii_lowercase();
        match cleaned.as_str() {
            "connection" | "connect" => Some(Self::Connection),
            "query" => Some(Self::Query),
            "exploration" | "explore" => Some(Self::Exploration),
            "dictionary" => Some(Self::Dictionary),
            "help" => Some(Self::Help),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Query => "query",
            Self::Exploration => "exploration",
            Self::Dictionary => "dictionary",
            Self::Help => "help",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query sub-type decided from the utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    Describe,
}

impl QueryKind {
    /// Whether this sub-type modifies data and needs confirmation.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Insert | Self::Update | Self::Delete)
    }

    /// The leading SQL keyword a statement of this kind starts with.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Describe => "DESCRIBE",
        }
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One incoming utterance.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    pub id: String,
    pub text: String,
    pub intent: Option<Intent>,
    pub context: Map<String, JsonValue>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            intent: None,
            context: Map::new(),
            created_at: Utc::now(),
            user_id: None,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach the resolved intent. Only the first resolution sticks.
    pub fn with_intent(mut self, intent: Intent) -> Self {
        if self.intent.is_none() {
            self.intent = Some(intent);
        }
        self
    }

    /// Lowercased text for keyword scans.
    pub fn normalized_text(&self) -> String {
        self.text.to_lowercase()
    }
}

/// Raw rows returned by the database collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, JsonValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    #[serde(default)]
    pub truncated: bool,
}

/// Result of executing one SQL statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    pub request_id: String,
    pub sql_query: String,
    pub rows: Vec<Map<String, JsonValue>>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    #[serde(default)]
    pub truncated: bool,
}

impl QueryResult {
    /// Build a successful result from a row set.
    pub fn from_rows(
        request_id: impl Into<String>,
        sql: impl Into<String>,
        row_set: RowSet,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            sql_query: sql.into(),
            row_count: row_set.rows.len(),
            rows: row_set.rows,
            columns: row_set.columns,
            execution_time_ms,
            success: true,
            error_message: None,
            rows_affected: row_set.rows_affected,
            truncated: row_set.truncated,
        }
    }

    /// Build a failed result carrying the collaborator's error text.
    pub fn failed(
        request_id: impl Into<String>,
        sql: impl Into<String>,
        error: impl Into<String>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            sql_query: sql.into(),
            rows: Vec::new(),
            columns: Vec::new(),
            row_count: 0,
            execution_time_ms,
            success: false,
            error_message: Some(error.into()),
            rows_affected: None,
            truncated: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}
