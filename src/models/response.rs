//! The uniform response contract returned by every agent.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// Which handler produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Connection,
    Exploration,
    Dictionary,
    Query,
}

impl AgentKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connection => "connection_agent",
            Self::Exploration => "exploration_agent",
            Self::Dictionary => "dictionary_agent",
            Self::Query => "query_agent",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub success: bool,
    pub message: String,
    pub data: Map<String, JsonValue>,
    pub timestamp: DateTime<Utc>,
    pub agent: Option<AgentKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AgentResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(true, message)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(false, message)
    }

    fn new(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
            data: Map::new(),
            timestamp: Utc::now(),
            agent: None,
            execution_time_ms: None,
            session_id: None,
        }
    }

    pub fn with_agent(mut self, agent: AgentKind) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Attach any serializable value. Serialization failures store null.
    pub fn with_serialized<T: Serialize>(self, key: impl Into<String>, value: &T) -> Self {
        let value = serde_json::to_value(value).unwrap_or(JsonValue::Null);
        self.with_data(key, value)
    }

    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Append a paragraph to the message.
    pub fn with_note(mut self, note: impl AsRef<str>) -> Self {
        self.message.push_str("\n\n");
        self.message.push_str(note.as_ref());
        self
    }

    /// Look up a string payload entry.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(JsonValue::as_str)
    }
}
