//! Rule-based intent inference, used when the LLM stage returns `Unknown`.

use crate::models::{Intent, SessionContext};

/// One ordered rule: any keyword found as a literal substring selects `intent`.
#[derive(Debug, Clone, Copy)]
pub struct FallbackRule {
    pub keywords: &'static [&'static str],
    pub intent: Intent,
    /// Route to Connection instead while no connection is active.
    pub requires_connection: bool,
}

impl FallbackRule {
    fn matches(&self, text: &str) -> bool {
        self.keywords.iter().any(|k| text.contains(k))
    }
}

/// Rules in priority order. The first match wins.
pub const FALLBACK_RULES: &[FallbackRule] = &[
    FallbackRule {
        keywords: &["connect", "login", "log in", "logout", "credential"],
        intent: Intent::Connection,
        requires_connection: false,
    },
    FallbackRule {
        keywords: &["dictionary", "yaml", "metadata", "data dictionary"],
        intent: Intent::Dictionary,
        requires_connection: false,
    },
    FallbackRule {
        keywords: &[
            "explore",
            "browse",
            "catalog",
            "databases",
            "schemas",
            "tables",
            "list tables",
            "show tables",
            "select table",
            "choose table",
            "pick table",
        ],
        intent: Intent::Exploration,
        requires_connection: false,
    },
    FallbackRule {
        keywords: &[
            "query", "select", "find", "show", "get", "list", "how many", "count", "insert",
            "update", "delete", "sum", "average", "total",
        ],
        intent: Intent::Query,
        requires_connection: true,
    },
    FallbackRule {
        keywords: &["database", "snowflake", "warehouse"],
        intent: Intent::Connection,
        requires_connection: false,
    },
];

/// Infer an intent from literal keywords, then from session state.
pub fn infer_intent(text: &str, session: &SessionContext) -> Intent {
    let text = text.to_lowercase();
    if let Some(rule) = FALLBACK_RULES.iter().find(|r| r.matches(&text)) {
        if rule.requires_connection && !session.is_connected() {
            return Intent::Connection;
        }
        return rule.intent;
    }

    if !session.is_connected() {
        Intent::Connection
    } else if !session.has_selected_tables() {
        Intent::Exploration
    } else {
        Intent::Query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionStatus, Credentials, DatabaseConnection, TableMetadata};

    fn connected() -> SessionContext {
        let mut session = SessionContext::new();
        let mut conn = DatabaseConnection::new(Credentials::default());
        conn.status = ConnectionStatus::Connected;
        session.connection = Some(conn);
        session
    }

    fn with_tables() -> SessionContext {
        let mut session = connected();
        session.selected_tables = vec![TableMetadata::new("orders", "db", "public")];
        session
    }

    #[test]
    fn test_connection_keywords_win_first() {
        let session = SessionContext::new();
        assert_eq!(infer_intent("please connect me", &session), Intent::Connection);
        assert_eq!(infer_intent("Log in now", &connected()), Intent::Connection);
    }

    #[test]
    fn test_dictionary_before_exploration() {
        assert_eq!(
            infer_intent("build a data dictionary for the tables", &connected()),
            Intent::Dictionary
        );
    }

    #[test]
    fn test_databases_is_exploration_not_connection() {
        assert_eq!(
            infer_intent("show me the databases", &connected()),
            Intent::Exploration
        );
    }

    #[test]
    fn test_query_requires_connection() {
        let disconnected = SessionContext::new();
        assert_eq!(infer_intent("how many orders", &disconnected), Intent::Connection);
        assert_eq!(infer_intent("how many orders", &with_tables()), Intent::Query);
    }

    #[test]
    fn test_generic_database_word_is_connection() {
        assert_eq!(infer_intent("which database am I on", &connected()), Intent::Connection);
    }

    #[test]
    fn test_state_heuristics() {
        assert_eq!(infer_intent("hmm", &SessionContext::new()), Intent::Connection);
        assert_eq!(infer_intent("hmm", &connected()), Intent::Exploration);
        assert_eq!(infer_intent("hmm", &with_tables()), Intent::Query);
    }

    #[test]
    fn test_rules_are_ordered() {
        let position = |intent: Intent| FALLBACK_RULES.iter().position(|r| r.intent == intent);
        assert_eq!(position(Intent::Connection), Some(0));
        assert!(position(Intent::Dictionary) < position(Intent::Exploration));
        assert!(position(Intent::Exploration) < position(Intent::Query));
    }
}
