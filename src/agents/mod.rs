//! Specialized handlers, one per actionable intent.
//!
//! Every agent follows the same contract: validation problems come back as
//! `Ok(AgentResponse::failure(..))` and leave the session untouched, while
//! `Err` is reserved for faults the orchestrator has to convert.

mod connection;
mod dictionary;
mod exploration;
mod query;

pub use connection::{ConnectionAgent, extract_credentials};
pub use dictionary::{DictionaryAgent, extract_filename};
pub use exploration::ExplorationAgent;
pub use query::{QueryAgent, detect_query_kind};

use crate::error::AppResult;
use crate::models::{AgentKind, AgentResponse, Intent, QueryRequest, SessionContext};
use async_trait::async_trait;

#[async_trait]
pub trait Agent: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Whether this agent accepts the request at all.
    fn can_handle(&self, _request: &QueryRequest, _session: &SessionContext) -> bool {
        true
    }

    /// Handle one request, mutating the session's working copy.
    async fn execute(
        &self,
        request: &QueryRequest,
        session: &mut SessionContext,
    ) -> AppResult<AgentResponse>;
}

/// Intent to handler table, built once per orchestrator.
pub struct AgentRegistry {
    connection: ConnectionAgent,
    exploration: ExplorationAgent,
    dictionary: DictionaryAgent,
    query: QueryAgent,
}

impl AgentRegistry {
    pub fn new(
        connection: ConnectionAgent,
        exploration: ExplorationAgent,
        dictionary: DictionaryAgent,
        query: QueryAgent,
    ) -> Self {
        Self {
            connection,
            exploration,
            dictionary,
            query,
        }
    }

    /// `None` for intents without a dedicated agent.
    pub fn resolve(&self, intent: Intent) -> Option<&dyn Agent> {
        match intent {
            Intent::Connection => Some(&self.connection),
            Intent::Exploration => Some(&self.exploration),
            Intent::Dictionary => Some(&self.dictionary),
            Intent::Query => Some(&self.query),
            Intent::Help | Intent::Unknown => None,
        }
    }
}

fn is_word_char(c: Option<char>) -> bool {
    c.is_some_and(|c| c.is_alphanumeric() || c == '_')
}

fn find_word(text: &str, word: &str, whole: bool) -> bool {
    text.match_indices(word).any(|(i, _)| {
        let before = text[..i].chars().next_back();
        let after = text[i + word.len()..].chars().next();
        !is_word_char(before) && (!whole || !is_word_char(after))
    })
}

/// Any of `words` occurs at the start of a word in `text`.
///
/// "connection" mentions "connect"; "disconnect" does not.
pub(crate) fn mentions_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| find_word(text, w, false))
}

/// Any of `words` occurs as a whole word (or phrase) in `text`.
pub(crate) fn has_word(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| find_word(text, w, true))
}

/// First action whose keywords `text` mentions.
pub(crate) fn detect_action<A: Copy>(text: &str, actions: &[(A, &[&str])]) -> Option<A> {
    actions
        .iter()
        .find(|(_, words)| mentions_any(text, words))
        .map(|(action, _)| *action)
}
