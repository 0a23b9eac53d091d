//! Top-level turn coordinator.
//!
//! One call to [`Orchestrator::process`] is one conversational turn: resolve
//! the session, classify the utterance, dispatch to an agent, reflect on
//! query results and persist the session. Turns for the same session are
//! serialized; different sessions run concurrently.

mod reflection;

pub use reflection::{NO_RESULTS_NOTE, SUMMARY_ROWS, reflect};

use crate::agents::{
    AgentRegistry, ConnectionAgent, DictionaryAgent, ExplorationAgent, QueryAgent,
};
use crate::config::Config;
use crate::db::{DatabaseConnector, QueryExecutor, SqlxConnector};
use crate::dictionary::{DictionaryStore, FileDictionaryStore};
use crate::error::AppResult;
use crate::intent::{IntentClassifier, infer_intent};
use crate::llm::{LlmClient, OpenAiClient};
use crate::models::{AgentKind, AgentResponse, Credentials, Intent, QueryRequest, SessionContext};
use crate::repository::{ConnectionRepository, MetadataRepository, QueryRepository};
use crate::session::{SessionLookup, SessionStore};
use futures_util::FutureExt;
use serde_json::json;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

const SESSION_CLEANUP_INTERVAL_SECS: u64 = 60;

pub struct Orchestrator {
    sessions: SessionStore,
    classifier: IntentClassifier,
    agents: AgentRegistry,
    connections: Arc<ConnectionRepository>,
    llm: Arc<dyn LlmClient>,
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    /// Wire the repositories and agents around the given collaborators.
    pub fn new(
        config: &Config,
        connector: Arc<dyn DatabaseConnector>,
        llm: Arc<dyn LlmClient>,
        dictionaries: Arc<dyn DictionaryStore>,
    ) -> Self {
        let fallback = config.fallback_credentials().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring invalid fallback connection settings");
            Credentials {
                db_type: config.db_type,
                ..Credentials::default()
            }
        });

        let connections = Arc::new(ConnectionRepository::new(connector.clone()));
        let metadata = Arc::new(MetadataRepository::new(connector.clone()));
        let queries = Arc::new(QueryRepository::new(connector, llm.clone()));

        let agents = AgentRegistry::new(
            ConnectionAgent::new(connections.clone(), metadata.clone(), llm.clone(), fallback),
            ExplorationAgent::new(metadata.clone()),
            DictionaryAgent::new(metadata, llm.clone(), dictionaries),
            QueryAgent::new(queries, llm.clone()),
        );

        Self {
            sessions: SessionStore::new(config.session_timeout_duration()),
            classifier: IntentClassifier::new(llm.clone()),
            agents,
            connections,
            llm,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the session idle timeout taken from configuration.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.sessions = SessionStore::new(timeout);
        self
    }

    /// Build the production collaborators from configuration.
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let executor = QueryExecutor::new(config.max_query_results, config.query_timeout_duration());
        let connector = Arc::new(SqlxConnector::new(executor, config.connect_timeout_duration()));
        let llm = Arc::new(OpenAiClient::from_config(config)?);
        let dictionaries = Arc::new(FileDictionaryStore::new(config.dictionary_dir.clone()));
        Ok(Self::new(config, connector, llm, dictionaries))
    }

    pub async fn create_session(&self) -> SessionContext {
        self.sessions.create().await
    }

    /// A live session. Reading an expired one evicts it and closes its
    /// connection.
    pub async fn session(&self, session_id: &str) -> Option<SessionContext> {
        match self.sessions.lookup(session_id).await {
            SessionLookup::Live(session) => Some(session),
            SessionLookup::Expired(session) => {
                self.close_connection_of(&session).await;
                None
            }
            SessionLookup::Missing => None,
        }
    }

    async fn close_connection_of(&self, session: &SessionContext) {
        if let Some(connection) = &session.connection {
            if let Err(e) = self.connections.close(&connection.id).await {
                warn!(session_id = %session.id, error = %e, "Failed to close session connection");
            }
        }
    }

    /// Forget a session and close its connection. Returns whether it existed.
    pub async fn delete_session(&self, session_id: &str) -> bool {
        let _turn = self.lock_turn(session_id).await;
        let Some(session) = self.sessions.delete(session_id).await else {
            return false;
        };
        self.close_connection_of(&session).await;
        info!(session_id = %session_id, "Session deleted");
        true
    }

    /// Evict expired sessions and close their connections.
    ///
    /// Each session is re-checked under its turn lock, so a turn in flight
    /// finishes (and refreshes the session) before the sweep looks at it.
    pub async fn purge_expired_sessions(&self) -> usize {
        let mut purged = 0;
        for id in self.sessions.expired_ids().await {
            let _turn = self.lock_turn(&id).await;
            if let Some(session) = self.sessions.remove_if_expired(&id).await {
                self.close_connection_of(&session).await;
                purged += 1;
            }
        }
        if purged > 0 {
            info!(count = purged, "Expired sessions purged");
        }
        purged
    }

    /// Periodically purge expired sessions for the life of the process.
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(SESSION_CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                self.purge_expired_sessions().await;
            }
        });
    }

    /// Close every connection the repository still holds.
    pub async fn shutdown(&self) {
        let count = self.connections.len().await;
        self.connections.close_all().await;
        info!(connections = count, "Orchestrator shut down");
    }

    async fn lock_turn(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.turn_locks.lock().await;
            // Only the map holds idle locks
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(session_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Resolve the caller's session, or create one, holding its turn lock.
    async fn begin_turn(&self, session_id: Option<&str>) -> (SessionContext, OwnedMutexGuard<()>) {
        if let Some(id) = session_id {
            let guard = self.lock_turn(id).await;
            match self.sessions.lookup(id).await {
                SessionLookup::Live(session) => return (session, guard),
                SessionLookup::Expired(session) => {
                    debug!(session_id = %id, "Session expired, starting a new one");
                    self.close_connection_of(&session).await;
                }
                SessionLookup::Missing => {
                    debug!(session_id = %id, "Unknown session, starting a new one");
                }
            }
        }
        let session = self.sessions.create().await;
        let guard = self.lock_turn(&session.id).await;
        (session, guard)
    }

    /// Handle one utterance. Never fails: every fault becomes a failed response.
    pub async fn process(&self, utterance: &str, session_id: Option<&str>) -> AgentResponse {
        let (mut session, _turn) = self.begin_turn(session_id).await;
        let id = session.id.clone();

        let outcome = AssertUnwindSafe(self.run_turn(utterance, &mut session))
            .catch_unwind()
            .await;

        match outcome {
            Ok(response) => {
                self.sessions.update(session).await;
                response.with_session_id(id)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(session_id = %id, panic = %message, "Turn panicked");
                AgentResponse::failure(format!("An internal error occurred: {}", message))
                    .with_data("error", message)
                    .with_session_id(id)
            }
        }
    }

    async fn run_turn(&self, utterance: &str, session: &mut SessionContext) -> AgentResponse {
        let mut intent = self.classifier.classify(utterance, session).await;
        if intent == Intent::Unknown {
            intent = infer_intent(utterance, session);
        }
        let request = QueryRequest::new(utterance).with_intent(intent);

        let response = match self.agents.resolve(intent) {
            None => self.help(session).await,
            Some(agent) if !agent.can_handle(&request, session) => {
                AgentResponse::failure("That request can't be handled right now. Try rephrasing it.")
                    .with_agent(agent.kind())
            }
            Some(agent) => {
                let started = Instant::now();
                let result = agent.execute(&request, session).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;

                let response = match result {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(session_id = %session.id, agent = %agent.kind(), error = %e, "Agent failed");
                        let mut response = AgentResponse::failure(format!("Error: {}", e))
                            .with_data("error", e.to_string());
                        if let Some(suggestion) = e.suggestion() {
                            response = response.with_note(format!("Suggestion: {}", suggestion));
                        }
                        response
                    }
                }
                .with_agent(agent.kind())
                .with_execution_time(elapsed_ms);

                info!(
                    session_id = %session.id,
                    intent = %intent,
                    agent = %agent.kind(),
                    success = response.success,
                    execution_time_ms = elapsed_ms,
                    "Turn handled"
                );

                if agent.kind() == AgentKind::Query {
                    reflect(self.llm.as_ref(), &request, response).await
                } else {
                    response
                }
            }
        };

        response.with_data("intent", intent.as_str())
    }

    fn suggestions(session: &SessionContext) -> Vec<&'static str> {
        if !session.is_connected() {
            vec![
                "connect to the database",
                "how do I configure the connection?",
            ]
        } else if !session.has_selected_tables() {
            vec!["show me the databases", "show tables", "select 1, 2"]
        } else {
            vec![
                "how many rows are in each selected table?",
                "generate a data dictionary",
                "describe the selected tables",
            ]
        }
    }

    async fn help(&self, session: &SessionContext) -> AgentResponse {
        let suggestions = Self::suggestions(session);
        let context = json!({
            "has_connection": session.is_connected(),
            "selected_tables": session.selected_table_names(),
            "has_dictionary": session.has_dictionary(),
        });
        let prompt = "The user asked for help with this natural-language database assistant. \
                      Explain briefly what they can do next: connect to a database, explore \
                      catalogs and tables, select tables, build a data dictionary, and ask \
                      questions that are answered with SQL.";

        match self.llm.generate_response(prompt, &context).await {
            Ok(text) => AgentResponse::success(text).with_data("suggestions", suggestions),
            Err(e) => {
                debug!(error = %e, "Help generation failed");
                AgentResponse::failure(
                    "I'm not sure what you'd like to do. Could you rephrase? For example:",
                )
                .with_note(
                    suggestions
                        .iter()
                        .map(|s| format!("  - {}", s))
                        .collect::<Vec<_>>()
                        .join("\n"),
                )
                .with_data("suggestions", suggestions)
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn test_suggestions_follow_session_state() {
        let session = SessionContext::new();
        assert!(Orchestrator::suggestions(&session)[0].contains("connect"));
    }
}
