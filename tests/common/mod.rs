//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use nl2sql_orchestrator::config::Config;
use nl2sql_orchestrator::db::{ConnectedTarget, DatabaseConnector};
use nl2sql_orchestrator::dictionary::FileDictionaryStore;
use nl2sql_orchestrator::error::{AppError, AppResult, LlmError, LlmResult};
use nl2sql_orchestrator::llm::LlmClient;
use nl2sql_orchestrator::models::{
    AgentResponse, ColumnDescriptor, Credentials, RowSet, TableMetadata,
};
use nl2sql_orchestrator::orchestrator::Orchestrator;
use serde_json::{Map, Value as JsonValue, json};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// LLM double. Queued answers are consumed in order; an empty queue fails
/// the call, which exercises every degraded path.
#[derive(Default)]
pub struct FakeLlm {
    labels: Mutex<VecDeque<String>>,
    sql: Mutex<VecDeque<String>>,
    responses: Mutex<VecDeque<String>>,
    summary: Mutex<Option<String>>,
    classify_delay: Mutex<Option<Duration>>,
    pub classify_calls: AtomicUsize,
    pub sql_calls: AtomicUsize,
    pub response_calls: AtomicUsize,
    pub summarize_calls: AtomicUsize,
}

impl FakeLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_label(&self, label: &str) {
        self.labels.lock().unwrap().push_back(label.to_string());
    }

    pub fn push_sql(&self, sql: &str) {
        self.sql.lock().unwrap().push_back(sql.to_string());
    }

    pub fn push_response(&self, text: &str) {
        self.responses.lock().unwrap().push_back(text.to_string());
    }

    pub fn set_summary(&self, summary: &str) {
        *self.summary.lock().unwrap() = Some(summary.to_string());
    }

    /// Make every classification take this long.
    pub fn set_classify_delay(&self, delay: Duration) {
        *self.classify_delay.lock().unwrap() = Some(delay);
    }

    pub fn summarize_count(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
    }

    pub fn sql_count(&self) -> usize {
        self.sql_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn classify(&self, _text: &str, _context: &JsonValue) -> LlmResult<String> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.classify_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.labels
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyResponse)
    }

    async fn generate_sql(&self, _text: &str, _schema_context: &JsonValue) -> LlmResult<String> {
        self.sql_calls.fetch_add(1, Ordering::SeqCst);
        self.sql
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyResponse)
    }

    async fn generate_response(&self, _prompt: &str, _context: &JsonValue) -> LlmResult<String> {
        self.response_calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyResponse)
    }

    async fn summarize(
        &self,
        _question: &str,
        _sql: &str,
        _sample_rows: &[Map<String, JsonValue>],
    ) -> LlmResult<String> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        self.summary
            .lock()
            .unwrap()
            .clone()
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Database double with scripted catalogs, tables and results.
pub struct FakeDatabase {
    pub catalogs: Vec<String>,
    pub tables: Vec<TableMetadata>,
    pub results: Mutex<VecDeque<AppResult<RowSet>>>,
    pub executed: Mutex<Vec<String>>,
    pub open: Mutex<HashSet<String>>,
    pub refuse_open: bool,
}

impl Default for FakeDatabase {
    fn default() -> Self {
        Self {
            catalogs: vec!["DB1".to_string(), "DB2".to_string()],
            tables: vec![
                TableMetadata::new("orders", "DB1", "PUBLIC")
                    .with_row_count(42)
                    .with_columns(vec![
                        ColumnDescriptor::new("id", "INTEGER", false).with_primary_key(true),
                        ColumnDescriptor::new("customer_id", "INTEGER", false),
                        ColumnDescriptor::new("total", "NUMERIC", true),
                    ]),
                TableMetadata::new("customers", "DB1", "PUBLIC")
                    .with_row_count(7)
                    .with_columns(vec![
                        ColumnDescriptor::new("id", "INTEGER", false).with_primary_key(true),
                        ColumnDescriptor::new("name", "TEXT", true),
                    ]),
            ],
            results: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
            open: Mutex::new(HashSet::new()),
            refuse_open: false,
        }
    }
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_result(&self, result: AppResult<RowSet>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn push_rows(&self, columns: &[&str], rows: Vec<JsonValue>) {
        let rows = rows
            .into_iter()
            .filter_map(|r| r.as_object().cloned())
            .collect();
        self.push_result(Ok(RowSet {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            rows_affected: None,
            truncated: false,
        }));
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.open.lock().unwrap().len()
    }

    fn check_open(&self, connection_id: &str) -> AppResult<()> {
        if self.open.lock().unwrap().contains(connection_id) {
            Ok(())
        } else {
            Err(AppError::connection_not_found(connection_id))
        }
    }
}

#[async_trait]
impl DatabaseConnector for FakeDatabase {
    async fn open(&self, connection_id: &str, _credentials: &Credentials) -> AppResult<ConnectedTarget> {
        if self.refuse_open {
            return Err(AppError::connection(
                "password authentication failed",
                "Check the user name and password",
            ));
        }
        self.open.lock().unwrap().insert(connection_id.to_string());
        Ok(ConnectedTarget {
            catalog: "DB1".to_string(),
            schema: "PUBLIC".to_string(),
            server_version: Some("fake 1.0".to_string()),
        })
    }

    async fn ping(&self, connection_id: &str) -> AppResult<()> {
        self.check_open(connection_id)
    }

    async fn close(&self, connection_id: &str) -> AppResult<()> {
        if self.open.lock().unwrap().remove(connection_id) {
            Ok(())
        } else {
            Err(AppError::connection_not_found(connection_id))
        }
    }

    async fn close_all(&self) {
        self.open.lock().unwrap().clear();
    }

    async fn list_catalogs(&self, connection_id: &str) -> AppResult<Vec<String>> {
        self.check_open(connection_id)?;
        Ok(self.catalogs.clone())
    }

    async fn list_schemas(&self, connection_id: &str, _catalog: &str) -> AppResult<Vec<String>> {
        self.check_open(connection_id)?;
        Ok(vec!["PUBLIC".to_string(), "STAGING".to_string()])
    }

    async fn list_tables(
        &self,
        connection_id: &str,
        _catalog: &str,
        _schema: &str,
    ) -> AppResult<Vec<TableMetadata>> {
        self.check_open(connection_id)?;
        // Listings carry no columns, like a real catalog query
        Ok(self
            .tables
            .iter()
            .map(|t| {
                let mut listed = t.clone();
                listed.columns.clear();
                listed
            })
            .collect())
    }

    async fn describe_table(
        &self,
        connection_id: &str,
        _catalog: &str,
        _schema: &str,
        table: &str,
    ) -> AppResult<TableMetadata> {
        self.check_open(connection_id)?;
        self.tables
            .iter()
            .find(|t| t.name == table)
            .cloned()
            .ok_or_else(|| AppError::schema("Table not found", table))
    }

    async fn execute(&self, connection_id: &str, sql: &str) -> AppResult<RowSet> {
        self.check_open(connection_id)?;
        self.executed.lock().unwrap().push(sql.to_string());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RowSet::default()))
    }
}

/// Configuration whose fallback credentials are complete.
pub fn test_config() -> Config {
    let mut config = Config::default_config();
    config.db_account = Some("db.example.com:5432".to_string());
    config.db_user = Some("alice".to_string());
    config.db_password = Some("secret".to_string());
    config
}

/// An orchestrator wired to the fakes, with dictionaries in a temp dir.
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub llm: Arc<FakeLlm>,
    pub db: Arc<FakeDatabase>,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(test_config(), FakeLlm::new(), FakeDatabase::new())
    }

    pub fn with(config: Config, llm: FakeLlm, db: FakeDatabase) -> Self {
        Self::build(config, llm, db, None)
    }

    /// Default fakes with sessions expiring after `timeout` of inactivity.
    pub fn with_session_timeout(timeout: Duration) -> Self {
        Self::build(test_config(), FakeLlm::new(), FakeDatabase::new(), Some(timeout))
    }

    fn build(config: Config, llm: FakeLlm, db: FakeDatabase, timeout: Option<Duration>) -> Self {
        let llm = Arc::new(llm);
        let db = Arc::new(db);
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileDictionaryStore::new(dir.path()));
        let mut orchestrator = Orchestrator::new(&config, db.clone(), llm.clone(), store);
        if let Some(timeout) = timeout {
            orchestrator = orchestrator.with_session_timeout(timeout);
        }
        let orchestrator = Arc::new(orchestrator);
        Self {
            orchestrator,
            llm,
            db,
            dir,
        }
    }

    /// One turn with the classifier scripted to answer `label`.
    pub async fn turn(&self, label: &str, utterance: &str, session_id: Option<&str>) -> AgentResponse {
        self.llm.push_label(label);
        self.orchestrator.process(utterance, session_id).await
    }

    /// A connected session id.
    pub async fn connected(&self) -> String {
        let response = self.turn("connection", "connect", None).await;
        assert!(response.success, "connect failed: {}", response.message);
        response.session_id.unwrap()
    }

    /// A connected session with `orders` selected.
    pub async fn with_orders(&self) -> String {
        let id = self.connected().await;
        let response = self.turn("exploration", "select orders", Some(&id)).await;
        assert!(response.success, "select failed: {}", response.message);
        id
    }
}

pub fn count_row(n: i64) -> JsonValue {
    json!({ "n": n })
}
