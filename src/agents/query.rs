//! Natural-language questions and confirmed data changes.

use super::{Agent, has_word};
use crate::error::{AppError, AppResult};
use crate::format::format_as_table;
use crate::llm::LlmClient;
use crate::models::{
    AgentKind, AgentResponse, Intent, QueryKind, QueryRequest, QueryResult, SessionContext,
};
use crate::repository::QueryRepository;
use crate::sql::{self, SqlStatementType};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rows rendered inline in the response message.
pub const DISPLAY_ROWS: usize = 10;

const KIND_WORDS: &[(QueryKind, &[&str])] = &[
    (QueryKind::Insert, &["insert", "add", "create new", "put in"]),
    (QueryKind::Update, &["update", "modify", "change", "edit"]),
    (QueryKind::Delete, &["delete", "remove", "drop", "truncate"]),
    (QueryKind::Describe, &["describe", "explain", "show structure"]),
];

const CONFIRM_WORDS: &[&str] = &["confirm", "confirmed", "yes", "execute", "run"];

/// Sub-type of a question, by exact word. Defaults to SELECT.
pub fn detect_query_kind(text: &str) -> QueryKind {
    let text = text.to_lowercase();
    KIND_WORDS
        .iter()
        .find(|(_, words)| has_word(&text, words))
        .map(|(kind, _)| *kind)
        .unwrap_or(QueryKind::Select)
}

fn render_rows(result: &QueryResult) -> String {
    if result.is_empty() {
        return "Query executed successfully but returned no results.".to_string();
    }
    let shown = &result.rows[..result.rows.len().min(DISPLAY_ROWS)];
    let mut message = format!(
        "Query returned {} row(s):\n\n{}",
        result.row_count,
        format_as_table(&result.columns, shown, result.row_count, result.execution_time_ms)
    );
    if result.row_count > DISPLAY_ROWS {
        message.push_str(&format!(
            "\nShowing {} of {} total results.",
            DISPLAY_ROWS, result.row_count
        ));
    }
    if result.truncated {
        message.push_str("\nThe result hit the configured row limit; more rows may exist.");
    }
    message
}

pub struct QueryAgent {
    queries: Arc<QueryRepository>,
    llm: Arc<dyn LlmClient>,
}

impl QueryAgent {
    pub fn new(queries: Arc<QueryRepository>, llm: Arc<dyn LlmClient>) -> Self {
        Self { queries, llm }
    }

    async fn explain_error(&self, sql: &str, error: &str) -> String {
        let prompt = format!(
            "This SQL query failed:\n{}\n\nError: {}\n\nExplain the problem briefly and suggest a fix \
             the user could ask for.",
            sql, error
        );
        match self
            .llm
            .generate_response(&prompt, &json!({ "sql": sql, "error": error }))
            .await
        {
            Ok(explanation) => explanation,
            Err(e) => {
                warn!(error = %e, "Error explanation failed");
                error.to_string()
            }
        }
    }

    async fn suggest_rephrase(&self, question: &str, generated: &str) -> String {
        let prompt = format!(
            "The question \"{}\" could not be turned into a valid SQL statement (got: {}). \
             Suggest how the user could rephrase it.",
            question, generated
        );
        match self.llm.generate_response(&prompt, &json!({})).await {
            Ok(suggestion) => suggestion,
            Err(_) => "Try rephrasing the question and name the tables and columns you are \
                       interested in."
                .to_string(),
        }
    }

    async fn write(
        &self,
        request: &QueryRequest,
        session: &mut SessionContext,
        kind: QueryKind,
    ) -> AppResult<AgentResponse> {
        if !has_word(&request.normalized_text(), CONFIRM_WORDS) {
            return Ok(AgentResponse::failure(format!(
                "This request would {} data. Repeat it with 'confirm' to proceed, e.g. \
                 'confirm: {}'.",
                kind.keyword(),
                request.text
            ))
            .with_data("requires_confirmation", true)
            .with_data("query_type", kind.keyword()));
        }

        let Some(connection) = session.connection.clone() else {
            return Ok(not_ready());
        };
        let statement = match self.queries.generate_sql(&request.text, session, kind).await {
            Ok(statement) => statement,
            Err(e) => return Ok(generation_failure(&e, kind)),
        };
        if !sql::matches_kind(&statement, kind, connection.db_type) {
            return Ok(AgentResponse::failure(format!(
                "The generated SQL is not a single {} statement, so it was not run.",
                kind.keyword()
            ))
            .with_data("sql", statement)
            .with_data("query_type", kind.keyword()));
        }

        let result = self.queries.execute(&statement, &connection, &request.id).await;
        if !result.success {
            let error = result.error_message.clone().unwrap_or_default();
            let explanation = self.explain_error(&statement, &error).await;
            return Ok(failed_execution(result, explanation, kind));
        }

        let affected = result.rows_affected.unwrap_or(0);
        info!(
            session_id = %session.id,
            query_type = %kind,
            rows_affected = affected,
            "Write executed"
        );
        session.record_query(result.clone());
        Ok(AgentResponse::success(format!(
            "{} executed successfully. Rows affected: {}",
            kind.keyword(),
            affected
        ))
        .with_data("sql", statement)
        .with_data("query_type", kind.keyword())
        .with_data("rows_affected", affected)
        .with_serialized("query_result", &result))
    }

    async fn read(
        &self,
        request: &QueryRequest,
        session: &mut SessionContext,
        kind: QueryKind,
    ) -> AppResult<AgentResponse> {
        let Some(connection) = session.connection.clone() else {
            return Ok(not_ready());
        };
        let cached = session.sql_cache.get(&request.text).map(|hit| hit.sql.clone());
        let from_cache = cached.is_some();
        let statement = match cached {
            Some(statement) => {
                debug!(session_id = %session.id, "Reusing cached SQL");
                statement
            }
            None => match self.queries.generate_sql(&request.text, session, kind).await {
                Ok(statement) => statement,
                Err(e) => return Ok(generation_failure(&e, kind)),
            },
        };

        let statement_type = sql::classify(&statement, connection.db_type);
        if statement_type == SqlStatementType::Multiple {
            warn!(session_id = %session.id, "Refused generated SQL with several statements");
            return Ok(AgentResponse::failure(
                "The generated SQL holds more than one statement. Only a single query can run, \
                 so nothing was executed. Try asking one question at a time.",
            )
            .with_data("sql", statement)
            .with_data("query_type", kind.keyword()));
        }
        if !QueryRepository::validate_sql(&statement, connection.db_type) {
            let suggestion = self.suggest_rephrase(&request.text, &statement).await;
            return Ok(AgentResponse::failure(format!(
                "I couldn't generate a valid SQL query for that.\n\n{}",
                suggestion
            ))
            .with_data("sql", statement)
            .with_data("query_type", kind.keyword()));
        }
        if !statement_type.is_read() {
            warn!(session_id = %session.id, "Refused modifying statement for a read request");
            return Ok(AgentResponse::failure(
                "The generated statement would modify data, but the request reads data. It was not \
                 run. Say 'confirm' with an explicit insert, update or delete request to change data.",
            )
            .with_data("sql", statement)
            .with_data("query_type", kind.keyword()));
        }

        let result = self.queries.execute(&statement, &connection, &request.id).await;
        if !result.success {
            let error = result.error_message.clone().unwrap_or_default();
            let explanation = self.explain_error(&statement, &error).await;
            return Ok(failed_execution(result, explanation, kind));
        }

        if !from_cache {
            session
                .sql_cache
                .insert(&request.text, Intent::Query, kind, statement.clone());
        }
        session.record_query(result.clone());
        Ok(AgentResponse::success(render_rows(&result))
            .with_data("sql", statement)
            .with_data("query_type", kind.keyword())
            .with_data("cached", from_cache)
            .with_serialized("query_result", &result))
    }
}

fn failed_execution(result: QueryResult, explanation: String, kind: QueryKind) -> AgentResponse {
    let error = result.error_message.clone().unwrap_or_default();
    AgentResponse::failure(format!("Query failed: {}", explanation))
        .with_data("sql", result.sql_query.clone())
        .with_data("query_type", kind.keyword())
        .with_data("error", error)
        .with_serialized("query_result", &result)
}

fn generation_failure(err: &AppError, kind: QueryKind) -> AgentResponse {
    warn!(error = %err, "SQL generation failed");
    let mut response = AgentResponse::failure(format!("Failed to generate SQL: {}", err))
        .with_data("error", err.to_string())
        .with_data("query_type", kind.keyword());
    if let Some(suggestion) = err.suggestion() {
        response = response.with_note(format!("Suggestion: {}", suggestion));
    }
    response
}

fn not_ready() -> AgentResponse {
    AgentResponse::failure(
        "Connect to a database and select the tables to query first, e.g. 'connect' then \
         'select orders'.",
    )
}

#[async_trait]
impl Agent for QueryAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Query
    }

    async fn execute(
        &self,
        request: &QueryRequest,
        session: &mut SessionContext,
    ) -> AppResult<AgentResponse> {
        if !session.is_connected() {
            return Ok(AgentResponse::failure(
                "Not connected to a database. Say 'connect' first.",
            ));
        }
        if !session.has_selected_tables() {
            return Ok(AgentResponse::failure(
                "No tables selected. Say 'show tables' and then 'select <table>' before asking questions.",
            ));
        }

        let kind = detect_query_kind(&request.text);
        if kind.is_write() {
            self.write(request, session, kind).await
        } else {
            self.read(request, session, kind).await
        }
    }
}
