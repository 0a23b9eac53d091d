//! Natural language to SQL, and statement execution.

use crate::db::DatabaseConnector;
use crate::error::AppResult;
use crate::llm::LlmClient;
use crate::models::{DatabaseConnection, DatabaseType, QueryKind, QueryResult, SessionContext};
use crate::sql;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// History entries passed to the model as conversation context.
const RECENT_QUERY_CONTEXT: usize = 3;

pub struct QueryRepository {
    connector: Arc<dyn DatabaseConnector>,
    llm: Arc<dyn LlmClient>,
}

impl QueryRepository {
    pub fn new(connector: Arc<dyn DatabaseConnector>, llm: Arc<dyn LlmClient>) -> Self {
        Self { connector, llm }
    }

    /// Schema context handed to the model for SQL generation.
    pub fn schema_context(session: &SessionContext, kind: QueryKind) -> JsonValue {
        let (dialect, database, schema) = match &session.connection {
            Some(c) => (
                c.db_type.display_name(),
                c.current_catalog(),
                c.current_schema(),
            ),
            None => ("SQL", "", ""),
        };
        let recent: Vec<&str> = session
            .recent_queries(RECENT_QUERY_CONTEXT)
            .iter()
            .map(|q| q.sql_query.as_str())
            .collect();

        json!({
            "dialect": dialect,
            "database": database,
            "schema": schema,
            "tables": session.selected_tables,
            "dictionary": session.dictionary,
            "recent_queries": recent,
            "query_type": kind.keyword(),
        })
    }

    pub async fn generate_sql(
        &self,
        text: &str,
        session: &SessionContext,
        kind: QueryKind,
    ) -> AppResult<String> {
        let context = Self::schema_context(session, kind);
        let generated = self.llm.generate_sql(text, &context).await?;
        Ok(sql::extract_sql(&generated))
    }

    /// The text is exactly one statement of a kind we know how to run.
    pub fn validate_sql(sql: &str, db_type: DatabaseType) -> bool {
        sql::classify(sql, db_type).is_recognized()
    }

    /// Run a statement. Failures are reported inside the result.
    pub async fn execute(
        &self,
        sql: &str,
        connection: &DatabaseConnection,
        request_id: &str,
    ) -> QueryResult {
        let start = Instant::now();
        let outcome = self.connector.execute(&connection.id, sql).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(rows) => {
                info!(
                    connection_id = %connection.id,
                    row_count = rows.rows.len(),
                    rows_affected = ?rows.rows_affected,
                    execution_time_ms = elapsed_ms,
                    "Query executed"
                );
                QueryResult::from_rows(request_id, sql, rows, elapsed_ms)
            }
            Err(e) => {
                warn!(
                    connection_id = %connection.id,
                    error = %e,
                    execution_time_ms = elapsed_ms,
                    "Query failed"
                );
                QueryResult::failed(request_id, sql, e.to_string(), elapsed_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDescriptor, Credentials, RowSet, TableMetadata};

    #[test]
    fn test_validate_sql() {
        let pg = DatabaseType::PostgreSQL;
        assert!(QueryRepository::validate_sql("SELECT 1", pg));
        assert!(QueryRepository::validate_sql("with x as (select 1) select * from x", pg));
        assert!(QueryRepository::validate_sql("DELETE FROM t", pg));
        assert!(!QueryRepository::validate_sql("Sorry, I can't help with that", pg));
        assert!(!QueryRepository::validate_sql("", pg));
        assert!(!QueryRepository::validate_sql("SELECT 1; DELETE FROM t", pg));
    }

    #[test]
    fn test_schema_context() {
        let mut session = SessionContext::new();
        let mut conn = DatabaseConnection::new(Credentials {
            db_type: DatabaseType::MySQL,
            database: Some("shop".to_string()),
            ..Credentials::default()
        });
        conn.schema = Some("shop".to_string());
        session.connection = Some(conn);
        session.selected_tables = vec![
            TableMetadata::new("orders", "shop", "shop")
                .with_columns(vec![ColumnDescriptor::new("id", "int", false)]),
        ];
        for i in 0..5 {
            session.record_query(QueryResult::from_rows(
                "r",
                format!("SELECT {}", i),
                RowSet::default(),
                1,
            ));
        }

        let ctx = QueryRepository::schema_context(&session, QueryKind::Select);
        assert_eq!(ctx["dialect"], "MySQL");
        assert_eq!(ctx["database"], "shop");
        assert_eq!(ctx["tables"][0]["name"], "orders");
        assert_eq!(ctx["tables"][0]["columns"][0]["type"], "int");
        assert_eq!(
            ctx["recent_queries"],
            json!(["SELECT 2", "SELECT 3", "SELECT 4"])
        );
        assert_eq!(ctx["query_type"], "SELECT");
    }
}
