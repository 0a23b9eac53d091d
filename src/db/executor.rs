//! Statement execution engine.
//!
//! This module runs generated SQL with:
//! - Row limits (enforced via streaming, only fetching `limit + 1` rows)
//! - Statement timeouts
//! - Affected-row counts for writes
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules
//! (`mysql`, `postgres`, `sqlite`). Each submodule provides identical
//! functionality adapted to the database's row type.

use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::error::{AppError, AppResult};
use crate::models::RowSet;
use crate::sql::{self, SqlStatementType};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Executes one statement at a time against a [`DbPool`].
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    row_limit: u32,
    query_timeout: Duration,
}

impl QueryExecutor {
    pub fn new(row_limit: u32, query_timeout: Duration) -> Self {
        Self {
            // A zero limit would mark every non-empty result as truncated
            row_limit: row_limit.max(1),
            query_timeout,
        }
    }

    pub fn row_limit(&self) -> u32 {
        self.row_limit
    }

    /// Execute a statement.
    ///
    /// Reads stream at most `row_limit` rows. Text holding several
    /// statements is refused. Everything else runs through `execute` and
    /// reports the affected-row count.
    pub async fn execute(&self, pool: &DbPool, sql: &str) -> AppResult<RowSet> {
        match sql::classify(sql, pool.db_type()) {
            SqlStatementType::Select => self.fetch(pool, sql).await,
            SqlStatementType::Multiple => {
                warn!(sql = %sql, "Rejected text with more than one statement");
                Err(AppError::invalid_input(
                    "Only one SQL statement can run at a time",
                ))
            }
            _ => self.execute_write(pool, sql).await,
        }
    }

    async fn fetch(&self, pool: &DbPool, sql: &str) -> AppResult<RowSet> {
        debug!(
            sql = %sql,
            limit = self.row_limit,
            timeout_secs = self.query_timeout.as_secs(),
            "Executing query"
        );

        match pool {
            DbPool::MySql(p) => {
                let rows = mysql::fetch_rows(p, sql, self.row_limit, self.query_timeout).await?;
                Ok(process_rows(rows, self.row_limit))
            }
            DbPool::Postgres(p) => {
                let rows = postgres::fetch_rows(p, sql, self.row_limit, self.query_timeout).await?;
                Ok(process_rows(rows, self.row_limit))
            }
            DbPool::SQLite(p) => {
                let rows = sqlite::fetch_rows(p, sql, self.row_limit, self.query_timeout).await?;
                Ok(process_rows(rows, self.row_limit))
            }
        }
    }

    async fn execute_write(&self, pool: &DbPool, sql: &str) -> AppResult<RowSet> {
        debug!(
            sql = %sql,
            timeout_secs = self.query_timeout.as_secs(),
            "Executing write operation"
        );

        let rows_affected = match pool {
            DbPool::MySql(p) => mysql::execute_write(p, sql, self.query_timeout).await?,
            DbPool::Postgres(p) => postgres::execute_write(p, sql, self.query_timeout).await?,
            DbPool::SQLite(p) => sqlite::execute_write(p, sql, self.query_timeout).await?,
        };

        Ok(RowSet {
            rows_affected: Some(rows_affected),
            ..RowSet::default()
        })
    }
}

/// Process rows from any database type into a RowSet.
fn process_rows<R: RowToJson>(rows: Vec<R>, row_limit: u32) -> RowSet {
    let Some(first) = rows.first() else {
        return RowSet::default();
    };

    let columns = first.column_names();
    let total_rows = rows.len();
    let truncated = total_rows > row_limit as usize;

    if truncated {
        warn!(
            total_rows = total_rows,
            limit = row_limit,
            "Query result truncated"
        );
    }

    RowSet {
        columns,
        rows: rows
            .iter()
            .take(row_limit as usize)
            .map(RowToJson::to_json_map)
            .collect(),
        rows_affected: None,
        truncated,
    }
}

// =============================================================================
// Common Helper Functions
// =============================================================================

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> AppResult<Vec<R>> {
    results
        .into_iter()
        .map(|r| r.map_err(AppError::from))
        .collect()
}

fn timeout_error(operation: &str, timeout: Duration) -> AppError {
    AppError::timeout(operation, timeout.as_secs())
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Raw SQL goes through the pool's `Executor` impl rather than a prepared
// statement, because generated statements never carry bind parameters.

mod mysql {
    use super::*;
    use sqlx::Executor;
    use sqlx::MySqlPool;
    use sqlx::mysql::MySqlRow;

    pub async fn fetch_rows(
        pool: &MySqlPool,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> AppResult<Vec<MySqlRow>> {
        let fetch_limit = row_limit as usize + 1;
        let rows_future = pool.fetch(sql).take(fetch_limit).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute_write(
        pool: &MySqlPool,
        sql: &str,
        query_timeout: Duration,
    ) -> AppResult<u64> {
        match timeout(query_timeout, pool.execute(sql)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(AppError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::Executor;
    use sqlx::PgPool;
    use sqlx::postgres::PgRow;

    pub async fn fetch_rows(
        pool: &PgPool,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> AppResult<Vec<PgRow>> {
        let fetch_limit = row_limit as usize + 1;
        let rows_future = pool.fetch(sql).take(fetch_limit).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute_write(
        pool: &PgPool,
        sql: &str,
        query_timeout: Duration,
    ) -> AppResult<u64> {
        match timeout(query_timeout, pool.execute(sql)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(AppError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::Executor;
    use sqlx::SqlitePool;
    use sqlx::sqlite::SqliteRow;

    pub async fn fetch_rows(
        pool: &SqlitePool,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> AppResult<Vec<SqliteRow>> {
        let fetch_limit = row_limit as usize + 1;
        let rows_future = pool.fetch(sql).take(fetch_limit).collect::<Vec<_>>();

        match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        }
    }

    pub async fn execute_write(
        pool: &SqlitePool,
        sql: &str,
        query_timeout: Duration,
    ) -> AppResult<u64> {
        match timeout(query_timeout, pool.execute(sql)).await {
            Ok(Ok(r)) => Ok(r.rows_affected()),
            Ok(Err(e)) => Err(AppError::from(e)),
            Err(_) => Err(timeout_error("write operation", query_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executor_settings() {
        let executor = QueryExecutor::new(500, Duration::from_secs(60));
        assert_eq!(executor.row_limit(), 500);
        assert_eq!(executor.query_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_executor_zero_limit_clamped() {
        let executor = QueryExecutor::new(0, Duration::from_secs(1));
        assert_eq!(executor.row_limit(), 1);
    }
}
