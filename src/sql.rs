//! Classification of generated SQL.
//!
//! Statements are parsed with [sqlparser](https://docs.rs/sqlparser/) using the
//! dialect of the connected database. Only a single statement is ever
//! accepted: a completion that smuggles a second statement behind a `;` is
//! classified as [`SqlStatementType::Multiple`] and never runs.

use crate::models::{DatabaseType, QueryKind};
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::{Parser, ParserError};

/// Category of a SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlStatementType {
    /// SELECT and other row-returning reads (WITH, SHOW, DESCRIBE, EXPLAIN, VALUES)
    Select,
    /// INSERT, UPDATE, DELETE, MERGE
    DmlWrite,
    /// CREATE, DROP, ALTER, TRUNCATE
    Ddl,
    /// More than one statement
    Multiple,
    /// Empty, unparseable, or a statement we do not run (SET, GRANT, BEGIN, ...)
    Unknown,
}

impl SqlStatementType {
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Select)
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Select | Self::DmlWrite | Self::Ddl)
    }
}

fn dialect_for(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Parse SQL text into statements with the dialect of `db_type`.
pub fn parse(sql: &str, db_type: DatabaseType) -> Result<Vec<Statement>, ParserError> {
    let dialect = dialect_for(db_type);
    Parser::parse_sql(dialect.as_ref(), sql)
}

/// The single statement in `sql`, or `None` when there are zero, several, or
/// it does not parse.
fn single_statement(sql: &str, db_type: DatabaseType) -> Option<Statement> {
    let mut statements = parse(sql, db_type).ok()?;
    if statements.len() == 1 {
        statements.pop()
    } else {
        None
    }
}

/// Classify SQL text.
pub fn classify(sql: &str, db_type: DatabaseType) -> SqlStatementType {
    match parse(sql, db_type) {
        Ok(statements) => match statements.as_slice() {
            [statement] => classify_statement(statement),
            [] => SqlStatementType::Unknown,
            _ => SqlStatementType::Multiple,
        },
        Err(_) => SqlStatementType::Unknown,
    }
}

fn classify_statement(statement: &Statement) -> SqlStatementType {
    match statement {
        Statement::Query(_)
        | Statement::ExplainTable { .. }
        | Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. } => SqlStatementType::Select,

        // EXPLAIN ANALYZE runs its statement, so it is only a read if that is
        Statement::Explain { statement, .. } => classify_statement(statement),

        Statement::Insert(_)
        | Statement::Update { .. }
        | Statement::Delete(_)
        | Statement::Merge { .. } => SqlStatementType::DmlWrite,

        Statement::CreateTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateIndex(_)
        | Statement::CreateSchema { .. }
        | Statement::AlterTable { .. }
        | Statement::AlterView { .. }
        | Statement::AlterIndex { .. }
        | Statement::Drop { .. }
        | Statement::Truncate { .. } => SqlStatementType::Ddl,

        _ => SqlStatementType::Unknown,
    }
}

/// Whether `sql` is exactly one statement of the kind a request asked for.
///
/// DELETE requests also accept TRUNCATE.
pub fn matches_kind(sql: &str, kind: QueryKind, db_type: DatabaseType) -> bool {
    let Some(statement) = single_statement(sql, db_type) else {
        return false;
    };
    match kind {
        QueryKind::Delete => matches!(
            statement,
            Statement::Delete(_) | Statement::Truncate { .. }
        ),
        QueryKind::Insert => matches!(statement, Statement::Insert(_)),
        QueryKind::Update => matches!(statement, Statement::Update { .. }),
        QueryKind::Select | QueryKind::Describe => classify_statement(&statement).is_read(),
    }
}

/// Pull the SQL statement out of an LLM completion.
///
/// Markdown code fences are removed and a single trailing semicolon is
/// dropped.
pub fn extract_sql(completion: &str) -> String {
    let trimmed = completion.trim();
    let body = match trimmed.find("```") {
        Some(start) => {
            let after = &trimmed[start + 3..];
            let after = match after.split_once('\n') {
                Some((lang, rest)) if lang.trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
                    rest
                }
                _ => after,
            };
            after.split("```").next().unwrap_or(after)
        }
        None => trimmed,
    };
    body.trim().trim_end_matches(';').trim_end().to_string()
}
