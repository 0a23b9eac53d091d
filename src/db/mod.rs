//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The [`DatabaseConnector`] collaborator contract
//! - Connection handle management (one single-connection pool per session)
//! - Statement execution with row limits and timeouts
//! - Schema introspection
//! - Type mappings

pub mod executor;
pub mod pool;
pub mod schema;
pub mod types;

pub use executor::QueryExecutor;
pub use pool::{DbPool, SqlxConnector};
pub use schema::{ConnectedTarget, SchemaInspector};

use crate::error::AppResult;
use crate::models::{Credentials, RowSet, TableMetadata};
use async_trait::async_trait;

/// Access to external data sources, addressed by connection id.
///
/// Every operation except `open` works against a handle that `open` already
/// established.
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    /// Establish a handle and report the catalog and schema it landed in.
    async fn open(&self, connection_id: &str, credentials: &Credentials)
    -> AppResult<ConnectedTarget>;

    async fn ping(&self, connection_id: &str) -> AppResult<()>;

    async fn close(&self, connection_id: &str) -> AppResult<()>;

    async fn close_all(&self);

    async fn list_catalogs(&self, connection_id: &str) -> AppResult<Vec<String>>;

    async fn list_schemas(&self, connection_id: &str, catalog: &str) -> AppResult<Vec<String>>;

    async fn list_tables(
        &self,
        connection_id: &str,
        catalog: &str,
        schema: &str,
    ) -> AppResult<Vec<TableMetadata>>;

    async fn describe_table(
        &self,
        connection_id: &str,
        catalog: &str,
        schema: &str,
        table: &str,
    ) -> AppResult<TableMetadata>;

    /// Run one statement. Reads return rows, writes return `rows_affected`.
    async fn execute(&self, connection_id: &str, sql: &str) -> AppResult<RowSet>;
}
