//! Data models for the orchestrator.
//!
//! This module re-exports all model types used throughout the application.

pub mod cache;
pub mod connection;
pub mod metadata;
pub mod query;
pub mod response;
pub mod session;

// Re-export commonly used types
pub use cache::{CachedSql, SQL_CACHE_CAPACITY, SqlCache};
pub use connection::{
    ConnectionConfigError, ConnectionStatus, Credentials, DatabaseConnection, DatabaseType,
};
pub use metadata::{ColumnDescriptor, TableMetadata};
pub use query::{Intent, QueryKind, QueryRequest, QueryResult, RowSet};
pub use response::{AgentKind, AgentResponse};
pub use session::SessionContext;
