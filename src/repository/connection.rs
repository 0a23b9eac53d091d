//! Connection lifecycle.

use crate::db::DatabaseConnector;
use crate::error::{AppError, AppResult};
use crate::models::{ConnectionStatus, Credentials, DatabaseConnection};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Owns the authoritative [`DatabaseConnection`] records, keyed by id.
///
/// Sessions hold cloned snapshots. Live handles sit behind the connector
/// under the same id.
pub struct ConnectionRepository {
    connector: Arc<dyn DatabaseConnector>,
    connections: RwLock<HashMap<String, DatabaseConnection>>,
}

impl ConnectionRepository {
    pub fn new(connector: Arc<dyn DatabaseConnector>) -> Self {
        Self {
            connector,
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn connector(&self) -> &Arc<dyn DatabaseConnector> {
        &self.connector
    }

    /// Open a handle and register a `connected` record.
    ///
    /// Nothing is registered when the connector refuses the credentials.
    pub async fn create(&self, credentials: Credentials) -> AppResult<DatabaseConnection> {
        let mut connection = DatabaseConnection::new(credentials);
        let target = self
            .connector
            .open(&connection.id, &connection.credentials)
            .await?;

        if !target.catalog.is_empty() {
            connection.catalog = Some(target.catalog);
        }
        if !target.schema.is_empty() {
            connection.schema = Some(target.schema);
        }
        connection.server_version = target.server_version;
        connection.status = ConnectionStatus::Connected;
        connection.touch();

        self.connections
            .write()
            .await
            .insert(connection.id.clone(), connection.clone());
        info!(
            connection_id = %connection.id,
            db_type = %connection.db_type,
            catalog = ?connection.catalog,
            "Connection registered"
        );
        Ok(connection)
    }

    pub async fn get(&self, connection_id: &str) -> Option<DatabaseConnection> {
        self.connections.read().await.get(connection_id).cloned()
    }

    /// Ping the handle and record the outcome on the registered record.
    pub async fn test_connection(&self, connection_id: &str) -> AppResult<DatabaseConnection> {
        let outcome = self.connector.ping(connection_id).await;

        let mut connections = self.connections.write().await;
        let record = connections
            .get_mut(connection_id)
            .ok_or_else(|| AppError::connection_not_found(connection_id))?;
        match outcome {
            Ok(()) => {
                record.status = ConnectionStatus::Connected;
                record.error_message = None;
                record.touch();
                Ok(record.clone())
            }
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Connection test failed");
                record.mark_error(e.to_string());
                Err(e)
            }
        }
    }

    /// Close the handle and forget the record.
    pub async fn close(&self, connection_id: &str) -> AppResult<()> {
        let removed = self.connections.write().await.remove(connection_id);
        let closed = self.connector.close(connection_id).await;
        match (removed, closed) {
            (None, Err(e)) => Err(e),
            (_, Err(e)) => {
                // The record is gone either way; a handle that was already dropped is fine
                warn!(connection_id = %connection_id, error = %e, "Close reported an error");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub async fn close_all(&self) {
        self.connections.write().await.clear();
        self.connector.close_all().await;
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
