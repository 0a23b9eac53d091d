//! Read-only catalog, schema and table enumeration.

use crate::db::DatabaseConnector;
use crate::error::AppResult;
use crate::models::{DatabaseConnection, TableMetadata};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct MetadataRepository {
    connector: Arc<dyn DatabaseConnector>,
}

impl MetadataRepository {
    pub fn new(connector: Arc<dyn DatabaseConnector>) -> Self {
        Self { connector }
    }

    pub async fn get_catalogs(&self, connection: &DatabaseConnection) -> AppResult<Vec<String>> {
        self.connector.list_catalogs(&connection.id).await
    }

    pub async fn get_schemas(
        &self,
        connection: &DatabaseConnection,
        catalog: &str,
    ) -> AppResult<Vec<String>> {
        self.connector.list_schemas(&connection.id, catalog).await
    }

    pub async fn get_tables(
        &self,
        connection: &DatabaseConnection,
        catalog: &str,
        schema: &str,
    ) -> AppResult<Vec<TableMetadata>> {
        let tables = self
            .connector
            .list_tables(&connection.id, catalog, schema)
            .await?;
        debug!(
            connection_id = %connection.id,
            catalog = %catalog,
            schema = %schema,
            count = tables.len(),
            "Listed tables"
        );
        Ok(tables)
    }

    /// Column-level detail for a listed table.
    ///
    /// Falls back to the listing entry when the table cannot be described.
    /// Row count, description and tags missing from the description are
    /// carried over from the listing.
    pub async fn get_table_metadata(
        &self,
        connection: &DatabaseConnection,
        listed: &TableMetadata,
    ) -> TableMetadata {
        match self
            .connector
            .describe_table(&connection.id, &listed.catalog, &listed.schema, &listed.name)
            .await
        {
            Ok(mut detailed) => {
                if detailed.row_count.is_none() {
                    detailed.row_count = listed.row_count;
                }
                if detailed.description.is_none() {
                    detailed.description = listed.description.clone();
                }
                detailed.tags.extend(listed.tags.iter().cloned());
                detailed
            }
            Err(e) => {
                warn!(table = %listed.name, error = %e, "Describe failed, using listing entry");
                listed.clone()
            }
        }
    }
}
