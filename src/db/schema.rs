//! Schema introspection module.
//!
//! This module enumerates catalogs, schemas and tables and describes table
//! columns for SQLite, PostgreSQL, and MySQL databases.
//!
//! # Architecture
//!
//! SQL queries are organized in the `queries` submodule with constants for each
//! database type. Database-specific implementations are in their respective
//! submodules (postgres, mysql, sqlite), each providing the same interface.
//!
//! Catalog and schema mean different things per engine. PostgreSQL has both.
//! MySQL treats a database as a schema, so a catalog has exactly one schema
//! of the same name. SQLite exposes attached databases (usually just
//! `main`) as catalogs, again with one schema each.

use crate::db::pool::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{ColumnDescriptor, TableMetadata};
use tracing::debug;

/// Where a fresh connection landed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectedTarget {
    pub catalog: String,
    pub schema: String,
    pub server_version: Option<String>,
}

/// Schema inspector for database introspection.
pub struct SchemaInspector;

impl SchemaInspector {
    /// Report the catalog and schema a connection is using.
    pub async fn current_target(pool: &DbPool) -> AppResult<ConnectedTarget> {
        match pool {
            DbPool::Postgres(p) => postgres::current_target(p).await,
            DbPool::MySql(p) => mysql::current_target(p).await,
            DbPool::SQLite(p) => sqlite::current_target(p).await,
        }
    }

    /// List catalogs (databases) visible to the connection.
    pub async fn list_catalogs(pool: &DbPool) -> AppResult<Vec<String>> {
        match pool {
            DbPool::Postgres(p) => postgres::list_catalogs(p).await,
            DbPool::MySql(p) => mysql::list_catalogs(p).await,
            DbPool::SQLite(p) => sqlite::list_catalogs(p).await,
        }
    }

    /// List schemas inside a catalog.
    pub async fn list_schemas(pool: &DbPool, catalog: &str) -> AppResult<Vec<String>> {
        match pool {
            DbPool::Postgres(p) => postgres::list_schemas(p, catalog).await,
            DbPool::MySql(_) | DbPool::SQLite(_) => Ok(vec![catalog.to_string()]),
        }
    }

    /// List tables and views in a schema.
    pub async fn list_tables(
        pool: &DbPool,
        catalog: &str,
        schema: &str,
    ) -> AppResult<Vec<TableMetadata>> {
        match pool {
            DbPool::Postgres(p) => postgres::list_tables(p, catalog, schema).await,
            DbPool::MySql(p) => mysql::list_tables(p, catalog, schema).await,
            DbPool::SQLite(p) => sqlite::list_tables(p, catalog).await,
        }
    }

    /// Describe a table's columns.
    pub async fn describe_table(
        pool: &DbPool,
        catalog: &str,
        schema: &str,
        table: &str,
    ) -> AppResult<TableMetadata> {
        let metadata = match pool {
            DbPool::Postgres(p) => postgres::describe_table(p, catalog, schema, table).await?,
            DbPool::MySql(p) => mysql::describe_table(p, catalog, schema, table).await?,
            DbPool::SQLite(p) => sqlite::describe_table(p, catalog, table).await?,
        };
        if metadata.columns.is_empty() {
            return Err(AppError::schema(
                format!("Table '{}' not found", table),
                table.to_string(),
            ));
        }
        Ok(metadata)
    }
}

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub mod postgres {
        pub const CURRENT_TARGET: &str =
            "SELECT current_database() AS catalog, current_schema() AS schema, version() AS version";

        pub const LIST_CATALOGS: &str = r#"
            SELECT datname AS name
            FROM pg_database
            WHERE datistemplate = false
            ORDER BY datname
            "#;

        pub const LIST_SCHEMAS: &str = r#"
            SELECT schema_name
            FROM information_schema.schemata
            WHERE catalog_name = $1
            AND schema_name NOT IN ('pg_catalog', 'information_schema')
            AND schema_name NOT LIKE 'pg_toast%'
            AND schema_name NOT LIKE 'pg_temp%'
            ORDER BY schema_name
            "#;

        pub const LIST_TABLES: &str = r#"
            SELECT
                t.table_name,
                s.n_live_tup AS row_count,
                obj_description((quote_ident($1) || '.' || quote_ident(t.table_name))::regclass) AS comment
            FROM information_schema.tables t
            LEFT JOIN pg_stat_user_tables s
                ON s.schemaname = t.table_schema AND s.relname = t.table_name
            WHERE t.table_schema = $1
            AND t.table_type IN ('BASE TABLE', 'VIEW')
            ORDER BY t.table_name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                c.column_name,
                format_type(a.atttypid, a.atttypmod) AS column_type,
                c.is_nullable,
                CASE WHEN pk.column_name IS NOT NULL THEN true ELSE false END AS is_primary_key,
                col_description(t.oid, a.attnum) AS column_comment
            FROM information_schema.columns c
            JOIN pg_class t ON t.relname = c.table_name
            JOIN pg_namespace n ON n.oid = t.relnamespace AND n.nspname = c.table_schema
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name
            LEFT JOIN (
                SELECT kcu.column_name
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name
                    AND tc.table_schema = kcu.table_schema
                WHERE tc.table_name = $1
                AND tc.table_schema = $2
                AND tc.constraint_type = 'PRIMARY KEY'
            ) pk ON c.column_name = pk.column_name
            WHERE c.table_name = $1 AND c.table_schema = $2
            ORDER BY c.ordinal_position
            "#;

        pub const TABLE_COMMENT: &str = r#"
            SELECT obj_description((quote_ident($2) || '.' || quote_ident($1))::regclass) AS comment
            "#;
    }

    pub mod mysql {
        pub const CURRENT_TARGET: &str =
            "SELECT CONVERT(DATABASE() USING utf8) AS catalog, CONVERT(VERSION() USING utf8) AS version";

        pub const LIST_CATALOGS: &str = "SHOW DATABASES";

        pub const LIST_TABLES: &str = r#"
            SELECT
                CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
                TABLE_ROWS AS ROW_COUNT,
                CONVERT(TABLE_COMMENT USING utf8) AS TABLE_COMMENT
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ?
            AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
            ORDER BY TABLE_NAME
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
            SELECT
                CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
                CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
                CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
                CONVERT(COLUMN_KEY USING utf8) AS COLUMN_KEY,
                CONVERT(COLUMN_COMMENT USING utf8) AS COLUMN_COMMENT
            FROM information_schema.columns
            WHERE TABLE_NAME = ? AND TABLE_SCHEMA = ?
            ORDER BY ORDINAL_POSITION
            "#;
    }

    pub mod sqlite {
        pub const LIST_CATALOGS: &str = "PRAGMA database_list";

        pub const LIST_TABLES: &str = r#"
            SELECT name, type FROM {catalog}.sqlite_master
            WHERE type IN ('table', 'view')
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;
    }
}

/// Quote an identifier with double quotes, doubling embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    pub async fn current_target(pool: &PgPool) -> AppResult<ConnectedTarget> {
        let row = sqlx::query(queries::postgres::CURRENT_TARGET)
            .fetch_one(pool)
            .await?;
        Ok(ConnectedTarget {
            catalog: row.try_get::<String, _>("catalog").unwrap_or_default(),
            schema: row
                .try_get::<Option<String>, _>("schema")
                .ok()
                .flatten()
                .unwrap_or_else(|| "public".to_string()),
            server_version: row.try_get::<String, _>("version").ok(),
        })
    }

    pub async fn list_catalogs(pool: &PgPool) -> AppResult<Vec<String>> {
        let rows = sqlx::query(queries::postgres::LIST_CATALOGS)
            .fetch_all(pool)
            .await?;
        let catalogs: Vec<String> = rows.iter().map(|row| row.get("name")).collect();
        debug!(count = catalogs.len(), "Listed PostgreSQL databases");
        Ok(catalogs)
    }

    pub async fn list_schemas(pool: &PgPool, catalog: &str) -> AppResult<Vec<String>> {
        let rows = sqlx::query(queries::postgres::LIST_SCHEMAS)
            .bind(catalog)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("schema_name")).collect())
    }

    pub async fn list_tables(
        pool: &PgPool,
        catalog: &str,
        schema: &str,
    ) -> AppResult<Vec<TableMetadata>> {
        let schema_name = if schema.is_empty() { "public" } else { schema };
        let rows = sqlx::query(queries::postgres::LIST_TABLES)
            .bind(schema_name)
            .fetch_all(pool)
            .await?;

        let tables = rows
            .iter()
            .map(|row| {
                let name: String = row.get("table_name");
                let mut table = TableMetadata::new(name, catalog, schema_name);
                if let Ok(Some(count)) = row.try_get::<Option<i64>, _>("row_count") {
                    table = table.with_row_count(count.max(0) as u64);
                }
                if let Ok(Some(comment)) = row.try_get::<Option<String>, _>("comment") {
                    table = table.with_description(comment);
                }
                table
            })
            .collect::<Vec<_>>();
        debug!(count = tables.len(), schema = schema_name, "Listed PostgreSQL tables");
        Ok(tables)
    }

    pub async fn describe_table(
        pool: &PgPool,
        catalog: &str,
        schema: &str,
        table: &str,
    ) -> AppResult<TableMetadata> {
        let schema_name = if schema.is_empty() { "public" } else { schema };
        let rows = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(table)
            .bind(schema_name)
            .fetch_all(pool)
            .await?;

        let columns = rows
            .iter()
            .map(|row| {
                let name: String = row.get("column_name");
                let column_type: String = row.try_get("column_type").unwrap_or_default();
                let nullable: String = row.try_get("is_nullable").unwrap_or_default();
                let is_pk: bool = row.try_get("is_primary_key").unwrap_or(false);
                let mut col =
                    ColumnDescriptor::new(name, column_type, nullable == "YES").with_primary_key(is_pk);
                if let Ok(Some(comment)) = row.try_get::<Option<String>, _>("column_comment") {
                    col = col.with_description(comment);
                }
                col
            })
            .collect();

        let comment: Option<String> = sqlx::query(queries::postgres::TABLE_COMMENT)
            .bind(table)
            .bind(schema_name)
            .fetch_one(pool)
            .await
            .ok()
            .and_then(|row| row.try_get::<Option<String>, _>("comment").ok().flatten());

        let mut metadata = TableMetadata::new(table, catalog, schema_name).with_columns(columns);
        if let Some(comment) = comment {
            metadata = metadata.with_description(comment);
        }
        Ok(metadata)
    }
}

mod mysql {
    use super::*;
    use sqlx::mysql::MySqlRow;
    use sqlx::{MySqlPool, Row};

    /// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
    fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    fn get_string(row: &MySqlRow, column: &str) -> String {
        get_optional_string(row, column).unwrap_or_default()
    }

    /// MySQL 5.x returns BIGINT, 8.x returns BIGINT UNSIGNED.
    fn try_get_u64(row: &MySqlRow, column: &str) -> Option<u64> {
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(column) {
            return Some(v);
        }
        row.try_get::<Option<i64>, _>(column)
            .ok()
            .flatten()
            .map(|v| v.max(0) as u64)
    }

    fn schema_or_catalog<'a>(catalog: &'a str, schema: &'a str) -> &'a str {
        if schema.is_empty() { catalog } else { schema }
    }

    pub async fn current_target(pool: &MySqlPool) -> AppResult<ConnectedTarget> {
        let row = sqlx::query(queries::mysql::CURRENT_TARGET)
            .fetch_one(pool)
            .await?;
        let catalog = get_string(&row, "catalog");
        Ok(ConnectedTarget {
            schema: catalog.clone(),
            catalog,
            server_version: get_optional_string(&row, "version"),
        })
    }

    pub async fn list_catalogs(pool: &MySqlPool) -> AppResult<Vec<String>> {
        let rows = sqlx::query(queries::mysql::LIST_CATALOGS)
            .fetch_all(pool)
            .await?;
        // SHOW DATABASES returns a single column "Database"
        let catalogs = rows
            .iter()
            .filter_map(|row| {
                row.try_get::<String, _>(0).ok().or_else(|| {
                    row.try_get::<Vec<u8>, _>(0)
                        .ok()
                        .and_then(|bytes| String::from_utf8(bytes).ok())
                })
            })
            .collect::<Vec<_>>();
        debug!(count = catalogs.len(), "Listed MySQL databases");
        Ok(catalogs)
    }

    pub async fn list_tables(
        pool: &MySqlPool,
        catalog: &str,
        schema: &str,
    ) -> AppResult<Vec<TableMetadata>> {
        let schema_name = schema_or_catalog(catalog, schema);
        let rows = sqlx::query(queries::mysql::LIST_TABLES)
            .bind(schema_name)
            .fetch_all(pool)
            .await?;

        let tables = rows
            .iter()
            .filter_map(|row| {
                let name = get_string(row, "TABLE_NAME");
                if name.is_empty() {
                    return None;
                }
                let mut table = TableMetadata::new(name, catalog, schema_name);
                if let Some(count) = try_get_u64(row, "ROW_COUNT") {
                    table = table.with_row_count(count);
                }
                if let Some(comment) = get_optional_string(row, "TABLE_COMMENT") {
                    table = table.with_description(comment);
                }
                Some(table)
            })
            .collect::<Vec<_>>();
        debug!(count = tables.len(), schema = schema_name, "Listed MySQL tables");
        Ok(tables)
    }

    pub async fn describe_table(
        pool: &MySqlPool,
        catalog: &str,
        schema: &str,
        table: &str,
    ) -> AppResult<TableMetadata> {
        let schema_name = schema_or_catalog(catalog, schema);
        let rows = sqlx::query(queries::mysql::DESCRIBE_COLUMNS)
            .bind(table)
            .bind(schema_name)
            .fetch_all(pool)
            .await?;

        let columns = rows
            .iter()
            .map(|row| {
                let mut col = ColumnDescriptor::new(
                    get_string(row, "COLUMN_NAME"),
                    get_string(row, "COLUMN_TYPE"),
                    get_string(row, "IS_NULLABLE") == "YES",
                )
                .with_primary_key(get_string(row, "COLUMN_KEY") == "PRI");
                if let Some(comment) = get_optional_string(row, "COLUMN_COMMENT") {
                    if !comment.is_empty() {
                        col = col.with_description(comment);
                    }
                }
                col
            })
            .collect();

        Ok(TableMetadata::new(table, catalog, schema_name).with_columns(columns))
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    pub async fn current_target(pool: &SqlitePool) -> AppResult<ConnectedTarget> {
        let version: Option<String> = sqlx::query("SELECT sqlite_version() AS version")
            .fetch_one(pool)
            .await
            .ok()
            .and_then(|row| row.try_get("version").ok());
        Ok(ConnectedTarget {
            catalog: "main".to_string(),
            schema: "main".to_string(),
            server_version: version,
        })
    }

    pub async fn list_catalogs(pool: &SqlitePool) -> AppResult<Vec<String>> {
        let rows = sqlx::query(queries::sqlite::LIST_CATALOGS)
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    fn catalog_or_main(catalog: &str) -> &str {
        if catalog.is_empty() { "main" } else { catalog }
    }

    pub async fn list_tables(pool: &SqlitePool, catalog: &str) -> AppResult<Vec<TableMetadata>> {
        let catalog = catalog_or_main(catalog);
        let sql = queries::sqlite::LIST_TABLES.replace("{catalog}", &quote_ident(catalog));
        let rows = sqlx::query(&sql).fetch_all(pool).await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.get("name");
            let kind: String = row.get("type");
            let mut table = TableMetadata::new(&name, catalog, catalog);
            if kind == "view" {
                table = table.with_tag("view");
            }
            if let Some(count) = count_rows(pool, catalog, &name).await {
                table = table.with_row_count(count);
            }
            tables.push(table);
        }
        debug!(count = tables.len(), "Listed SQLite tables");
        Ok(tables)
    }

    async fn count_rows(pool: &SqlitePool, catalog: &str, table: &str) -> Option<u64> {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {}.{}",
            quote_ident(catalog),
            quote_ident(table)
        );
        sqlx::query(&sql)
            .fetch_one(pool)
            .await
            .ok()
            .and_then(|row| row.try_get::<i64, _>("n").ok())
            .map(|n| n.max(0) as u64)
    }

    pub async fn describe_table(
        pool: &SqlitePool,
        catalog: &str,
        table: &str,
    ) -> AppResult<TableMetadata> {
        let catalog = catalog_or_main(catalog);
        let pragma = format!(
            "PRAGMA {}.table_info({})",
            quote_ident(catalog),
            quote_ident(table)
        );
        let rows = sqlx::query(&pragma).fetch_all(pool).await?;

        let columns = rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                let data_type: String = row.try_get("type").unwrap_or_default();
                let not_null: i64 = row.try_get("notnull").unwrap_or(0);
                let pk: i64 = row.try_get("pk").unwrap_or(0);
                ColumnDescriptor::new(name, data_type, not_null == 0).with_primary_key(pk > 0)
            })
            .collect();

        let mut metadata = TableMetadata::new(table, catalog, catalog).with_columns(columns);
        if let Some(count) = count_rows(pool, catalog, table).await {
            metadata = metadata.with_row_count(count);
        }
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
