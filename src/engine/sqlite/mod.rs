//! `SQLite` Database Runner
//!
//! Implements the [`DatabaseRunner`] contract for `SQLite` databases.
//!
//! # Features
//! - File-based connections (`/path/to/db.sqlite`)
//! - In-memory connections (`:memory:`)
//! - Schema introspection via `sqlite_master` and PRAGMAs
//!
//! # Implementation Notes
//! - Uses `rusqlite` (synchronous driver; calls complete without yielding)
//! - BLOB data is Base64-encoded for JSON safety
//! - Connections are opened per call and closed on drop

use rusqlite::{Connection, OpenFlags, Row};
use std::path::PathBuf;

use crate::engine::{
    ColumnInfo, ConnectionDescriptor, DatabaseRunner, QueryRows, SchemaInfo, TableInfo,
};
use crate::error::{Result, SqlsightError};

/// `SQLite` runner holding the validated database path.
#[derive(Debug)]
pub struct SqliteRunner {
    path: PathBuf,
}

impl SqliteRunner {
    /// Create a runner from a sqlite descriptor.
    pub fn new(descriptor: ConnectionDescriptor) -> Result<Self> {
        match descriptor {
            ConnectionDescriptor::Sqlite { path } => Ok(Self { path }),
            other => Err(SqlsightError::invalid_input(format!(
                "Expected sqlite descriptor, got {}",
                other.engine()
            ))),
        }
    }

    fn open(&self) -> Result<Connection> {
        let path = self.path.to_str().ok_or_else(|| {
            SqlsightError::invalid_input("SQLite file path contains invalid UTF-8 characters")
        })?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        Connection::open_with_flags(path, flags).map_err(|e| {
            SqlsightError::connection_error(format!("Failed to open SQLite database: {e}"))
        })
    }
}

impl DatabaseRunner for SqliteRunner {
    async fn execute(&self, sql: &str) -> Result<QueryRows> {
        let conn = self.open()?;
        execute_query(&conn, sql)
    }

    async fn introspect(&self, max_tables: usize) -> Result<SchemaInfo> {
        let conn = self.open()?;

        // Query sqlite_master for user tables (exclude internal tables)
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table'
                 AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )
            .map_err(|e| {
                SqlsightError::execution_failure(format!("Failed to query tables: {e}"))
            })?;

        let table_names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| {
                SqlsightError::execution_failure(format!("Failed to fetch table names: {e}"))
            })?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(|e| {
                SqlsightError::execution_failure(format!("Failed to collect table names: {e}"))
            })?;

        let mut tables = Vec::new();
        for table_name in table_names.into_iter().take(max_tables) {
            tables.push(introspect_table(&conn, &table_name)?);
        }

        Ok(SchemaInfo { tables })
    }
}

/// Introspect a single table's columns via `PRAGMA table_info`
fn introspect_table(conn: &Connection, table_name: &str) -> Result<TableInfo> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table_name})")).map_err(|e| {
        SqlsightError::execution_failure(format!(
            "Failed to prepare table_info for {table_name}: {e}"
        ))
    })?;

    let columns: Vec<ColumnInfo> = stmt
        .query_map([], |row| {
            Ok(ColumnInfo { name: row.get::<_, String>(1)?, data_type: row.get::<_, String>(2)? })
        })
        .map_err(|e| {
            SqlsightError::execution_failure(format!(
                "Failed to query columns for {table_name}: {e}"
            ))
        })?
        .collect::<std::result::Result<Vec<ColumnInfo>, _>>()
        .map_err(|e| {
            SqlsightError::execution_failure(format!(
                "Failed to collect columns for {table_name}: {e}"
            ))
        })?;

    Ok(TableInfo { name: table_name.to_string(), columns })
}

/// Execute query and return `QueryRows`
fn execute_query(conn: &Connection, sql: &str) -> Result<QueryRows> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| SqlsightError::execution_failure(format!("Failed to prepare query: {e}")))?;

    let column_names: Vec<String> = stmt.column_names().iter().map(|s| (*s).to_string()).collect();

    if column_names.is_empty() {
        // Statement without a result set
        stmt.execute([]).map_err(|e| {
            SqlsightError::execution_failure(format!("Failed to execute query: {e}"))
        })?;

        return Ok(QueryRows {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: Some(conn.changes()),
        });
    }

    let rows = stmt
        .query([])
        .map_err(|e| SqlsightError::execution_failure(format!("Failed to execute query: {e}")))?;

    let mut rows_data = Vec::new();
    for row_result in rows.mapped(|row| row_to_json(&column_names, row)) {
        let row = row_result
            .map_err(|e| SqlsightError::execution_failure(format!("Failed to fetch row: {e}")))?;
        rows_data.push(row);
    }

    Ok(QueryRows { columns: column_names, rows: rows_data, rows_affected: None })
}

/// Convert a `SQLite` row to a JSON-safe `Vec`
fn row_to_json(
    column_names: &[String],
    row: &Row,
) -> std::result::Result<Vec<serde_json::Value>, rusqlite::Error> {
    let mut values = Vec::with_capacity(column_names.len());

    for idx in 0..column_names.len() {
        values.push(sqlite_value_to_json(row, idx)?);
    }

    Ok(values)
}

/// Convert a `SQLite` value to a JSON value
fn sqlite_value_to_json(
    row: &Row,
    idx: usize,
) -> std::result::Result<serde_json::Value, rusqlite::Error> {
    use rusqlite::types::ValueRef;

    let value_ref = row.get_ref(idx)?;

    Ok(match value_ref {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number), // NaN/Infinity as null
        ValueRef::Text(s) => {
            let text = std::str::from_utf8(s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            serde_json::Value::String(text.to_string())
        }
        ValueRef::Blob(b) => {
            // Encode BLOB as Base64 for JSON safety
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(b);
            serde_json::Value::String(encoded)
        }
    })
}
