//! Oracle Database Runner
//!
//! Implements the [`DatabaseRunner`] contract for Oracle databases.
//!
//! # Features
//! - Service-name and SID connection targets
//! - Schema introspection via `user_tables` / `user_tab_columns`
//!
//! # Implementation Notes
//! - Uses the `oracle` crate (blocking driver); calls run on the blocking
//!   thread pool via `spawn_blocking`
//! - Values surface through their text representation, which the driver
//!   provides for every common column type
//! - Requires an Oracle client library at runtime

use crate::engine::{
    ColumnInfo, ConnectionDescriptor, DatabaseRunner, QueryRows, SchemaInfo, TableInfo,
};
use crate::error::{Result, SqlsightError};

/// Oracle runner holding validated connection parameters.
pub struct OracleRunner {
    user: String,
    password: String,
    dsn: String,
}

impl OracleRunner {
    /// Create a runner from an oracle descriptor.
    pub fn new(descriptor: ConnectionDescriptor) -> Result<Self> {
        let dsn = descriptor.oracle_dsn();
        match (descriptor, dsn) {
            (ConnectionDescriptor::Oracle { user, password, .. }, Some(dsn)) => {
                Ok(Self { user, password, dsn })
            }
            (other, _) => Err(SqlsightError::invalid_input(format!(
                "Expected oracle descriptor, got {}",
                other.engine()
            ))),
        }
    }
}

impl DatabaseRunner for OracleRunner {
    async fn execute(&self, sql: &str) -> Result<QueryRows> {
        let (user, password, dsn) = (self.user.clone(), self.password.clone(), self.dsn.clone());
        let sql = sql.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = connect(&user, &password, &dsn)?;
            run_statement(&conn, &sql)
        })
        .await
        .map_err(|e| SqlsightError::execution_failure(format!("Oracle worker task failed: {e}")))?
    }

    async fn introspect(&self, max_tables: usize) -> Result<SchemaInfo> {
        let (user, password, dsn) = (self.user.clone(), self.password.clone(), self.dsn.clone());

        tokio::task::spawn_blocking(move || {
            let conn = connect(&user, &password, &dsn)?;
            introspect_schema(&conn, max_tables)
        })
        .await
        .map_err(|e| SqlsightError::execution_failure(format!("Oracle worker task failed: {e}")))?
    }
}

fn connect(user: &str, password: &str, dsn: &str) -> Result<oracle::Connection> {
    oracle::Connection::connect(user, password, dsn).map_err(|e| {
        SqlsightError::connection_error(format!("Failed to connect to Oracle: {e}"))
    })
}

fn run_statement(conn: &oracle::Connection, sql: &str) -> Result<QueryRows> {
    let mut stmt = conn
        .statement(sql)
        .build()
        .map_err(|e| SqlsightError::execution_failure(format!("Failed to prepare query: {e}")))?;

    if !stmt.is_query() {
        // Statement without a result set
        stmt.execute(&[]).map_err(|e| {
            SqlsightError::execution_failure(format!("Failed to execute query: {e}"))
        })?;
        let rows_affected = stmt.row_count().map_err(|e| {
            SqlsightError::execution_failure(format!("Failed to read row count: {e}"))
        })?;
        return Ok(QueryRows {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: Some(rows_affected),
        });
    }

    let rows = stmt
        .query(&[])
        .map_err(|e| SqlsightError::execution_failure(format!("Failed to execute query: {e}")))?;

    let columns: Vec<String> = rows.column_info().iter().map(|c| c.name().to_string()).collect();

    let mut rows_data = Vec::new();
    for row_result in rows {
        let row = row_result
            .map_err(|e| SqlsightError::execution_failure(format!("Failed to fetch row: {e}")))?;

        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            // The driver renders every common column type as text; NULL stays NULL.
            let value: Option<String> = row.get(idx).map_err(|e| {
                SqlsightError::execution_failure(format!("Failed to read column {idx}: {e}"))
            })?;
            values.push(value.map_or(serde_json::Value::Null, serde_json::Value::String));
        }
        rows_data.push(values);
    }

    Ok(QueryRows { columns, rows: rows_data, rows_affected: None })
}

fn introspect_schema(conn: &oracle::Connection, max_tables: usize) -> Result<SchemaInfo> {
    let table_rows = conn
        .query(
            "SELECT table_name FROM user_tables WHERE ROWNUM <= :1 ORDER BY table_name",
            &[&(max_tables as i64)],
        )
        .map_err(|e| SqlsightError::execution_failure(format!("Failed to query tables: {e}")))?;

    let mut table_names = Vec::new();
    for row_result in table_rows {
        let row = row_result
            .map_err(|e| SqlsightError::execution_failure(format!("Failed to fetch table: {e}")))?;
        let name: String = row.get(0).map_err(|e| {
            SqlsightError::execution_failure(format!("Failed to read table name: {e}"))
        })?;
        table_names.push(name);
    }

    let mut tables = Vec::new();
    for table_name in table_names {
        let column_rows = conn
            .query(
                "SELECT column_name, data_type FROM user_tab_columns
                 WHERE table_name = :1 ORDER BY column_id",
                &[&table_name],
            )
            .map_err(|e| {
                SqlsightError::execution_failure(format!(
                    "Failed to query columns for {table_name}: {e}"
                ))
            })?;

        let mut columns = Vec::new();
        for row_result in column_rows {
            let row = row_result.map_err(|e| {
                SqlsightError::execution_failure(format!("Failed to fetch column: {e}"))
            })?;
            let name: String = row.get(0).map_err(|e| {
                SqlsightError::execution_failure(format!("Failed to read column name: {e}"))
            })?;
            let data_type: String = row.get(1).map_err(|e| {
                SqlsightError::execution_failure(format!("Failed to read column type: {e}"))
            })?;
            columns.push(ColumnInfo { name, data_type });
        }

        tables.push(TableInfo { name: table_name, columns });
    }

    Ok(SchemaInfo { tables })
}
