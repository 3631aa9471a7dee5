//! `PostgreSQL` Database Runner
//!
//! Implements the [`DatabaseRunner`] contract for `PostgreSQL` databases.
//!
//! # Features
//! - Client-server connections via TCP
//! - Schema introspection via `information_schema`
//! - Rich type system support (JSON/JSONB, timestamps, UUID, BYTEA)
//!
//! # Implementation Notes
//! - Uses `tokio-postgres` (async driver)
//! - Connections are opened per call; the connection task is spawned and
//!   dropped with the client
//! - BYTEA data is Base64-encoded for JSON safety
//! - Unrecognized types fall back to their text representation

use tokio_postgres::{Client, Config, NoTls, Row};

use crate::engine::{
    ColumnInfo, ConnectionDescriptor, DatabaseRunner, QueryRows, SchemaInfo, TableInfo,
};
use crate::error::{Result, SqlsightError};

/// `PostgreSQL` runner holding validated connection parameters.
#[derive(Debug)]
pub struct PostgresRunner {
    config: Config,
}

impl PostgresRunner {
    /// Create a runner from a postgres descriptor.
    pub fn new(descriptor: ConnectionDescriptor) -> Result<Self> {
        match descriptor {
            ConnectionDescriptor::Postgres { host, port, user, password, database } => {
                let mut config = Config::new();
                config.host(&host).port(port).user(&user).password(&password).dbname(&database);
                Ok(Self { config })
            }
            other => Err(SqlsightError::invalid_input(format!(
                "Expected postgres descriptor, got {}",
                other.engine()
            ))),
        }
    }

    async fn connect(&self) -> Result<Client> {
        let (client, connection) = self.config.connect(NoTls).await.map_err(|e| {
            SqlsightError::connection_error(format!("Failed to connect to PostgreSQL: {e}"))
        })?;

        // Note: connection errors are not logged to prevent credential leakage
        tokio::spawn(async move {
            let _ = connection.await;
        });

        Ok(client)
    }
}

impl DatabaseRunner for PostgresRunner {
    async fn execute(&self, sql: &str) -> Result<QueryRows> {
        let client = self.connect().await?;
        execute_query(&client, sql).await
    }

    async fn introspect(&self, max_tables: usize) -> Result<SchemaInfo> {
        let client = self.connect().await?;

        let table_rows = client
            .query(
                "SELECT table_name FROM information_schema.tables
                 WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
                 ORDER BY table_name
                 LIMIT $1",
                &[&(max_tables as i64)],
            )
            .await
            .map_err(|e| {
                SqlsightError::execution_failure(format!("Failed to query tables: {e}"))
            })?;

        let mut tables = Vec::new();
        for table_row in table_rows {
            let table_name: String = table_row.get(0);

            let column_rows = client
                .query(
                    "SELECT column_name, data_type FROM information_schema.columns
                     WHERE table_schema = 'public' AND table_name = $1
                     ORDER BY ordinal_position",
                    &[&table_name],
                )
                .await
                .map_err(|e| {
                    SqlsightError::execution_failure(format!(
                        "Failed to query columns for {table_name}: {e}"
                    ))
                })?;

            let columns = column_rows
                .iter()
                .map(|row| ColumnInfo { name: row.get(0), data_type: row.get(1) })
                .collect();

            tables.push(TableInfo { name: table_name, columns });
        }

        Ok(SchemaInfo { tables })
    }
}

/// Execute query and return `QueryRows`
async fn execute_query(client: &Client, sql: &str) -> Result<QueryRows> {
    let stmt = client
        .prepare(sql)
        .await
        .map_err(|e| SqlsightError::execution_failure(format!("Failed to prepare query: {e}")))?;

    if stmt.columns().is_empty() {
        // Statement without a result set
        let rows_affected = client.execute(&stmt, &[]).await.map_err(|e| {
            SqlsightError::execution_failure(format!("Failed to execute query: {e}"))
        })?;

        return Ok(QueryRows {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: Some(rows_affected),
        });
    }

    let rows = client
        .query(&stmt, &[])
        .await
        .map_err(|e| SqlsightError::execution_failure(format!("Failed to execute query: {e}")))?;

    let column_names: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();

    let mut rows_data = Vec::with_capacity(rows.len());
    for row in &rows {
        rows_data.push(row_to_json(&column_names, row)?);
    }

    Ok(QueryRows { columns: column_names, rows: rows_data, rows_affected: None })
}

/// Convert a `PostgreSQL` row to a JSON-safe `Vec`
fn row_to_json(column_names: &[String], row: &Row) -> Result<Vec<serde_json::Value>> {
    let mut values = Vec::with_capacity(column_names.len());

    for idx in 0..column_names.len() {
        values.push(postgres_value_to_json(row, idx)?);
    }

    Ok(values)
}

/// Convert a `PostgreSQL` value to a JSON value
fn postgres_value_to_json(row: &Row, idx: usize) -> Result<serde_json::Value> {
    use tokio_postgres::types::Type;

    let col_type = row.columns()[idx].type_();

    let get_err = |e: tokio_postgres::Error| {
        SqlsightError::execution_failure(format!(
            "Failed to read {} value: {e}",
            col_type.name()
        ))
    };

    let value = match *col_type {
        Type::BOOL => {
            let v: Option<bool> = row.try_get(idx).map_err(get_err)?;
            v.map_or(serde_json::Value::Null, serde_json::Value::Bool)
        }

        Type::INT2 => {
            let v: Option<i16> = row.try_get(idx).map_err(get_err)?;
            v.map_or(serde_json::Value::Null, |n| serde_json::Value::Number(n.into()))
        }
        Type::INT4 => {
            let v: Option<i32> = row.try_get(idx).map_err(get_err)?;
            v.map_or(serde_json::Value::Null, |n| serde_json::Value::Number(n.into()))
        }
        Type::INT8 => {
            let v: Option<i64> = row.try_get(idx).map_err(get_err)?;
            v.map_or(serde_json::Value::Null, |n| serde_json::Value::Number(n.into()))
        }

        Type::FLOAT4 => {
            let v: Option<f32> = row.try_get(idx).map_err(get_err)?;
            v.and_then(|n| serde_json::Number::from_f64(f64::from(n)))
                .map_or(serde_json::Value::Null, serde_json::Value::Number) // NaN/Infinity as null
        }
        Type::FLOAT8 => {
            let v: Option<f64> = row.try_get(idx).map_err(get_err)?;
            v.and_then(serde_json::Number::from_f64)
                .map_or(serde_json::Value::Null, serde_json::Value::Number) // NaN/Infinity as null
        }

        Type::JSON | Type::JSONB => {
            let v: Option<serde_json::Value> = row.try_get(idx).map_err(get_err)?;
            v.unwrap_or(serde_json::Value::Null)
        }

        Type::BYTEA => {
            let v: Option<Vec<u8>> = row.try_get(idx).map_err(get_err)?;
            match v {
                Some(bytes) => {
                    use base64::Engine;
                    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                    serde_json::Value::String(encoded)
                }
                None => serde_json::Value::Null,
            }
        }

        Type::TIMESTAMP => {
            let v: Option<chrono::NaiveDateTime> = row.try_get(idx).map_err(get_err)?;
            v.map_or(serde_json::Value::Null, |ts| {
                serde_json::Value::String(ts.format("%Y-%m-%dT%H:%M:%S").to_string())
            })
        }
        Type::TIMESTAMPTZ => {
            let v: Option<chrono::DateTime<chrono::Utc>> = row.try_get(idx).map_err(get_err)?;
            v.map_or(serde_json::Value::Null, |ts| serde_json::Value::String(ts.to_rfc3339()))
        }
        Type::DATE => {
            let v: Option<chrono::NaiveDate> = row.try_get(idx).map_err(get_err)?;
            v.map_or(serde_json::Value::Null, |d| {
                serde_json::Value::String(d.format("%Y-%m-%d").to_string())
            })
        }

        Type::UUID => {
            let v: Option<uuid::Uuid> = row.try_get(idx).map_err(get_err)?;
            v.map_or(serde_json::Value::Null, |u| serde_json::Value::String(u.to_string()))
        }

        // Text types and everything else: fall back to the string representation
        _ => {
            let v: Option<String> = row.try_get(idx).map_err(get_err)?;
            v.map_or(serde_json::Value::Null, serde_json::Value::String)
        }
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn postgres_descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor::Postgres {
            host: "localhost".to_string(),
            port: 5432,
            user: "svc".to_string(),
            password: "secret".to_string(),
            database: "analytics".to_string(),
        }
    }

    #[test]
    fn test_new_accepts_postgres_descriptor() {
        assert!(PostgresRunner::new(postgres_descriptor()).is_ok());
    }

    #[test]
    fn test_new_rejects_wrong_descriptor() {
        let descriptor =
            ConnectionDescriptor::Sqlite { path: std::path::PathBuf::from(":memory:") };
        let result = PostgresRunner::new(descriptor);
        assert!(result.is_err());
        assert!(result.unwrap_err().message().contains("Expected postgres descriptor"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_connection_error() {
        // Port 1 is never a listening PostgreSQL server
        let descriptor = ConnectionDescriptor::Postgres {
            host: "127.0.0.1".to_string(),
            port: 1,
            user: "svc".to_string(),
            password: "secret".to_string(),
            database: "analytics".to_string(),
        };
        let runner = PostgresRunner::new(descriptor).unwrap();
        let err = runner.execute("SELECT 1").await.unwrap_err();
        assert_eq!(err.error_code(), "CONNECTION_ERROR");
    }
}
