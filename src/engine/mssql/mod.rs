//! SQL Server Database Runner
//!
//! Implements the [`DatabaseRunner`] contract for Microsoft SQL Server.
//!
//! # Features
//! - TCP connections with SQL Server authentication
//! - Schema introspection via `INFORMATION_SCHEMA`
//!
//! # Implementation Notes
//! - Uses `tiberius` (async TDS driver) over a tokio `TcpStream`
//! - Certificate trust is unconditional (`trust_cert`); the descriptor's
//!   ODBC driver name is carried for URL rendering only, TDS needs no ODBC
//! - Binary data is Base64-encoded for JSON safety
//! - Temporal values are rendered through the driver's chrono conversions

use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::engine::{
    ColumnInfo, ConnectionDescriptor, DatabaseRunner, QueryRows, SchemaInfo, TableInfo,
};
use crate::error::{Result, SqlsightError};

/// SQL Server runner holding validated connection parameters.
pub struct MssqlRunner {
    host: String,
    port: u16,
    user: String,
    password: String,
    database: String,
}

impl MssqlRunner {
    /// Create a runner from an mssql descriptor.
    pub fn new(descriptor: ConnectionDescriptor) -> Result<Self> {
        match descriptor {
            ConnectionDescriptor::Mssql { host, port, user, password, database, .. } => {
                Ok(Self { host, port, user, password, database })
            }
            other => Err(SqlsightError::invalid_input(format!(
                "Expected mssql descriptor, got {}",
                other.engine()
            ))),
        }
    }

    async fn connect(&self) -> Result<Client<Compat<TcpStream>>> {
        let mut config = Config::new();
        config.host(&self.host);
        config.port(self.port);
        config.database(&self.database);
        config.authentication(AuthMethod::sql_server(&self.user, &self.password));
        config.trust_cert();

        let tcp = TcpStream::connect(config.get_addr()).await.map_err(|e| {
            SqlsightError::connection_error(format!("Failed to connect to SQL Server: {e}"))
        })?;
        tcp.set_nodelay(true).map_err(|e| {
            SqlsightError::connection_error(format!("Failed to configure socket: {e}"))
        })?;

        Client::connect(config, tcp.compat_write()).await.map_err(|e| {
            SqlsightError::connection_error(format!("Failed to connect to SQL Server: {e}"))
        })
    }
}

impl DatabaseRunner for MssqlRunner {
    async fn execute(&self, sql: &str) -> Result<QueryRows> {
        let mut client = self.connect().await?;

        let mut stream = client.simple_query(sql).await.map_err(|e| {
            SqlsightError::execution_failure(format!("Failed to execute query: {e}"))
        })?;

        let columns: Vec<String> = stream
            .columns()
            .await
            .map_err(|e| {
                SqlsightError::execution_failure(format!("Failed to read result columns: {e}"))
            })?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let results = stream.into_results().await.map_err(|e| {
            SqlsightError::execution_failure(format!("Failed to fetch rows: {e}"))
        })?;

        // simple_query yields one result set per statement; we send one statement
        let rows = results.into_iter().next().unwrap_or_default();

        let rows_data: Vec<Vec<serde_json::Value>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(mssql_value_to_json).collect())
            .collect();

        Ok(QueryRows { columns, rows: rows_data, rows_affected: None })
    }

    async fn introspect(&self, max_tables: usize) -> Result<SchemaInfo> {
        let table_query = format!(
            "SELECT TOP {max_tables} TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME"
        );
        let table_rows = self.execute(&table_query).await?;

        let table_names: Vec<String> = table_rows
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(|v| v.as_str().map(str::to_string)))
            .collect();

        let mut tables = Vec::new();
        for table_name in table_names {
            let column_query = format!(
                "SELECT COLUMN_NAME, DATA_TYPE FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_NAME = '{}' ORDER BY ORDINAL_POSITION",
                table_name.replace('\'', "''")
            );
            let column_rows = self.execute(&column_query).await?;

            let columns = column_rows
                .rows
                .iter()
                .filter_map(|row| {
                    let name = row.first()?.as_str()?.to_string();
                    let data_type = row.get(1)?.as_str()?.to_string();
                    Some(ColumnInfo { name, data_type })
                })
                .collect();

            tables.push(TableInfo { name: table_name, columns });
        }

        Ok(SchemaInfo { tables })
    }
}

/// Convert a TDS column value to a JSON value
fn mssql_value_to_json(data: ColumnData<'_>) -> serde_json::Value {
    match data {
        ColumnData::U8(v) => v.map_or(serde_json::Value::Null, |n| serde_json::json!(n)),
        ColumnData::I16(v) => v.map_or(serde_json::Value::Null, |n| serde_json::json!(n)),
        ColumnData::I32(v) => v.map_or(serde_json::Value::Null, |n| serde_json::json!(n)),
        ColumnData::I64(v) => v.map_or(serde_json::Value::Null, |n| serde_json::json!(n)),

        ColumnData::F32(v) => v
            .and_then(|n| serde_json::Number::from_f64(f64::from(n)))
            .map_or(serde_json::Value::Null, serde_json::Value::Number), // NaN/Infinity as null
        ColumnData::F64(v) => v
            .and_then(serde_json::Number::from_f64)
            .map_or(serde_json::Value::Null, serde_json::Value::Number), // NaN/Infinity as null

        ColumnData::Bit(v) => v.map_or(serde_json::Value::Null, serde_json::Value::Bool),

        ColumnData::String(v) => {
            v.map_or(serde_json::Value::Null, |s| serde_json::Value::String(s.into_owned()))
        }

        ColumnData::Guid(v) => {
            v.map_or(serde_json::Value::Null, |g| serde_json::Value::String(g.to_string()))
        }

        ColumnData::Binary(v) => match v {
            Some(bytes) => {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes.as_ref());
                serde_json::Value::String(encoded)
            }
            None => serde_json::Value::Null,
        },

        ColumnData::Numeric(v) => {
            v.map_or(serde_json::Value::Null, |n| serde_json::Value::String(n.to_string()))
        }

        // Temporal and remaining types: go through the driver's chrono conversions
        other => {
            if let Ok(Some(ts)) = chrono::NaiveDateTime::from_sql(&other) {
                serde_json::Value::String(ts.format("%Y-%m-%dT%H:%M:%S").to_string())
            } else if let Ok(Some(date)) = chrono::NaiveDate::from_sql(&other) {
                serde_json::Value::String(date.format("%Y-%m-%d").to_string())
            } else {
                serde_json::Value::Null
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mssql_descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor::Mssql {
            host: "db.internal".to_string(),
            port: 1433,
            user: "sa".to_string(),
            password: "secret".to_string(),
            database: "sales".to_string(),
            driver: crate::engine::DEFAULT_MSSQL_DRIVER.to_string(),
        }
    }

    #[test]
    fn test_new_accepts_mssql_descriptor() {
        assert!(MssqlRunner::new(mssql_descriptor()).is_ok());
    }

    #[test]
    fn test_new_rejects_wrong_descriptor() {
        let descriptor =
            ConnectionDescriptor::Sqlite { path: std::path::PathBuf::from(":memory:") };
        let result = MssqlRunner::new(descriptor);
        assert!(result.is_err());
        assert!(result.unwrap_err().message().contains("Expected mssql descriptor"));
    }

    #[test]
    fn test_value_conversion_primitives() {
        assert_eq!(mssql_value_to_json(ColumnData::I32(Some(7))), serde_json::json!(7));
        assert_eq!(mssql_value_to_json(ColumnData::I32(None)), serde_json::Value::Null);
        assert_eq!(mssql_value_to_json(ColumnData::Bit(Some(true))), serde_json::json!(true));
        assert_eq!(
            mssql_value_to_json(ColumnData::String(Some("abc".into()))),
            serde_json::json!("abc")
        );
    }
}
