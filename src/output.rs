//! JSON Output Envelope Types
//!
//! This module defines the structured JSON output format shared by the CLI
//! and the HTTP surface. Every operation returns either a `SuccessEnvelope`
//! or an `ErrorEnvelope`.
//!
//! # Output Contract
//! - Success: `{"ok": true, "engine": "...", "operation": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "engine": "...", "operation": "...", "error": {"code": "...", "message": "..."}}`
//!
//! Output is stable and suitable for programmatic parsing by UI collaborators.

use serde::{Deserialize, Serialize};

use crate::error::SqlsightError;

/// Success envelope for operation results
///
/// Generic over the data type to support different operation return values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Database engine active for this operation (sqlite, oracle, postgres, mssql)
    pub engine: String,

    /// Operation that was executed (generate, execute, answer, explain, ...)
    pub operation: String,

    /// Operation-specific data
    pub data: T,

    /// Execution metadata
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    /// Create a new success envelope
    pub fn new(
        engine: impl Into<String>,
        operation: impl Into<String>,
        data: T,
        meta: Metadata,
    ) -> Self {
        Self { ok: true, engine: engine.into(), operation: operation.into(), data, meta }
    }
}

/// Error envelope for operation failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    /// Database engine (empty string if not engine-specific)
    pub engine: String,

    /// Operation that was attempted
    pub operation: String,

    /// Error information
    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    /// Create a new error envelope
    pub fn new(engine: impl Into<String>, operation: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, engine: engine.into(), operation: operation.into(), error }
    }

    /// Create error envelope from a `SqlsightError`
    pub fn from_error(
        engine: impl Into<String>,
        operation: impl Into<String>,
        err: &SqlsightError,
    ) -> Self {
        Self::new(
            engine,
            operation,
            ErrorInfo { code: err.error_code().to_string(), message: err.message() },
        )
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "DANGEROUS_OPERATION", "EXECUTION_FAILURE")
    pub code: String,

    /// Human-readable error message (no credentials or sensitive data)
    pub message: String,
}

impl ErrorInfo {
    /// Create a new error info
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    /// Number of rows returned (query results only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,

    /// Whether the result was served from the cache
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
}

impl Metadata {
    /// Create new metadata with just execution time
    #[must_use]
    pub fn new(execution_ms: u64) -> Self {
        Self { execution_ms, row_count: None, cached: false }
    }

    /// Create new metadata with execution time and row count
    #[must_use]
    pub fn with_rows(execution_ms: u64, row_count: usize) -> Self {
        Self { execution_ms, row_count: Some(row_count), cached: false }
    }

    /// Mark the result as served from the cache
    #[must_use]
    pub fn from_cache(mut self) -> Self {
        self.cached = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_serialization() {
        let envelope = SuccessEnvelope::new(
            "postgres",
            "execute",
            serde_json::json!({"result": "test"}),
            Metadata::with_rows(42, 10),
        );

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""ok":true"#));
        assert!(json.contains(r#""engine":"postgres"#));
        assert!(json.contains(r#""operation":"execute"#));
        assert!(json.contains(r#""execution_ms":42"#));
        assert!(json.contains(r#""row_count":10"#));
    }

    #[test]
    fn test_error_envelope_serialization() {
        let envelope = ErrorEnvelope::new(
            "sqlite",
            "execute",
            ErrorInfo::new("EXECUTION_FAILURE", "no such table: customers"),
        );

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""ok":false"#));
        assert!(json.contains(r#""engine":"sqlite"#));
        assert!(json.contains(r#""code":"EXECUTION_FAILURE"#));
        assert!(json.contains(r#""message":"no such table: customers"#));
    }

    #[test]
    fn test_error_envelope_from_sqlsight_error() {
        let err = SqlsightError::dangerous_operation("DROP");
        let envelope = ErrorEnvelope::from_error("sqlite", "execute", &err);

        assert!(!envelope.ok);
        assert_eq!(envelope.engine, "sqlite");
        assert_eq!(envelope.operation, "execute");
        assert_eq!(envelope.error.code, "DANGEROUS_OPERATION");
        assert!(envelope.error.message.contains("DROP"));
    }

    #[test]
    fn test_metadata_without_rows() {
        let meta = Metadata::new(100);
        let json = serde_json::to_string(&meta).unwrap();

        assert!(json.contains(r#""execution_ms":100"#));
        // row_count and cached are omitted when unset
        assert!(!json.contains("row_count"));
        assert!(!json.contains("cached"));
    }

    #[test]
    fn test_metadata_cached_flag() {
        let meta = Metadata::with_rows(5, 1).from_cache();
        let json = serde_json::to_string(&meta).unwrap();

        assert!(json.contains(r#""cached":true"#));
        assert!(json.contains(r#""row_count":1"#));
    }
}
