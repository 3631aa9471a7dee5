//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout Sqlsight.
//! All errors are structured and map to stable error codes for JSON output.
//!
//! # Error Categories
//! - `MissingConfiguration` / `InvalidConfiguration`: startup validation failures (fatal)
//! - `UnsupportedEngine`: unknown engine kind selector (fatal)
//! - `DangerousOperation`: SQL rejected by the safety gate before execution
//! - `GenerationFailure`: language-model collaborator call failed
//! - `ExecutionFailure`: database driver reported an error
//! - `CacheUnavailable`: result cache store unreachable (degrades, never fatal)
//! - `AuthenticationRequired` / `Unauthorized` / `AccessDenied` / `NotFound`: auth boundary
//! - `Timeout` / `ConnectionError`: transient transport failures (retried)
//! - `InvalidInput`: malformed request payloads

use thiserror::Error;

/// Main error type for Sqlsight operations
#[derive(Error, Debug)]
pub enum SqlsightError {
    /// A required configuration key is absent
    #[error("Missing required configuration: {key}")]
    MissingConfiguration { key: String },

    /// A configuration key is present but unusable
    #[error("Invalid configuration for {key}: {detail}")]
    InvalidConfiguration { key: String, detail: String },

    /// Engine kind selector does not name a supported engine
    #[error("Unsupported database engine '{0}'. Valid options: sqlite, oracle, postgres, postgresql, mssql")]
    UnsupportedEngine(String),

    /// SQL statement rejected by the safety gate
    #[error("Dangerous SQL operation detected: statement contains '{0}'")]
    DangerousOperation(String),

    /// Language-model call failed while generating SQL
    #[error("SQL generation failed: {0}")]
    GenerationFailure(String),

    /// Database driver reported an error during execution
    #[error("Query execution failed: {0}")]
    ExecutionFailure(String),

    /// Result cache store is unreachable
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Call requires an authenticated session but none is held
    #[error("Authentication required. Please log in first.")]
    AuthenticationRequired,

    /// Server rejected the credentials or token (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Server refused the operation for this identity (HTTP 403)
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Server does not know the resource or endpoint (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request exceeded its deadline
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Transport-level connection failure
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Malformed input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SqlsightError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::MissingConfiguration { .. } => "MISSING_CONFIGURATION",
            Self::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            Self::UnsupportedEngine(_) => "UNSUPPORTED_ENGINE",
            Self::DangerousOperation(_) => "DANGEROUS_OPERATION",
            Self::GenerationFailure(_) => "GENERATION_FAILURE",
            Self::ExecutionFailure(_) => "EXECUTION_FAILURE",
            Self::CacheUnavailable(_) => "CACHE_UNAVAILABLE",
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::AccessDenied(_) => "ACCESS_DENIED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Timeout(_) => "TIMEOUT",
            Self::ConnectionError(_) => "CONNECTION_ERROR",
            Self::InvalidInput(_) => "INVALID_INPUT",
        }
    }

    /// Whether a failed request may be re-attempted by the retry policy.
    ///
    /// Only transient transport failures qualify. Safety-gate rejections are
    /// never retried: retrying does not change a textually dangerous statement.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ConnectionError(_))
    }

    /// Get human-readable error message (no credentials or sensitive data)
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a missing-configuration error naming the absent key
    pub fn missing_configuration(key: impl Into<String>) -> Self {
        Self::MissingConfiguration { key: key.into() }
    }

    /// Create an invalid-configuration error for a present-but-unusable key
    pub fn invalid_configuration(key: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidConfiguration { key: key.into(), detail: detail.into() }
    }

    /// Create an unsupported-engine error naming the offending selector value
    pub fn unsupported_engine(value: impl Into<String>) -> Self {
        Self::UnsupportedEngine(value.into())
    }

    /// Create a dangerous-operation error naming the matched keyword
    pub fn dangerous_operation(keyword: impl Into<String>) -> Self {
        Self::DangerousOperation(keyword.into())
    }

    /// Create a generation-failure error
    pub fn generation_failure(message: impl Into<String>) -> Self {
        Self::GenerationFailure(message.into())
    }

    /// Create an execution-failure error carrying the driver message
    pub fn execution_failure(message: impl Into<String>) -> Self {
        Self::ExecutionFailure(message.into())
    }

    /// Create a cache-unavailable error
    pub fn cache_unavailable(message: impl Into<String>) -> Self {
        Self::CacheUnavailable(message.into())
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a connection error
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Result type alias for Sqlsight operations
pub type Result<T> = std::result::Result<T, SqlsightError>;
