//! Sqlsight - Natural-Language SQL Service
//!
//! Sqlsight turns a natural-language question into a SQL query, its execution
//! results, and an explanation, against one of several relational backends,
//! behind an authenticated client-server boundary.
//!
//! # Core Principles
//! - Fail fast: configuration and engine selection are validated at startup
//! - Fail closed: generated SQL passes a conservative safety gate before any
//!   runner sees it
//! - Degrade visibly: optional subsystems (cache, schema context) surface
//!   their unavailability in types and logs, never as swallowed exceptions
//! - Explicit context: shared handles are constructed once and passed down,
//!   never read from process-wide singletons
//!
//! # Module Organization
//! - [`error`] - Error types and stable error codes
//! - [`output`] - JSON output envelope types
//! - [`config`] - Environment-style configuration with eager validation
//! - [`engine`] - Engine kinds, connection descriptors, and runner dispatch
//! - [`safety`] - Pre-execution SQL denylist gate
//! - [`cache`] - Question-keyed result cache with fail-open degradation
//! - [`llm`] - Language-model collaborator trait and HTTP implementation
//! - [`pipeline`] - Question-to-answer orchestration
//! - [`auth`] - Token mint/verify and the client-side session
//! - [`client`] - Resilient authenticated API client and stream rendering
//! - [`server`] - axum HTTP surface

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod safety;
pub mod server;

// Re-export commonly used types for convenience
pub use auth::AuthSession;
pub use cache::{fingerprint, CachedResult, ResultCache};
pub use client::stream::{ChatChunk, StreamRenderer, UiComponent};
pub use client::{ApiClient, RetryPolicy};
pub use config::{ClientSettings, ConfigSource, EnvSource, Settings};
pub use engine::{
    ConnectionDescriptor, DatabaseRunner, EngineKind, QueryRows, Runner, SchemaInfo,
};
pub use error::{Result, SqlsightError};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use pipeline::{Answer, AppContext, QueryPipeline};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_exports() {
        // Verify that key types are accessible through the crate root
        let _kind = EngineKind::Postgres;
        let _session = AuthSession::new();
        let _policy = RetryPolicy::default();
        let _key = fingerprint("count customers");
    }
}
