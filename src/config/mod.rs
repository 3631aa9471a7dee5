//! Configuration Management
//!
//! This module resolves all runtime configuration from an environment-style
//! key/value source. Validation is eager: [`Settings::load`] runs at startup
//! and fails with a precise error naming the first unusable key, so a
//! misconfigured deployment never starts serving.
//!
//! # Configuration Surface
//! - `DB_TYPE` - engine kind selector (default `sqlite`)
//! - per-engine keys - see [`crate::engine::ConnectionDescriptor`]
//! - `REDIS_HOST` / `REDIS_PORT` - result cache store (optional; absent means
//!   the in-process memory store)
//! - `CACHE_TTL_SECS` - cached result lifetime (default 3600)
//! - `LLM_API_KEY` / `LLM_MODEL` / `LLM_BASE_URL` - language-model collaborator
//! - `AUTH_USERNAME` / `AUTH_PASSWORD` / `AUTH_SECRET` - login credentials and
//!   token signing secret for the HTTP surface
//! - `BIND_ADDR` - HTTP listen address (default `0.0.0.0:7262`)
//! - `BACKEND_URL` / `REQUEST_TIMEOUT_SECS` - client-side settings
//!
//! # Lookup Abstraction
//! All lookups go through the [`ConfigSource`] trait so tests can inject a
//! `HashMap` instead of mutating process environment variables.

use std::collections::HashMap;

use crate::engine::{ConnectionDescriptor, EngineKind};
use crate::error::{Result, SqlsightError};

/// Environment-style key/value lookup.
///
/// Empty values are treated as absent, matching how `.env` files are
/// commonly written.
pub trait ConfigSource {
    /// Look up a key, returning `None` when absent or empty.
    fn get(&self, key: &str) -> Option<String>;
}

/// [`ConfigSource`] backed by process environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).filter(|v| !v.is_empty()).cloned()
    }
}

/// Require a key, failing with `MissingConfiguration` naming it.
pub fn require(source: &dyn ConfigSource, key: &str) -> Result<String> {
    source.get(key).ok_or_else(|| SqlsightError::missing_configuration(key))
}

/// Require a key and parse it as a port number.
pub fn require_port(source: &dyn ConfigSource, key: &str) -> Result<u16> {
    let raw = require(source, key)?;
    raw.parse::<u16>()
        .map_err(|_| SqlsightError::invalid_configuration(key, format!("'{raw}' is not a valid port")))
}

/// Parse an optional numeric key, falling back to a default when absent.
fn optional_u64(source: &dyn ConfigSource, key: &str, default: u64) -> Result<u64> {
    match source.get(key) {
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            SqlsightError::invalid_configuration(key, format!("'{raw}' is not a valid integer"))
        }),
        None => Ok(default),
    }
}

/// Language-model collaborator settings
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// API key for the chat-completions endpoint
    /// WARNING: sensitive, never log
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// Base URL of an OpenAI-compatible API
    pub base_url: String,
}

/// Credentials and signing secret for the HTTP surface
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Accepted login username
    pub username: String,

    /// Accepted login password
    /// WARNING: sensitive, never log
    pub password: String,

    /// HMAC-SHA256 secret for token signatures
    /// WARNING: sensitive, never log
    pub secret: String,
}

/// Result cache store settings
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Redis host/port; `None` selects the in-process memory store
    pub redis: Option<(String, u16)>,

    /// Cached result lifetime in seconds
    pub ttl_secs: u64,
}

/// Fully validated server-side configuration.
///
/// Constructed once at startup and handed to every component that needs it;
/// components never read the environment themselves.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Active engine kind
    pub engine: EngineKind,

    /// Validated connection descriptor for the active engine
    pub descriptor: ConnectionDescriptor,

    /// Result cache store settings
    pub cache: CacheSettings,

    /// Language-model collaborator settings
    pub llm: LlmSettings,

    /// Login credentials and token secret
    pub auth: AuthSettings,

    /// HTTP listen address
    pub bind_addr: String,
}

impl Settings {
    /// Load and validate all server-side settings.
    ///
    /// Fails fast on the first missing or malformed key so misconfiguration
    /// surfaces at startup rather than at first query.
    pub fn load(source: &dyn ConfigSource) -> Result<Self> {
        let engine = match source.get("DB_TYPE") {
            Some(raw) => raw.parse::<EngineKind>()?,
            None => EngineKind::Sqlite,
        };

        let descriptor = ConnectionDescriptor::from_source(engine, source)?;

        let redis = match source.get("REDIS_HOST") {
            Some(host) => {
                let port = match source.get("REDIS_PORT") {
                    Some(_) => require_port(source, "REDIS_PORT")?,
                    None => 6379,
                };
                Some((host, port))
            }
            None => None,
        };

        let cache = CacheSettings {
            redis,
            ttl_secs: optional_u64(source, "CACHE_TTL_SECS", crate::cache::DEFAULT_TTL_SECS)?,
        };

        let llm = LlmSettings {
            api_key: require(source, "LLM_API_KEY")?,
            model: source.get("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            base_url: source
                .get("LLM_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        };

        let auth = AuthSettings {
            username: source.get("AUTH_USERNAME").unwrap_or_else(|| "admin".to_string()),
            password: require(source, "AUTH_PASSWORD")?,
            secret: require(source, "AUTH_SECRET")?,
        };

        let bind_addr = source.get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:7262".to_string());

        Ok(Self { engine, descriptor, cache, llm, auth, bind_addr })
    }
}

/// Client-side configuration for commands that talk to a running backend.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Backend base URL
    pub backend_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl ClientSettings {
    /// Load client-side settings; everything has a usable default.
    pub fn load(source: &dyn ConfigSource) -> Result<Self> {
        Ok(Self {
            backend_url: source
                .get("BACKEND_URL")
                .unwrap_or_else(|| "http://localhost:7262".to_string()),
            timeout_secs: optional_u64(source, "REQUEST_TIMEOUT_SECS", 30)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    fn minimal_sqlite() -> HashMap<String, String> {
        source(&[
            ("DB_TYPE", "sqlite"),
            ("SQLITE_DB_PATH", "/tmp/test.db"),
            ("LLM_API_KEY", "sk-test"),
            ("AUTH_PASSWORD", "hunter2"),
            ("AUTH_SECRET", "signing-secret"),
        ])
    }

    #[test]
    fn test_load_minimal_sqlite() {
        let settings = Settings::load(&minimal_sqlite()).unwrap();
        assert_eq!(settings.engine, EngineKind::Sqlite);
        assert_eq!(settings.cache.ttl_secs, 3600);
        assert!(settings.cache.redis.is_none());
        assert_eq!(settings.llm.model, "gpt-4o-mini");
        assert_eq!(settings.auth.username, "admin");
        assert_eq!(settings.bind_addr, "0.0.0.0:7262");
    }

    #[test]
    fn test_engine_defaults_to_sqlite() {
        let mut cfg = minimal_sqlite();
        cfg.remove("DB_TYPE");
        let settings = Settings::load(&cfg).unwrap();
        assert_eq!(settings.engine, EngineKind::Sqlite);
    }

    #[test]
    fn test_unsupported_engine_fails_fast() {
        let mut cfg = minimal_sqlite();
        cfg.insert("DB_TYPE".into(), "db2".into());
        let err = Settings::load(&cfg).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_ENGINE");
        assert!(err.message().contains("db2"));
    }

    #[test]
    fn test_missing_llm_key_named() {
        let mut cfg = minimal_sqlite();
        cfg.remove("LLM_API_KEY");
        let err = Settings::load(&cfg).unwrap_err();
        assert!(err.message().contains("LLM_API_KEY"));
    }

    #[test]
    fn test_redis_port_default() {
        let mut cfg = minimal_sqlite();
        cfg.insert("REDIS_HOST".into(), "cache.internal".into());
        let settings = Settings::load(&cfg).unwrap();
        assert_eq!(settings.cache.redis, Some(("cache.internal".to_string(), 6379)));
    }

    #[test]
    fn test_invalid_redis_port_rejected() {
        let mut cfg = minimal_sqlite();
        cfg.insert("REDIS_HOST".into(), "cache.internal".into());
        cfg.insert("REDIS_PORT".into(), "not-a-port".into());
        let err = Settings::load(&cfg).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
        assert!(err.message().contains("REDIS_PORT"));
    }

    #[test]
    fn test_empty_value_treated_as_absent() {
        let mut cfg = minimal_sqlite();
        cfg.insert("LLM_MODEL".into(), String::new());
        let settings = Settings::load(&cfg).unwrap();
        assert_eq!(settings.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_client_settings_defaults() {
        let cfg = source(&[]);
        let client = ClientSettings::load(&cfg).unwrap();
        assert_eq!(client.backend_url, "http://localhost:7262");
        assert_eq!(client.timeout_secs, 30);
    }

    #[test]
    fn test_client_settings_override() {
        let cfg = source(&[("BACKEND_URL", "http://api:8000"), ("REQUEST_TIMEOUT_SECS", "5")]);
        let client = ClientSettings::load(&cfg).unwrap();
        assert_eq!(client.backend_url, "http://api:8000");
        assert_eq!(client.timeout_secs, 5);
    }
}
