//! Resilient Authenticated API Client
//!
//! HTTP client for a running Sqlsight backend. Wraps an [`AuthSession`] and
//! applies a uniform retry/backoff and error-normalization policy to every
//! request, so callers see either a decoded JSON payload or a
//! [`SqlsightError`] - never a raw transport exception.
//!
//! # Retry Policy
//! Up to 3 total attempts per request. Connection and timeout errors retry,
//! as do HTTP 429/500/502/503/504. The delay between attempts grows
//! geometrically from a 0.5 second base. Retries apply uniformly to
//! GET/POST/PUT/DELETE and run sequentially, never concurrently for the same
//! logical request.
//!
//! # Status Mapping
//! - 200/201 - decoded JSON body
//! - 401 - session cleared, `Unauthorized`
//! - 403 - `AccessDenied`
//! - 404 - `NotFound`
//! - other non-2xx - server-provided `detail` field when present, else raw
//!   status and body
//!
//! Calls that require authentication refuse locally with
//! `AuthenticationRequired` when no valid session is held, avoiding a wasted
//! round trip.

pub mod stream;

use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

use crate::auth::AuthSession;
use crate::config::ClientSettings;
use crate::error::{Result, SqlsightError};

use stream::ChatStream;

/// Retry/backoff policy for a client.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per request (first try included)
    pub max_attempts: u32,

    /// Base delay; doubles for each further retry
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff_base: Duration::from_millis(500) }
    }
}

impl RetryPolicy {
    /// Delay inserted before attempt `attempt` (1-based; none before the first).
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        // Geometric: 0.5s, 1s, 2s, ...
        self.backoff_base * 2_u32.saturating_pow(attempt - 2)
    }
}

/// HTTP status codes that trigger a retry.
const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Authenticated client for the Sqlsight HTTP surface.
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    session: AuthSession,
    retry: RetryPolicy,
}

impl ApiClient {
    /// Build a client from validated settings.
    pub fn new(settings: &ClientSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| {
                SqlsightError::connection_error(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url: settings.backend_url.trim_end_matches('/').to_string(),
            http,
            session: AuthSession::new(),
            retry: RetryPolicy::default(),
        })
    }

    /// Override the retry policy (tests shrink the backoff).
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Current session state.
    #[must_use]
    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Authenticate against the backend and store the bearer token.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let body = serde_json::json!({"username": username, "password": password});
        let response = self.request(Method::POST, "/auth/login", Some(&body)).await?;

        let token = response
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SqlsightError::Unauthorized("login response missing access_token".to_string())
            })?
            .to_string();

        self.session.authenticate(token);
        Ok(())
    }

    /// Clear the stored token.
    pub fn logout(&mut self) {
        self.session.clear();
    }

    /// Backend health status.
    pub async fn health(&mut self) -> Result<Value> {
        self.request(Method::GET, "/health", None).await
    }

    /// Generate SQL from a natural-language question.
    pub async fn generate_sql(&mut self, question: &str) -> Result<Value> {
        let body = serde_json::json!({"question": question});
        self.request(Method::POST, "/generate-sql", Some(&body)).await
    }

    /// Repair SQL that failed, given the driver error message.
    pub async fn fix_sql(&mut self, sql: &str, error_msg: &str) -> Result<Value> {
        let body = serde_json::json!({"sql": sql, "error_msg": error_msg});
        self.request(Method::POST, "/fix-sql", Some(&body)).await
    }

    /// Validate SQL without executing it (auth required).
    pub async fn validate_sql(&mut self, sql: &str) -> Result<Value> {
        self.ensure_authenticated()?;
        let body = serde_json::json!({"sql": sql});
        self.request(Method::POST, "/sql/validate", Some(&body)).await
    }

    /// Explain SQL in plain language.
    pub async fn explain_sql(&mut self, sql: &str) -> Result<Value> {
        let body = serde_json::json!({"sql": sql});
        self.request(Method::POST, "/explain-sql", Some(&body)).await
    }

    /// Execute SQL (auth required). `question` defaults to the SQL text.
    pub async fn execute_sql(&mut self, sql: &str, question: Option<&str>) -> Result<Value> {
        self.ensure_authenticated()?;
        let body = serde_json::json!({"question": question.unwrap_or(sql), "sql": sql});
        self.request(Method::POST, "/sql/execute", Some(&body)).await
    }

    /// Query history (auth required).
    ///
    /// A bare-list response is normalized into `{"queries": [...]}` so
    /// callers can rely on the object shape.
    pub async fn query_history(&mut self) -> Result<Value> {
        self.ensure_authenticated()?;
        let response = self.request(Method::GET, "/sql/history", None).await?;

        if response.is_array() {
            return Ok(serde_json::json!({"queries": response}));
        }
        Ok(response)
    }

    /// Submit feedback on a generated query (auth required).
    pub async fn submit_feedback(
        &mut self,
        query_id: &str,
        question: &str,
        feedback: &str,
        rating: i32,
    ) -> Result<Value> {
        self.ensure_authenticated()?;
        let body = serde_json::json!({
            "query_id": query_id,
            "question": question,
            "feedback": feedback,
            "rating": rating,
        });
        self.request(Method::POST, "/feedback", Some(&body)).await
    }

    /// Runtime configuration (admin, auth required).
    pub async fn get_config(&mut self) -> Result<Value> {
        self.ensure_authenticated()?;
        self.request(Method::GET, "/admin/config", None).await
    }

    /// Target database connectivity check (admin, auth required).
    pub async fn check_target_db_health(&mut self) -> Result<Value> {
        self.ensure_authenticated()?;
        self.request(Method::GET, "/admin/db/target/health", None).await
    }

    /// One-off connectivity test against an arbitrary target configuration
    /// (admin, auth required). Credentials are not persisted server-side.
    pub async fn test_target_db_connection(&mut self, payload: &Value) -> Result<Value> {
        self.ensure_authenticated()?;
        self.request(Method::POST, "/admin/db/target/test", Some(payload)).await
    }

    /// Trigger model training on approved feedback (admin, auth required).
    pub async fn train_model(&mut self, feedback_ids: Option<Vec<String>>) -> Result<Value> {
        self.ensure_authenticated()?;
        let body = match feedback_ids {
            Some(ids) => serde_json::json!({"feedback_ids": ids}),
            None => serde_json::json!({}),
        };
        self.request(Method::POST, "/feedback/train", Some(&body)).await
    }

    /// Open a streaming chat turn (auth required).
    ///
    /// Forward the last-seen conversation id to continue a conversation;
    /// `None` starts a new one server-side.
    pub async fn stream_chat(
        &mut self,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<ChatStream> {
        self.ensure_authenticated()?;

        let mut body = serde_json::json!({"message": message});
        if let Some(id) = conversation_id {
            body["conversation_id"] = Value::String(id.to_string());
        }

        let mut request = self
            .http
            .post(format!("{}/chat", self.base_url))
            .header("Accept", "text/event-stream")
            .json(&body);
        if let Some(token) = self.session.bearer() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SqlsightError::timeout(format!("chat request timed out: {e}"))
            } else {
                SqlsightError::connection_error(format!("chat request failed: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        if status == 401 {
            self.session.clear();
            return Err(SqlsightError::Unauthorized("Please log in again.".to_string()));
        }
        if !(200..300).contains(&status) {
            return Err(SqlsightError::connection_error(format!(
                "chat request failed with HTTP {status}"
            )));
        }

        Ok(ChatStream::new(response))
    }

    fn ensure_authenticated(&self) -> Result<()> {
        if self.session.is_valid() {
            Ok(())
        } else {
            Err(SqlsightError::AuthenticationRequired)
        }
    }

    /// One request through the retry and normalization policy.
    async fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_err = SqlsightError::connection_error("no attempts made");

        for attempt in 1..=self.retry.max_attempts {
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let mut request = self.http.request(method.clone(), url.as_str());
            if let Some(token) = self.session.bearer() {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    last_err = if e.is_timeout() {
                        SqlsightError::timeout(format!("request to {path} timed out: {e}"))
                    } else {
                        SqlsightError::connection_error(format!("request to {path} failed: {e}"))
                    };
                    continue;
                }
            };

            let status = response.status().as_u16();
            match status {
                200 | 201 => {
                    return response.json::<Value>().await.map_err(|e| {
                        SqlsightError::invalid_input(format!("response was not valid JSON: {e}"))
                    });
                }
                401 => {
                    self.session.clear();
                    return Err(SqlsightError::Unauthorized("Please log in again.".to_string()));
                }
                403 => return Err(SqlsightError::AccessDenied("Access denied.".to_string())),
                404 => return Err(SqlsightError::NotFound("Endpoint not found.".to_string())),
                _ if RETRYABLE_STATUS.contains(&status) => {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = SqlsightError::connection_error(format!(
                        "HTTP {status} from {path}: {body_text}"
                    ));
                    continue;
                }
                _ => {
                    // Best-effort extraction of a server-provided error detail
                    let body_text = response.text().await.unwrap_or_default();
                    let detail = serde_json::from_str::<Value>(&body_text)
                        .ok()
                        .and_then(|v| {
                            v.get("detail")
                                .or_else(|| v.pointer("/error/message"))
                                .and_then(Value::as_str)
                                .map(str::to_string)
                        })
                        .unwrap_or_else(|| format!("HTTP {status}: {body_text}"));
                    return Err(SqlsightError::invalid_input(detail));
                }
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_progression() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(500));
        assert_eq!(policy.delay_before(3), Duration::from_millis(1000));
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_base, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_auth_required_refused_locally() {
        // Unroutable backend: a round trip would hang, but the client must
        // refuse before ever sending.
        let settings = ClientSettings {
            backend_url: "http://192.0.2.1:9".to_string(),
            timeout_secs: 1,
        };
        let mut client = ApiClient::new(&settings).unwrap();

        let err = client.execute_sql("SELECT 1", None).await.unwrap_err();
        assert_eq!(err.error_code(), "AUTHENTICATION_REQUIRED");

        let err = client.query_history().await.unwrap_err();
        assert_eq!(err.error_code(), "AUTHENTICATION_REQUIRED");

        let err = client.validate_sql("SELECT 1").await.unwrap_err();
        assert_eq!(err.error_code(), "AUTHENTICATION_REQUIRED");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let settings = ClientSettings {
            backend_url: "http://localhost:7262/".to_string(),
            timeout_secs: 30,
        };
        let client = ApiClient::new(&settings).unwrap();
        assert_eq!(client.base_url, "http://localhost:7262");
    }
}
