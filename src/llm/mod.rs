//! Language-Model Collaborator
//!
//! The pipeline treats SQL generation as an external service behind the
//! [`SqlGenerator`] trait: hand it a prompt, get raw text back. The shipped
//! implementation talks to any OpenAI-compatible chat-completions API; tests
//! substitute an in-process stub.
//!
//! Prompt construction is deterministic: the same engine kind, schema summary,
//! and question always produce the same instruction text. Responses often
//! arrive wrapped in Markdown code fences, so [`strip_code_fences`] cleans
//! them before the safety gate sees the statement.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmSettings;
use crate::engine::EngineKind;
use crate::error::{Result, SqlsightError};

/// Text-completion contract for SQL generation.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// Complete a prompt, returning the model's raw text response.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Build the SQL-generation prompt for a question.
///
/// Embeds the engine kind so the model emits dialect-appropriate SQL, and the
/// schema summary so it references real tables.
#[must_use]
pub fn sql_prompt(engine: EngineKind, schema_summary: &str, question: &str) -> String {
    format!(
        "You are a SQL expert. Generate ONLY a SQL query (no explanation).\n\
         Database type: {engine}\n\
         Schema information:\n\
         {schema_summary}\n\
         \n\
         Question: {question}\n\
         \n\
         Return ONLY the SQL query, nothing else.\n"
    )
}

/// Build the repair prompt for SQL that failed to execute.
#[must_use]
pub fn fix_prompt(engine: EngineKind, sql: &str, error_msg: &str) -> String {
    format!(
        "You are a SQL expert. The following {engine} query failed.\n\
         Query:\n{sql}\n\
         \n\
         Error message:\n{error_msg}\n\
         \n\
         Return ONLY the corrected SQL query, nothing else.\n"
    )
}

/// Build the explanation prompt for a SQL statement.
#[must_use]
pub fn explain_prompt(sql: &str) -> String {
    format!(
        "Explain the following SQL query in plain English, briefly:\n\
         \n\
         {sql}\n"
    )
}

/// Strip Markdown code-fence wrapping from a model response.
///
/// Handles ```` ```sql ```` and bare ```` ``` ```` prefixes plus a trailing
/// fence, then trims surrounding whitespace.
#[must_use]
pub fn strip_code_fences(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(stripped) = text.strip_prefix("```sql") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }

    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }

    text.trim().to_string()
}

/// Generator backed by an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    /// Build a generator from validated settings.
    pub fn new(settings: &LlmSettings, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                SqlsightError::generation_failure(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl SqlGenerator for OpenAiGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.2,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| SqlsightError::generation_failure(format!("model call failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(SqlsightError::generation_failure(format!(
                "model API error {status}: {body_text}"
            )));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            SqlsightError::generation_failure(format!("invalid model response: {e}"))
        })?;

        json.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                SqlsightError::generation_failure("model response missing message content")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_sql_fence() {
        assert_eq!(
            strip_code_fences("```sql\nSELECT 1;\n```"),
            "SELECT 1;"
        );
    }

    #[test]
    fn test_strip_bare_fence() {
        assert_eq!(strip_code_fences("```\nSELECT 1;\n```"), "SELECT 1;");
    }

    #[test]
    fn test_strip_no_fence() {
        assert_eq!(strip_code_fences("  SELECT 1;  "), "SELECT 1;");
    }

    #[test]
    fn test_strip_prefix_only() {
        assert_eq!(strip_code_fences("```sql\nSELECT 1;"), "SELECT 1;");
    }

    #[test]
    fn test_sql_prompt_is_deterministic() {
        let a = sql_prompt(EngineKind::Postgres, "Table: users\n", "count users");
        let b = sql_prompt(EngineKind::Postgres, "Table: users\n", "count users");
        assert_eq!(a, b);
        assert!(a.contains("Database type: postgres"));
        assert!(a.contains("Question: count users"));
    }

    #[test]
    fn test_fix_prompt_carries_error() {
        let prompt = fix_prompt(EngineKind::Sqlite, "SELECT x FROM t", "no such column: x");
        assert!(prompt.contains("SELECT x FROM t"));
        assert!(prompt.contains("no such column: x"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let settings = LlmSettings {
            api_key: "sk-test".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1/".to_string(),
        };
        let generator = OpenAiGenerator::new(&settings, 30).unwrap();
        assert_eq!(generator.base_url, "https://api.openai.com/v1");
    }
}
