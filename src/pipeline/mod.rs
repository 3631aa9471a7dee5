//! Question-to-Answer Query Pipeline
//!
//! Orchestrates the full lifecycle of a natural-language question:
//!
//! 1. Cache lookup by normalized question (a hit short-circuits everything)
//! 2. Schema introspection, bounded to [`SCHEMA_TABLE_LIMIT`] tables and
//!    degraded to an explanatory string on failure
//! 3. SQL generation through the language-model collaborator
//! 4. Code-fence cleanup of the raw response
//! 5. Safety gate check
//! 6. Execution through the active runner
//! 7. Result packaging and a best-effort cache write
//!
//! Steps 2 and 6 touch the live database, step 3 the model, step 7 the cache
//! store. None of these calls are free of side effects, so result reuse
//! depends entirely on the cache.
//!
//! Concurrent identical questions are not deduplicated: both may execute and
//! both write the cache, last write wins.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::cache::{CachedResult, ResultCache};
use crate::config::Settings;
use crate::engine::{EngineKind, Runner};
use crate::error::{Result, SqlsightError};
use crate::llm::{self, OpenAiGenerator, SqlGenerator};
use crate::safety;

/// Maximum number of tables included in the prompt's schema summary.
pub const SCHEMA_TABLE_LIMIT: usize = 10;

/// Shared handles constructed once at startup.
///
/// Every component that needs the database, cache, or model receives this
/// context explicitly; nothing reads process-wide singletons.
pub struct AppContext {
    /// Active database runner
    pub runner: Runner,

    /// Question-keyed result cache
    pub cache: ResultCache,

    /// Language-model collaborator
    pub generator: Arc<dyn SqlGenerator>,
}

impl AppContext {
    /// Build the full context from validated settings.
    ///
    /// Runner construction fails fast on descriptor problems; an unreachable
    /// cache store degrades to a disabled cache instead of failing startup.
    pub async fn initialize(settings: &Settings) -> Result<Self> {
        let runner = Runner::new(settings.descriptor.clone())?;

        let cache = match &settings.cache.redis {
            Some((host, port)) => ResultCache::redis(host, *port, settings.cache.ttl_secs).await,
            None => ResultCache::memory(settings.cache.ttl_secs),
        };

        let generator: Arc<dyn SqlGenerator> = Arc::new(OpenAiGenerator::new(&settings.llm, 30)?);

        Ok(Self { runner, cache, generator })
    }
}

/// SQL produced for a question, before execution.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedSql {
    /// Source question
    pub question: String,

    /// Cleaned SQL text
    pub sql: String,

    /// Generation timestamp
    pub generated_at: DateTime<Utc>,
}

/// Final packaged answer for a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// SQL that produced the result
    pub sql: String,

    /// Ordered column names
    pub columns: Vec<String>,

    /// Row records
    pub rows: Vec<Vec<serde_json::Value>>,

    /// Number of rows
    pub row_count: usize,

    /// Whether this answer came from the cache
    pub cached: bool,
}

impl From<CachedResult> for Answer {
    fn from(cached: CachedResult) -> Self {
        Self {
            sql: cached.sql,
            columns: cached.columns,
            rows: cached.rows,
            row_count: cached.row_count,
            cached: true,
        }
    }
}

/// The query-lifecycle orchestrator.
#[derive(Clone)]
pub struct QueryPipeline {
    ctx: Arc<AppContext>,
}

impl QueryPipeline {
    /// Wrap a shared context.
    #[must_use]
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Engine kind of the active runner.
    #[must_use]
    pub fn engine(&self) -> EngineKind {
        self.ctx.runner.engine()
    }

    /// Whether the result cache is currently operational.
    #[must_use]
    pub fn cache_enabled(&self) -> bool {
        self.ctx.cache.is_enabled()
    }

    /// Best-effort schema summary for prompt context.
    ///
    /// Introspection failures degrade to an explanatory string rather than
    /// aborting: schema context improves generation but is not required.
    pub async fn schema_summary(&self) -> String {
        match self.ctx.runner.introspect(SCHEMA_TABLE_LIMIT).await {
            Ok(schema) => schema.summary(),
            Err(e) => format!("Schema unavailable: {}", e.message()),
        }
    }

    /// Generate SQL for a question (steps 2-4 of the lifecycle).
    pub async fn generate(&self, question: &str) -> Result<GeneratedSql> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SqlsightError::invalid_input("Question cannot be empty"));
        }

        let schema_summary = self.schema_summary().await;
        let prompt = llm::sql_prompt(self.engine(), &schema_summary, question);

        let raw = self.ctx.generator.complete(&prompt).await?;
        let sql = llm::strip_code_fences(&raw);

        tracing::debug!(sql = %sql, "generated SQL");

        Ok(GeneratedSql { question: question.to_string(), sql, generated_at: Utc::now() })
    }

    /// Gate, execute, package, and memoize SQL for a question (steps 5-7).
    pub async fn execute(&self, question: &str, sql: &str) -> Result<Answer> {
        safety::check(sql)?;

        let rows = self.ctx.runner.execute(sql).await?;

        let answer = Answer {
            sql: sql.to_string(),
            row_count: rows.row_count(),
            columns: rows.columns,
            rows: rows.rows,
            cached: false,
        };

        let entry = CachedResult {
            sql: answer.sql.clone(),
            columns: answer.columns.clone(),
            rows: answer.rows.clone(),
            row_count: answer.row_count,
            cached_at: Utc::now(),
        };
        self.ctx.cache.put(question, &entry).await;

        Ok(answer)
    }

    /// Full question-to-answer lifecycle.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        if let Some(hit) = self.ctx.cache.get(question).await {
            tracing::debug!("cache hit, skipping generation and execution");
            return Ok(hit.into());
        }

        let generated = self.generate(question).await?;
        self.execute(question, &generated.sql).await
    }

    /// Repair SQL that failed to execute.
    pub async fn fix(&self, sql: &str, error_msg: &str) -> Result<String> {
        let prompt = llm::fix_prompt(self.engine(), sql, error_msg);
        let raw = self.ctx.generator.complete(&prompt).await?;
        Ok(llm::strip_code_fences(&raw))
    }

    /// Explain SQL in plain language.
    pub async fn explain(&self, sql: &str) -> Result<String> {
        let prompt = llm::explain_prompt(sql);
        self.ctx.generator.complete(&prompt).await
    }

    /// Check SQL against the safety gate without executing it.
    pub fn validate(&self, sql: &str) -> Result<()> {
        safety::check(sql)
    }
}
