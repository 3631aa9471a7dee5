//! End-to-End Pipeline Scenarios
//!
//! Exercises the full question lifecycle through the public API: generation
//! through the collaborator, the safety gate, execution over `SQLite`, and
//! question-keyed memoization.

#![cfg(feature = "sqlite")]

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sqlsight::engine::ConnectionDescriptor;
use sqlsight::error::{Result, SqlsightError};
use sqlsight::llm::SqlGenerator;
use sqlsight::pipeline::{AppContext, QueryPipeline};
use sqlsight::{ResultCache, Runner};

// ============================================================================
// Test Helpers
// ============================================================================

/// Collaborator double: fixed response, counted calls.
struct CountingGenerator {
    response: String,
    calls: AtomicUsize,
}

impl CountingGenerator {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self { response: response.to_string(), calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl SqlGenerator for CountingGenerator {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

fn create_customers_db(name: &str) -> PathBuf {
    use std::sync::atomic::AtomicU64;
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!("sqlsight_e2e_{name}_{id}.db"));
    let _ = std::fs::remove_file(&path);

    let conn = rusqlite::Connection::open(&path).expect("Failed to create temp database");
    conn.execute("CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL)", [])
        .expect("Failed to create table");
    conn.execute("INSERT INTO customers (name) VALUES ('Alice'), ('Bob'), ('Charlie')", [])
        .expect("Failed to insert");

    path
}

fn pipeline_over(path: &PathBuf, generator: Arc<dyn SqlGenerator>) -> QueryPipeline {
    let runner = Runner::new(ConnectionDescriptor::Sqlite { path: path.clone() }).unwrap();
    let ctx = AppContext { runner, cache: ResultCache::memory(3600), generator };
    QueryPipeline::new(Arc::new(ctx))
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_count_customers_end_to_end() {
    let path = create_customers_db("count");
    let generator = CountingGenerator::new("```sql\nSELECT COUNT(*) FROM customers;\n```");
    let pipeline = pipeline_over(&path, generator.clone());

    // First ask: generation + execution
    let first = pipeline.answer("count customers").await.unwrap();
    assert_eq!(first.sql, "SELECT COUNT(*) FROM customers;");
    assert_eq!(first.columns.len(), 1);
    assert_eq!(first.row_count, 1);
    assert_eq!(first.rows[0][0], serde_json::json!(3));
    assert!(!first.cached);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    // Second identical ask: cached, no second generation call
    let second = pipeline.answer("count customers").await.unwrap();
    assert!(second.cached);
    assert_eq!(second.rows, first.rows);
    assert_eq!(second.columns, first.columns);
    assert_eq!(second.sql, first.sql);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_cache_key_ignores_case_and_whitespace() {
    let path = create_customers_db("normalized");
    let generator = CountingGenerator::new("SELECT COUNT(*) FROM customers;");
    let pipeline = pipeline_over(&path, generator.clone());

    pipeline.answer("Count Customers").await.unwrap();
    let hit = pipeline.answer("  count customers  ").await.unwrap();

    assert!(hit.cached);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_distinct_questions_each_generate() {
    let path = create_customers_db("distinct");
    let generator = CountingGenerator::new("SELECT COUNT(*) FROM customers;");
    let pipeline = pipeline_over(&path, generator.clone());

    pipeline.answer("count customers").await.unwrap();
    pipeline.answer("how many customers are there").await.unwrap();

    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_dangerous_sql_never_reaches_the_database() {
    let path = create_customers_db("dangerous");
    let generator = CountingGenerator::new("DELETE FROM customers");
    let pipeline = pipeline_over(&path, generator);

    let err = pipeline.answer("clear out the customers table").await.unwrap_err();
    assert_eq!(err.error_code(), "DANGEROUS_OPERATION");
    assert!(err.message().contains("DELETE"));

    // All three rows survive
    let conn = rusqlite::Connection::open(&path).unwrap();
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM customers", [], |row| row.get(0)).unwrap();
    assert_eq!(count, 3);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_rejected_question_is_not_cached() {
    let path = create_customers_db("not_cached");
    let generator = CountingGenerator::new("DROP TABLE customers");
    let pipeline = pipeline_over(&path, generator.clone());

    // Both asks fail, and both go through generation: failures are never memoized
    assert!(pipeline.answer("remove the table").await.is_err());
    assert!(pipeline.answer("remove the table").await.is_err());
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_failing_generator_propagates_failure() {
    struct OfflineGenerator;

    #[async_trait]
    impl SqlGenerator for OfflineGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(SqlsightError::generation_failure("model timed out"))
        }
    }

    let path = create_customers_db("offline");
    let pipeline = pipeline_over(&path, Arc::new(OfflineGenerator));

    let err = pipeline.answer("count customers").await.unwrap_err();
    assert_eq!(err.error_code(), "GENERATION_FAILURE");
    assert!(err.message().contains("model timed out"));

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_fix_and_explain_delegate_to_generator() {
    let path = create_customers_db("fix");
    let generator = CountingGenerator::new("```sql\nSELECT name FROM customers;\n```");
    let pipeline = pipeline_over(&path, generator.clone());

    let fixed = pipeline.fix("SELECT nmae FROM customers", "no such column: nmae").await.unwrap();
    assert_eq!(fixed, "SELECT name FROM customers;");

    // Explanations pass the model response through untouched
    let explanation = pipeline.explain("SELECT name FROM customers").await.unwrap();
    assert!(explanation.contains("SELECT name FROM customers;"));

    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);

    let _ = std::fs::remove_file(&path);
}
