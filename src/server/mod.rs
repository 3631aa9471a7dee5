//! HTTP Surface
//!
//! Exposes the query pipeline over an axum router. All bodies are JSON;
//! errors serialize through [`ErrorEnvelope`] so clients can extract a
//! stable code and message. CORS is wide open to support browser-based
//! UI collaborators.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `POST` | `/auth/login` | - | Exchange credentials for a bearer token |
//! | `GET`  | `/health` | - | Liveness plus dependency summary |
//! | `POST` | `/generate-sql` | - | Question to SQL |
//! | `POST` | `/fix-sql` | - | Repair failed SQL |
//! | `POST` | `/explain-sql` | - | Plain-language explanation |
//! | `POST` | `/sql/validate` | yes | Safety-gate verdict without execution |
//! | `POST` | `/sql/execute` | yes | Gate, execute, memoize |
//! | `GET`  | `/sql/history` | yes | Recent executed queries |
//! | `POST` | `/feedback` | yes | Record feedback on a query |
//! | `POST` | `/feedback/train` | yes | Hand feedback to the training collaborator |
//! | `GET`  | `/admin/config` | yes | Redacted runtime configuration |
//! | `GET`  | `/admin/db/target/health` | yes | Target database connectivity |
//! | `POST` | `/admin/db/target/test` | yes | One-off connectivity test |
//! | `POST` | `/chat` | yes | SSE stream of chat chunks |

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::{mint_token, verify_token};
use crate::config::{AuthSettings, Settings};
use crate::engine::{ConnectionDescriptor, EngineKind, Runner};
use crate::error::SqlsightError;
use crate::output::ErrorEnvelope;
use crate::pipeline::{AppContext, QueryPipeline};

/// Token lifetime issued at login.
const TOKEN_TTL_SECS: i64 = 3600;

/// Bounded history: oldest entries fall off past this count.
const HISTORY_CAPACITY: usize = 100;

/// One executed query, as surfaced by `/sql/history`.
#[derive(Debug, Clone, Serialize)]
struct HistoryEntry {
    id: String,
    question: String,
    sql: String,
    row_count: usize,
    executed_at: DateTime<Utc>,
}

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pipeline: QueryPipeline,
    auth: Arc<AuthSettings>,
    history: Arc<RwLock<Vec<HistoryEntry>>>,
    feedback: Arc<RwLock<Vec<Value>>>,
}

impl AppState {
    /// Assemble server state from a pipeline context and auth settings.
    #[must_use]
    pub fn new(ctx: Arc<AppContext>, auth: AuthSettings) -> Self {
        Self {
            pipeline: QueryPipeline::new(ctx),
            auth: Arc::new(auth),
            history: Arc::new(RwLock::new(Vec::new())),
            feedback: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

/// Build the full router for the HTTP surface.
#[must_use]
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/auth/login", post(handle_login))
        .route("/health", get(handle_health))
        .route("/generate-sql", post(handle_generate))
        .route("/fix-sql", post(handle_fix))
        .route("/explain-sql", post(handle_explain))
        .route("/sql/validate", post(handle_validate))
        .route("/sql/execute", post(handle_execute))
        .route("/sql/history", get(handle_history))
        .route("/feedback", post(handle_feedback))
        .route("/feedback/train", post(handle_train))
        .route("/admin/config", get(handle_admin_config))
        .route("/admin/db/target/health", get(handle_target_health))
        .route("/admin/db/target/test", post(handle_target_test))
        .route("/chat", post(handle_chat))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process terminates.
pub async fn run_server(settings: &Settings, ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let state = AppState::new(ctx, settings.auth.clone());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// Route-level error carrying the operation name for the envelope.
struct AppError {
    engine: String,
    operation: &'static str,
    err: SqlsightError,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self.err.error_code() {
            "INVALID_INPUT" | "DANGEROUS_OPERATION" => StatusCode::BAD_REQUEST,
            "AUTHENTICATION_REQUIRED" | "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "ACCESS_DENIED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "TIMEOUT" => StatusCode::REQUEST_TIMEOUT,
            "GENERATION_FAILURE" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorEnvelope::from_error(self.engine.clone(), self.operation, &self.err);
        (self.status(), Json(body)).into_response()
    }
}

fn app_error(state: &AppState, operation: &'static str, err: SqlsightError) -> AppError {
    AppError { engine: state.pipeline.engine().to_string(), operation, err }
}

/// Verify the bearer token on a protected route.
fn require_auth(state: &AppState, headers: &HeaderMap, operation: &'static str) -> Result<(), AppError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| app_error(state, operation, SqlsightError::AuthenticationRequired))?;

    verify_token(&state.auth.secret, token)
        .map(|_| ())
        .map_err(|e| app_error(state, operation, e))
}

// ============ Request payloads ============

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct QuestionRequest {
    question: String,
}

#[derive(Deserialize)]
struct SqlRequest {
    sql: String,
}

#[derive(Deserialize)]
struct FixRequest {
    sql: String,
    error_msg: String,
}

#[derive(Deserialize)]
struct ExecuteRequest {
    sql: String,
    #[serde(default)]
    question: Option<String>,
}

#[derive(Deserialize)]
struct FeedbackRequest {
    query_id: String,
    question: String,
    feedback: String,
    rating: i32,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    conversation_id: Option<String>,
}

// ============ Handlers ============

async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    if req.username != state.auth.username || req.password != state.auth.password {
        return Err(app_error(
            &state,
            "login",
            SqlsightError::Unauthorized("Invalid username or password".to_string()),
        ));
    }

    let token = mint_token(&state.auth.secret, &req.username, TOKEN_TTL_SECS)
        .map_err(|e| app_error(&state, "login", e))?;

    Ok(Json(serde_json::json!({"access_token": token, "token_type": "bearer"})))
}

async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "providers_active": 1,
        "dependencies": {
            "database": state.pipeline.engine().to_string(),
            "cache": if state.pipeline.cache_enabled() { "enabled" } else { "disabled" },
        },
    }))
}

async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<QuestionRequest>,
) -> Result<Json<Value>, AppError> {
    let generated = state
        .pipeline
        .generate(&req.question)
        .await
        .map_err(|e| app_error(&state, "generate", e))?;

    Ok(Json(serde_json::json!({
        "sql": generated.sql,
        "question_id": uuid::Uuid::new_v4().to_string(),
        "generated_at": generated.generated_at,
    })))
}

async fn handle_fix(
    State(state): State<AppState>,
    Json(req): Json<FixRequest>,
) -> Result<Json<Value>, AppError> {
    let sql = state
        .pipeline
        .fix(&req.sql, &req.error_msg)
        .await
        .map_err(|e| app_error(&state, "fix", e))?;

    Ok(Json(serde_json::json!({"sql": sql})))
}

async fn handle_explain(
    State(state): State<AppState>,
    Json(req): Json<SqlRequest>,
) -> Result<Json<Value>, AppError> {
    let explanation = state
        .pipeline
        .explain(&req.sql)
        .await
        .map_err(|e| app_error(&state, "explain", e))?;

    Ok(Json(serde_json::json!({"explanation": explanation})))
}

async fn handle_validate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SqlRequest>,
) -> Result<Json<Value>, AppError> {
    require_auth(&state, &headers, "validate")?;

    // A gate rejection is a validation verdict, not an HTTP error
    let body = match state.pipeline.validate(&req.sql) {
        Ok(()) => serde_json::json!({"is_valid": true, "issues": []}),
        Err(e) => serde_json::json!({
            "is_valid": false,
            "issues": [{"severity": "error", "message": e.message()}],
        }),
    };

    Ok(Json(body))
}

async fn handle_execute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<Value>, AppError> {
    require_auth(&state, &headers, "execute")?;

    let question = req.question.as_deref().unwrap_or(&req.sql);
    let answer = state
        .pipeline
        .execute(question, &req.sql)
        .await
        .map_err(|e| app_error(&state, "execute", e))?;

    // Rows as objects keyed by column name, display-ready
    let results: Vec<Value> = answer
        .rows
        .iter()
        .map(|row| {
            answer
                .columns
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect::<serde_json::Map<String, Value>>()
                .into()
        })
        .collect();

    let entry = HistoryEntry {
        id: uuid::Uuid::new_v4().to_string(),
        question: question.to_string(),
        sql: answer.sql.clone(),
        row_count: answer.row_count,
        executed_at: Utc::now(),
    };

    {
        let mut history = state.history.write().await;
        history.push(entry.clone());
        if history.len() > HISTORY_CAPACITY {
            let excess = history.len() - HISTORY_CAPACITY;
            history.drain(..excess);
        }
    }

    Ok(Json(serde_json::json!({
        "query_id": entry.id,
        "sql": answer.sql,
        "columns": answer.columns,
        "results": results,
        "row_count": answer.row_count,
    })))
}

async fn handle_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_auth(&state, &headers, "history")?;

    let history = state.history.read().await;
    Ok(Json(serde_json::json!({"queries": &*history})))
}

async fn handle_feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<Value>, AppError> {
    require_auth(&state, &headers, "feedback")?;

    let feedback_id = uuid::Uuid::new_v4().to_string();
    state.feedback.write().await.push(serde_json::json!({
        "feedback_id": feedback_id,
        "query_id": req.query_id,
        "question": req.question,
        "feedback": req.feedback,
        "rating": req.rating,
        "submitted_at": Utc::now(),
    }));

    Ok(Json(serde_json::json!({"status": "recorded", "feedback_id": feedback_id})))
}

async fn handle_train(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_auth(&state, &headers, "train")?;

    // Vector-memory training belongs to the memory collaborator; this
    // endpoint only acknowledges how much feedback is queued for it.
    let queued = state.feedback.read().await.len();
    Ok(Json(serde_json::json!({"status": "accepted", "feedback_count": queued})))
}

async fn handle_admin_config(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_auth(&state, &headers, "config")?;

    Ok(Json(serde_json::json!({
        "engine": state.pipeline.engine().to_string(),
        "cache_enabled": state.pipeline.cache_enabled(),
    })))
}

async fn handle_target_health(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_auth(&state, &headers, "target-health")?;

    let body = match state.pipeline.schema_summary().await {
        summary if summary.starts_with("Schema unavailable:") => {
            serde_json::json!({"status": "error", "message": summary})
        }
        _ => serde_json::json!({"status": "healthy", "engine": state.pipeline.engine().to_string()}),
    };

    Ok(Json(body))
}

async fn handle_target_test(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, AppError> {
    require_auth(&state, &headers, "target-test")?;

    // Credentials arrive as an environment-shaped map and are used once,
    // never persisted.
    let source: HashMap<String, String> = payload
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let outcome = async {
        let kind: EngineKind = source
            .get("engine")
            .map(String::as_str)
            .unwrap_or("sqlite")
            .parse()?;
        let descriptor = ConnectionDescriptor::from_source(kind, &source)?;
        let runner = Runner::new(descriptor)?;
        runner.introspect(1).await
    }
    .await;

    let body = match outcome {
        Ok(_) => serde_json::json!({"status": "ok"}),
        Err(e) => serde_json::json!({"status": "error", "message": e.message()}),
    };

    Ok(Json(body))
}

// ============ Streaming chat ============

async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, AppError> {
    require_auth(&state, &headers, "chat")?;

    // An omitted conversation id starts a new conversation
    let conversation_id =
        req.conversation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let (tx, rx) = tokio::sync::mpsc::channel::<Event>(16);
    let pipeline = state.pipeline.clone();
    let message = req.message;

    tokio::spawn(async move {
        let send = |value: Value| {
            let tx = tx.clone();
            async move {
                let event = Event::default().data(value.to_string());
                let _ = tx.send(event).await;
            }
        };

        send(serde_json::json!({
            "conversation_id": conversation_id,
            "rich": {
                "type": "status_update",
                "data": {"status": "info", "message": "Generating SQL..."},
            },
        }))
        .await;

        match pipeline.answer(&message).await {
            Ok(answer) => {
                send(serde_json::json!({
                    "conversation_id": conversation_id,
                    "rich": {
                        "type": "rich_text",
                        "data": {"content": format!("```sql\n{}\n```", answer.sql)},
                    },
                }))
                .await;

                let rows: Vec<Value> = answer
                    .rows
                    .iter()
                    .map(|row| {
                        answer
                            .columns
                            .iter()
                            .cloned()
                            .zip(row.iter().cloned())
                            .collect::<serde_json::Map<String, Value>>()
                            .into()
                    })
                    .collect();

                send(serde_json::json!({
                    "conversation_id": conversation_id,
                    "rich": {"type": "dataframe", "data": {"rows": rows}},
                    "simple": {
                        "type": "text",
                        "text": format!("{} row(s) returned", answer.row_count),
                    },
                }))
                .await;
            }
            Err(e) => {
                send(serde_json::json!({
                    "conversation_id": conversation_id,
                    "rich": {
                        "type": "notification",
                        "data": {"level": "error", "message": e.message()},
                    },
                }))
                .await;
            }
        }

        let _ = tx.send(Event::default().data("[DONE]")).await;
    });

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<Event, Infallible>(event), rx))
    });

    Ok(Sse::new(stream))
}
