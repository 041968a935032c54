//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Ask a question in a (new or existing) session |
//! | `GET`  | `/tools/list` | List capability tools with schemas |
//! | `POST` | `/tools/{name}` | Call a capability tool directly |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `POST /api/query` takes `{"question": "...", "session_id": "..."}`. When
//! `session_id` is omitted a new session is created and its id returned:
//!
//! ```json
//! { "success": true, "response": "订单 12345 已签收。", "session_id": "7f0c..." }
//! ```
//!
//! Turns on one session run one at a time; different sessions run
//! concurrently. At most `[server].max_sessions` conversations are kept;
//! the least recently used ones and those idle for longer than
//! `[server].session_idle_secs` are dropped, and a dropped id starts over
//! with an empty history.
//!
//! Errors use `{ "error": { "code": "bad_request", "message": "..." } }`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::orchestrator::{Orchestrator, Session};
use crate::tools::ToolDescriptor;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    sessions: Cache<String, Arc<Mutex<Session>>>,
    history_window: usize,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        history_window: usize,
        server: &ServerConfig,
    ) -> Self {
        let sessions = Cache::builder()
            .max_capacity(server.max_sessions)
            .time_to_idle(Duration::from_secs(server.session_idle_secs))
            .build();
        Self {
            orchestrator,
            sessions,
            history_window,
        }
    }

    /// Fetch a session, creating it on first use.
    async fn session(&self, id: Option<String>) -> (String, Arc<Mutex<Session>>) {
        let id = id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let session = self
            .sessions
            .get_with(id.clone(), async {
                debug!(session = %id, "new session");
                Arc::new(Mutex::new(Session::new(id.clone(), self.history_window)))
            })
            .await;
        (id, session)
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/query", post(handle_query))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind to `bind_addr` and serve until the process exits.
pub async fn run_server(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "server listening");
    println!("Shopdesk listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/query ============

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub response: String,
    pub session_id: String,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let question = req
        .question
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| bad_request("缺少参数: question"))?;

    let (session_id, session) = state.session(req.session_id).await;
    let mut session = session.lock().await;
    let outcome = state
        .orchestrator
        .handle_question(&mut session, &question)
        .await;

    Ok(Json(QueryResponse {
        success: outcome.success,
        response: outcome.answer,
        session_id,
    }))
}

// ============ Tools ============

#[derive(Serialize)]
pub struct ToolListResponse {
    tools: Vec<ToolDescriptor>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    Json(ToolListResponse {
        tools: state.orchestrator.tools().descriptors(),
    })
}

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tools = state.orchestrator.tools();
    if tools.find(&name).is_none() {
        return Err(not_found(format!("no tool registered with name: {}", name)));
    }
    let result = tools
        .invoke(&name, &params, state.orchestrator.tool_context())
        .await;
    Ok(Json(serde_json::json!({ "result": result })))
}
