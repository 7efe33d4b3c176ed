//! HTTP server exposing the conversation controller.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Apply one message to a session and return the reply |
//! | `GET`  | `/health` | Liveness, active session count, version |
//! | `GET`  | `/session/{id}` | Raw session state (debugging, no auth) |
//!
//! # Error Contract
//!
//! Error responses share one shape:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Session not found" } }
//! ```
//!
//! Error codes: `not_found` (404), `retrieval_failed` (502),
//! `generation_failed` (502).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser chat widgets
//! can call the API from any site.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::controller::ConversationController;
use crate::embedding;
use crate::error::ChatError;
use crate::generator;
use crate::greeting::RandomGreeting;
use crate::intent::LeadIntentDetector;
use crate::knowledge::SqliteKnowledgeStore;
use crate::notify;
use crate::session::{AwaitingAction, Session, SessionStore};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ConversationController>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(controller: ConversationController) -> Self {
        Self {
            controller: Arc::new(controller),
            sessions: Arc::new(SessionStore::new()),
        }
    }
}

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .route("/session/{id}", get(handle_session))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Wire the production collaborators from `config`.
pub fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let embedder = embedding::create_provider(&config.embedding)?;
    let knowledge = Arc::new(SqliteKnowledgeStore::new(
        config.knowledge.db_path.clone(),
        embedder,
    ));
    let generator = generator::create_generator(&config.generator, &config.app.business_name)?;
    let notifier = notify::create_notifier(&config.smtp, &config.app.business_name);

    let controller = ConversationController::new(
        knowledge,
        generator,
        notifier,
        Arc::new(RandomGreeting),
        LeadIntentDetector::new(&config.lead.trigger_phrases),
        config.knowledge.top_k,
    );
    Ok(AppState::new(controller))
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = build_state(config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        bind = %config.server.bind,
        knowledge_db = %config.knowledge.db_path.display(),
        model = %config.generator.model,
        "{} listening",
        config.app.name
    );
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

struct AppError {
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

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        error!(error = %err, "chat turn failed");
        let code = match err {
            ChatError::Retrieval(_) => "retrieval_failed",
            ChatError::Generation(_) => "generation_failed",
        };
        AppError {
            status: StatusCode::BAD_GATEWAY,
            code,
            message: err.to_string(),
        }
    }
}

// ============ POST /chat ============

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub confidence: f64,
    pub requires_action: Option<AwaitingAction>,
}

/// Handler for `POST /chat`.
///
/// The session lock is held for the whole controller step, so concurrent
/// messages for one session are applied in turn.
async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let (session_id, handle) = state.sessions.get_or_create(request.session_id.as_deref());
    let mut session = handle.lock().await;
    let reply = state.controller.handle(&mut session, &request.message).await?;

    Ok(Json(ChatResponse {
        response: reply.response,
        session_id,
        confidence: reply.confidence,
        requires_action: reply.requires_action,
    }))
}

// ============ GET /health ============

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"healthy"` when the server is running.
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub sessions_active: usize,
    pub version: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        sessions_active: state.sessions.len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /session/{id} ============

async fn handle_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, AppError> {
    state
        .sessions
        .snapshot(&id)
        .await
        .map(Json)
        .ok_or_else(|| not_found("Session not found"))
}
