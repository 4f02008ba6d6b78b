//! API routes
//!
//! Thin translation between HTTP and the engine; handlers hold no
//! conversation logic. These are the only mutation entry points: submit,
//! select, new conversation, confirm verification.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ModeId;
use crate::conversation::Conversation;
use crate::core::store::{ConversationSummary, StoreError};
use crate::core::{EngineError, SubmitOutcome};
use crate::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct NewConversationRequest {
    #[serde(default)]
    pub mode: Option<ModeId>,
}

#[derive(Debug, Serialize)]
pub struct ConversationListResponse {
    pub revision: u64,
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub outcome: SubmitOutcome,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
    /// Whether a deferred message was redispatched by this confirmation.
    pub redispatched: bool,
}

fn engine_error(error: EngineError) -> (StatusCode, String) {
    match error {
        EngineError::Store(StoreError::UnknownConversation(_))
        | EngineError::Store(StoreError::UnknownMessage(_)) => {
            (StatusCode::NOT_FOUND, error.to_string())
        }
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn new_conversation(
    State(state): State<AppState>,
    request: Option<Json<NewConversationRequest>>,
) -> Json<Conversation> {
    let mode = request.and_then(|Json(r)| r.mode);
    Json(state.engine.new_conversation(mode).await)
}

async fn list_conversations(State(state): State<AppState>) -> Json<ConversationListResponse> {
    Json(ConversationListResponse {
        revision: state.engine.revision(),
        conversations: state.engine.conversations().await,
    })
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Conversation>, (StatusCode, String)> {
    state.engine.conversation(id).await.map(Json).map_err(engine_error)
}

async fn select_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .engine
        .select_conversation(id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(engine_error)
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    state
        .engine
        .submit(&request.text)
        .await
        .map(|outcome| Json(ChatResponse { outcome }))
        .map_err(engine_error)
}

async fn verify(
    State(state): State<AppState>,
) -> Result<Json<VerifyResponse>, (StatusCode, String)> {
    let redispatched = state
        .engine
        .confirm_verification()
        .await
        .map_err(engine_error)?;
    Ok(Json(VerifyResponse {
        verified: state.engine.is_verified().await,
        redispatched: redispatched.is_some(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/conversations", post(new_conversation).get(list_conversations))
        .route("/v1/conversations/:id", get(get_conversation))
        .route("/v1/conversations/:id/select", post(select_conversation))
        .route("/v1/chat", post(chat))
        .route("/v1/verify", post(verify))
}
