use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::actor::ActorHeader;
use crate::error::AppError;
use crate::models::chat::{ChatMessage, ChatThread};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/:id/chat", post(open_chat))
        .route("/orders/:id/chat/messages", post(send_for_order))
        .route(
            "/chat/:thread_id/messages",
            get(list_messages).post(send_message),
        )
        .route("/chat/:thread_id/read", post(mark_read))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

#[derive(Serialize)]
pub struct MarkReadResponse {
    pub marked: usize,
}

async fn open_chat(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ChatThread>, AppError> {
    let user_id = actor.user_id()?;
    Ok(Json(state.lifecycle.open_chat(order_id, user_id)?))
}

async fn send_for_order(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<ChatMessage>, AppError> {
    let user_id = actor.user_id()?;
    state.lifecycle.get(order_id)?;
    Ok(Json(state.chat.send_for_order(order_id, user_id, &payload.body)?))
}

async fn list_messages(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path(thread_id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let user_id = actor.user_id()?;
    Ok(Json(state.chat.list_messages(thread_id, user_id)?))
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path(thread_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<ChatMessage>, AppError> {
    let user_id = actor.user_id()?;
    Ok(Json(state.chat.send_message(thread_id, user_id, &payload.body)?))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    actor: ActorHeader,
    Path(thread_id): Path<Uuid>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let user_id = actor.user_id()?;
    let marked = state.chat.mark_read(thread_id, user_id)?;
    Ok(Json(MarkReadResponse { marked }))
}
