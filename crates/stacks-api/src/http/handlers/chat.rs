//! Chat lifecycle HTTP handlers.
//!
//! Endpoints:
//! - GET  /api/v1/chats                - Chats visible to the caller
//! - POST /api/v1/chats                - Open a chat (patrons)
//! - GET  /api/v1/chats/{id}           - Get one chat
//! - POST /api/v1/chats/{id}/assign    - Claim a waiting chat (librarians)
//! - POST /api/v1/chats/{id}/close     - Close an active chat
//! - GET  /api/v1/chats/{id}/messages  - History; marks the page read

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use stacks_types::chat::{Chat, ChatId, Message};

use crate::http::error::AppError;
use crate::http::extractors::auth::CurrentIdentity;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Largest history page a client may request.
const MAX_PAGE: i64 = 500;

/// Request body for opening a chat.
#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub title: String,
}

/// Query parameters for message listing.
#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    #[serde(default = "default_message_limit")]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

fn default_message_limit() -> Option<i64> {
    Some(100)
}

impl MessageListQuery {
    fn validate(&self) -> Result<(), AppError> {
        if let Some(limit) = self.limit {
            if !(1..=MAX_PAGE).contains(&limit) {
                return Err(AppError::Validation(format!(
                    "limit must be between 1 and {MAX_PAGE}"
                )));
            }
        }
        if self.offset.is_some_and(|offset| offset < 0) {
            return Err(AppError::Validation("offset must not be negative".to_string()));
        }
        Ok(())
    }
}

fn chat_link(chat_id: ChatId) -> String {
    format!("/api/v1/chats/{chat_id}")
}

/// GET /api/v1/chats - Chats owned by a patron, or claimable/assigned for a librarian.
pub async fn list_chats(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<Json<ApiResponse<Vec<Chat>>>, AppError> {
    let timer = RequestTimer::start();
    let chats = state.chat_service.chats_for(&identity).await?;
    Ok(Json(timer.finish(chats).with_link("self", "/api/v1/chats")))
}

/// POST /api/v1/chats - Open a new chat in `waiting` status.
pub async fn create_chat(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(body): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Chat>>), AppError> {
    let timer = RequestTimer::start();
    let chat = state.chat_service.open_chat(&identity, &body.title).await?;
    let link = chat_link(chat.id);
    Ok((
        StatusCode::CREATED,
        Json(timer.finish(chat).with_link("self", &link)),
    ))
}

/// GET /api/v1/chats/{id}
pub async fn get_chat(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(chat_id): Path<ChatId>,
) -> Result<Json<ApiResponse<Chat>>, AppError> {
    let timer = RequestTimer::start();
    let chat = state.chat_service.get_chat(chat_id, &identity).await?;
    Ok(Json(
        timer
            .finish(chat)
            .with_link("self", &chat_link(chat_id))
            .with_link("messages", &format!("{}/messages", chat_link(chat_id))),
    ))
}

/// POST /api/v1/chats/{id}/assign - Claim a waiting chat.
pub async fn assign_chat(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(chat_id): Path<ChatId>,
) -> Result<Json<ApiResponse<Chat>>, AppError> {
    let timer = RequestTimer::start();
    let chat = state.chat_service.assign_staff(chat_id, &identity).await?;
    Ok(Json(timer.finish(chat).with_link("self", &chat_link(chat_id))))
}

/// POST /api/v1/chats/{id}/close
pub async fn close_chat(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(chat_id): Path<ChatId>,
) -> Result<Json<ApiResponse<Chat>>, AppError> {
    let timer = RequestTimer::start();
    let chat = state.chat_service.close_chat(chat_id, &identity).await?;
    Ok(Json(timer.finish(chat).with_link("self", &chat_link(chat_id))))
}

/// GET /api/v1/chats/{id}/messages?limit&offset
pub async fn list_messages(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(chat_id): Path<ChatId>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<ApiResponse<Vec<Message>>>, AppError> {
    let timer = RequestTimer::start();
    query.validate()?;

    let messages = state
        .chat_service
        .history(chat_id, &identity, query.limit, query.offset)
        .await?;

    Ok(Json(
        timer
            .finish(messages)
            .with_link("chat", &chat_link(chat_id)),
    ))
}
