//! Message endpoints. Every mutation is persisted first and then fanned out
//! to the chat's open push-channels.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{patch, post};
use axum::{Json, Router};
use chrono::Utc;
use coursechat_common::api::{
    EditMessageRequest, ListMessagesResponse, Pagination, SendMessageRequest, SendMessageResponse,
};
use coursechat_common::id::{prefix, prefixed_ulid};
use coursechat_common::{ChatEvent, ChatMessage};
use serde::Deserialize;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, FieldError};
use crate::routes::require_participant;
use crate::AppState;

pub const MAX_CONTENT_LEN: usize = 4000;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/chats/{chat_id}/messages",
            post(send_message).get(list_messages),
        )
        .route(
            "/chats/{chat_id}/messages/{message_id}",
            patch(edit_message).delete(delete_message),
        )
}

#[derive(Debug, Deserialize)]
pub struct MessagePath {
    pub chat_id: String,
    pub message_id: String,
}

fn validate_content(content: &str, allow_empty: bool, errors: &mut Vec<FieldError>) {
    if content.is_empty() && !allow_empty {
        errors.push(FieldError::new("content", "Message content is required"));
    } else if content.chars().count() > MAX_CONTENT_LEN {
        errors.push(FieldError::new(
            "content",
            format!("Message content must be {MAX_CONTENT_LEN} characters or fewer"),
        ));
    }
}

// ---------------------------------------------------------------------------
// POST /api/v1/chats/{chat_id}/messages
// ---------------------------------------------------------------------------

async fn send_message(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ApiError> {
    require_participant(&state, &chat_id, auth.user_id()).await?;

    let content = body.content.as_deref().unwrap_or("").trim().to_string();
    let mut errors = Vec::new();
    validate_content(&content, !body.attachments.is_empty(), &mut errors);
    for (i, attachment) in body.attachments.iter().enumerate() {
        if attachment.is_uploading || attachment.url.is_empty() {
            errors.push(FieldError::new(
                &format!("attachments[{i}]"),
                "Attachment must be uploaded before sending",
            ));
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    if let Some(reply_id) = &body.reply_to {
        state
            .store
            .get_message(&chat_id, reply_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Replied-to message not found"))?;
    }

    let message = ChatMessage {
        id: prefixed_ulid(prefix::MESSAGE),
        chat_id: chat_id.clone(),
        content,
        kind: body.kind,
        attachments: body.attachments,
        sender: auth.0.sender(),
        created_at: Utc::now(),
        edited_at: None,
        reactions: Vec::new(),
        reply_to: body.reply_to,
        client_nonce: body.client_nonce,
    };
    let message = state.store.insert_message(message).await?;

    if state.typing.stop(&chat_id, auth.user_id()) {
        state.dispatcher.to_chat(
            &chat_id,
            &ChatEvent::Typing {
                chat_id: chat_id.clone(),
                user_id: auth.0.user_id.clone(),
                display_name: auth.0.display_name.clone(),
                is_typing: false,
            },
        );
    }

    state.dispatcher.to_chat(
        &chat_id,
        &ChatEvent::NewMessage {
            message: message.clone(),
        },
    );

    tracing::debug!(chat_id = %chat_id, message_id = %message.id, "message persisted");

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            success: true,
            message,
        }),
    ))
}

// ---------------------------------------------------------------------------
// GET /api/v1/chats/{chat_id}/messages?page=&limit=
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListMessagesParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

async fn list_messages(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(params): Query<ListMessagesParams>,
) -> Result<Json<ListMessagesResponse>, ApiError> {
    require_participant(&state, &chat_id, auth.user_id()).await?;

    let page = params.page.unwrap_or(1).max(1);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let result = state.store.list_messages(&chat_id, page, limit).await?;

    Ok(Json(ListMessagesResponse {
        success: true,
        messages: result.messages,
        pagination: Pagination {
            page,
            limit,
            total: result.total,
            has_more: result.has_more,
        },
    }))
}

// ---------------------------------------------------------------------------
// PATCH /api/v1/chats/{chat_id}/messages/{message_id}
// ---------------------------------------------------------------------------

async fn edit_message(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<MessagePath>,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    require_participant(&state, &path.chat_id, auth.user_id()).await?;

    let message = state
        .store
        .get_message(&path.chat_id, &path.message_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    // Only the author can edit.
    if message.sender.id != auth.0.user_id {
        return Err(ApiError::forbidden("You can only edit your own messages"));
    }

    let content = body.content.trim();
    let mut errors = Vec::new();
    validate_content(content, !message.attachments.is_empty(), &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let edited_at = Utc::now();
    let updated = state
        .store
        .update_content(&path.chat_id, &path.message_id, content, edited_at)
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    state.dispatcher.to_chat(
        &path.chat_id,
        &ChatEvent::MessageEdited {
            message_id: updated.id.clone(),
            updated_content: updated.content.clone(),
            edited_at: Some(edited_at),
        },
    );

    Ok(Json(SendMessageResponse {
        success: true,
        message: updated,
    }))
}

// ---------------------------------------------------------------------------
// DELETE /api/v1/chats/{chat_id}/messages/{message_id}
// ---------------------------------------------------------------------------

async fn delete_message(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<MessagePath>,
) -> Result<StatusCode, ApiError> {
    require_participant(&state, &path.chat_id, auth.user_id()).await?;

    let message = state
        .store
        .get_message(&path.chat_id, &path.message_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    if message.sender.id != auth.0.user_id {
        return Err(ApiError::forbidden("You can only delete your own messages"));
    }

    if state
        .store
        .delete_message(&path.chat_id, &path.message_id)
        .await?
    {
        state.dispatcher.to_chat(
            &path.chat_id,
            &ChatEvent::MessageDeleted {
                message_id: path.message_id.clone(),
            },
        );
    }

    Ok(StatusCode::NO_CONTENT)
}
