//! Reaction toggle endpoint.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use coursechat_common::api::{ReactRequest, ReactResponse};
use coursechat_common::{ChatEvent, Reaction};

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, FieldError};
use crate::routes::messages::MessagePath;
use crate::routes::require_participant;
use crate::AppState;

const MAX_EMOJI_CHARS: usize = 32;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/chats/{chat_id}/messages/{message_id}/react",
        post(react),
    )
}

// ---------------------------------------------------------------------------
// POST /api/v1/chats/{chat_id}/messages/{message_id}/react
// ---------------------------------------------------------------------------

async fn react(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(path): Path<MessagePath>,
    Json(body): Json<ReactRequest>,
) -> Result<Json<ReactResponse>, ApiError> {
    require_participant(&state, &path.chat_id, auth.user_id()).await?;

    let emoji = body.emoji.trim();
    let chars = emoji.chars().count();
    if chars == 0 || chars > MAX_EMOJI_CHARS {
        return Err(ApiError::validation(vec![FieldError::new(
            "emoji",
            format!("Emoji must be between 1 and {MAX_EMOJI_CHARS} characters"),
        )]));
    }

    let reactions = state
        .store
        .toggle_reaction(
            &path.chat_id,
            &path.message_id,
            Reaction {
                emoji: emoji.to_string(),
                user_id: auth.0.user_id.clone(),
            },
        )
        .await?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    state.dispatcher.to_chat(
        &path.chat_id,
        &ChatEvent::ReactionUpdated {
            message_id: path.message_id.clone(),
            reactions: reactions.clone(),
        },
    );

    Ok(Json(ReactResponse {
        success: true,
        reactions,
    }))
}
