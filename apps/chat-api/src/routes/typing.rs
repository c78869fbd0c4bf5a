//! Typing indicator endpoint.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use coursechat_common::api::TypingRequest;
use coursechat_common::ChatEvent;

use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::routes::require_participant;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/chats/{chat_id}/typing", post(set_typing))
}

async fn set_typing(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(body): Json<TypingRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_participant(&state, &chat_id, auth.user_id()).await?;

    let session = &auth.0;
    if body.is_typing {
        state
            .typing
            .start(&chat_id, &session.user_id, &session.display_name);
    } else {
        state.typing.stop(&chat_id, &session.user_id);
    }

    state.dispatcher.to_chat(
        &chat_id,
        &ChatEvent::Typing {
            chat_id: chat_id.clone(),
            user_id: session.user_id.clone(),
            display_name: session.display_name.clone(),
            is_typing: body.is_typing,
        },
    );

    Ok(Json(serde_json::json!({ "success": true })))
}
