pub mod health;
pub mod me;
pub mod messages;
pub mod reactions;
pub mod typing;

use axum::Router;

use crate::error::ApiError;
use crate::models::chat::Chat;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().merge(health::router()).nest(
        "/api/v1",
        crate::gateway::server::router()
            .merge(me::router())
            .merge(messages::router())
            .merge(reactions::router())
            .merge(typing::router()),
    )
}

/// Load a chat and check that `user_id` takes part in it.
pub(crate) async fn require_participant(
    state: &AppState,
    chat_id: &str,
    user_id: &str,
) -> Result<Chat, ApiError> {
    let chat = state
        .store
        .get_chat(chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;

    if !chat.is_participant(user_id) {
        return Err(ApiError::forbidden("You are not a participant of this chat"));
    }
    Ok(chat)
}
