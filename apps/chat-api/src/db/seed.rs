//! Development fixtures for running without the platform's session service.

use crate::auth::tokens::{self, SessionData};
use crate::error::ApiError;
use crate::models::chat::Chat;
use crate::AppState;

pub struct DevSeed {
    pub chat_id: String,
    /// `(display_name, bearer token)` per seeded user.
    pub tokens: Vec<(String, String)>,
}

pub async fn dev_fixtures(state: &AppState) -> Result<DevSeed, ApiError> {
    let users = [
        ("usr_dev_ada", "ada@example.com", "Ada"),
        ("usr_dev_grace", "grace@example.com", "Grace"),
    ];

    let chat = Chat::new(
        "Course lounge",
        users.iter().map(|(id, _, _)| id.to_string()).collect(),
    );
    let chat_id = chat.id.clone();
    state.store.create_chat(chat).await?;

    let mut issued = Vec::new();
    for (user_id, email, name) in users {
        let token = tokens::issue_session(
            state.kv.as_ref(),
            &SessionData {
                user_id: user_id.to_string(),
                email: email.to_string(),
                display_name: name.to_string(),
                icon_url: None,
            },
        )
        .await?;
        issued.push((name.to_string(), token));
    }

    Ok(DevSeed {
        chat_id,
        tokens: issued,
    })
}
