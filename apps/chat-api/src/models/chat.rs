use chrono::{DateTime, Utc};
use serde::Serialize;

/// A conversation between course participants.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub title: String,
    /// User IDs allowed to read, post and subscribe.
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(title: impl Into<String>, participants: Vec<String>) -> Self {
        Self {
            id: coursechat_common::id::prefixed_ulid(coursechat_common::id::prefix::CHAT),
            title: title.into(),
            participants,
            created_at: Utc::now(),
        }
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}
