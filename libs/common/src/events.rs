//! Push-channel event envelope.
//!
//! Every frame on a stream is one `ChatEvent` serialized as
//! `{"type": "<kind>", ...fields}`. Chat-scoped kinds are delivered to the
//! connections of one chat; `notification_count` and `friends_updated` are
//! addressed to a single user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{ChatMessage, Reaction};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// First frame on every stream.
    #[serde(rename_all = "camelCase")]
    Connected {
        connection_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chat_id: Option<String>,
    },
    Ping {
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
    HealthCheck {
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
        #[serde(default)]
        connections: usize,
    },
    NewMessage {
        message: ChatMessage,
    },
    #[serde(rename_all = "camelCase")]
    MessageEdited {
        message_id: String,
        updated_content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        edited_at: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    MessageDeleted { message_id: String },
    #[serde(rename_all = "camelCase")]
    ReactionUpdated {
        message_id: String,
        reactions: Vec<Reaction>,
    },
    #[serde(rename_all = "camelCase")]
    Typing {
        chat_id: String,
        user_id: String,
        #[serde(default)]
        display_name: String,
        is_typing: bool,
    },
    NotificationCount {
        count: u64,
    },
    FriendsUpdated {
        #[serde(default)]
        friends: Value,
    },
    /// Any kind this build does not know about.
    #[serde(other)]
    Unknown,
}

impl ChatEvent {
    pub fn ping() -> Self {
        ChatEvent::Ping {
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::Connected { .. } => "connected",
            ChatEvent::Ping { .. } => "ping",
            ChatEvent::HealthCheck { .. } => "health_check",
            ChatEvent::NewMessage { .. } => "new_message",
            ChatEvent::MessageEdited { .. } => "message_edited",
            ChatEvent::MessageDeleted { .. } => "message_deleted",
            ChatEvent::ReactionUpdated { .. } => "reaction_updated",
            ChatEvent::Typing { .. } => "typing",
            ChatEvent::NotificationCount { .. } => "notification_count",
            ChatEvent::FriendsUpdated { .. } => "friends_updated",
            ChatEvent::Unknown => "unknown",
        }
    }

    /// Keep-alive frames carry no state change.
    pub fn is_keepalive(&self) -> bool {
        matches!(self, ChatEvent::Ping { .. } | ChatEvent::HealthCheck { .. })
    }

    /// Events addressed by user id rather than chat id.
    pub fn is_user_scoped(&self) -> bool {
        matches!(
            self,
            ChatEvent::NotificationCount { .. } | ChatEvent::FriendsUpdated { .. }
        )
    }
}
