//! Chat and message persistence.
//!
//! Production deployments point [`ChatStore`] at the document database; the
//! in-memory implementation is used for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coursechat_common::{ChatMessage, Reaction};
use parking_lot::Mutex;

use crate::error::ApiError;
use crate::models::chat::Chat;

/// One backward page of a chat's history.
#[derive(Debug, Clone)]
pub struct MessagePage {
    /// Oldest first.
    pub messages: Vec<ChatMessage>,
    pub total: usize,
    pub has_more: bool,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_chat(&self, chat: Chat) -> Result<(), ApiError>;
    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, ApiError>;
    async fn insert_message(&self, message: ChatMessage) -> Result<ChatMessage, ApiError>;
    async fn get_message(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<Option<ChatMessage>, ApiError>;
    /// Page 1 is the newest `limit` messages; page N is the window before page N-1.
    async fn list_messages(
        &self,
        chat_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, ApiError>;
    async fn update_content(
        &self,
        chat_id: &str,
        message_id: &str,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Option<ChatMessage>, ApiError>;
    /// Returns false if the message did not exist.
    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<bool, ApiError>;
    /// Adds the reaction, or removes it if the same user already reacted with
    /// the same emoji. Returns the updated list, or `None` for unknown messages.
    async fn toggle_reaction(
        &self,
        chat_id: &str,
        message_id: &str,
        reaction: Reaction,
    ) -> Result<Option<Vec<Reaction>>, ApiError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

struct ChatRecord {
    chat: Chat,
    /// Insertion order, which is creation order.
    messages: Vec<ChatMessage>,
}

pub struct MemoryChatStore {
    chats: Mutex<HashMap<String, ChatRecord>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self {
            chats: Mutex::new(HashMap::new()),
        }
    }

    fn with_message<T>(
        &self,
        chat_id: &str,
        message_id: &str,
        f: impl FnOnce(&mut ChatMessage) -> T,
    ) -> Option<T> {
        let mut chats = self.chats.lock();
        let record = chats.get_mut(chat_id)?;
        record
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .map(f)
    }
}

impl Default for MemoryChatStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn create_chat(&self, chat: Chat) -> Result<(), ApiError> {
        self.chats.lock().insert(
            chat.id.clone(),
            ChatRecord {
                chat,
                messages: Vec::new(),
            },
        );
        Ok(())
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, ApiError> {
        Ok(self.chats.lock().get(chat_id).map(|r| r.chat.clone()))
    }

    async fn insert_message(&self, message: ChatMessage) -> Result<ChatMessage, ApiError> {
        let mut chats = self.chats.lock();
        let record = chats
            .get_mut(&message.chat_id)
            .ok_or_else(|| ApiError::not_found("Chat not found"))?;
        record.messages.push(message.clone());
        Ok(message)
    }

    async fn get_message(
        &self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<Option<ChatMessage>, ApiError> {
        Ok(self.with_message(chat_id, message_id, |m| m.clone()))
    }

    async fn list_messages(
        &self,
        chat_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, ApiError> {
        let chats = self.chats.lock();
        let record = chats
            .get(chat_id)
            .ok_or_else(|| ApiError::not_found("Chat not found"))?;

        let total = record.messages.len();
        let limit = limit.max(1) as usize;
        let skip = (page.max(1) as usize - 1).saturating_mul(limit);
        let end = total.saturating_sub(skip);
        let start = end.saturating_sub(limit);

        Ok(MessagePage {
            messages: record.messages[start..end].to_vec(),
            total,
            has_more: start > 0,
        })
    }

    async fn update_content(
        &self,
        chat_id: &str,
        message_id: &str,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Option<ChatMessage>, ApiError> {
        Ok(self.with_message(chat_id, message_id, |m| {
            m.content = content.to_string();
            m.edited_at = Some(edited_at);
            m.clone()
        }))
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<bool, ApiError> {
        let mut chats = self.chats.lock();
        let Some(record) = chats.get_mut(chat_id) else {
            return Ok(false);
        };
        let before = record.messages.len();
        record.messages.retain(|m| m.id != message_id);
        Ok(record.messages.len() != before)
    }

    async fn toggle_reaction(
        &self,
        chat_id: &str,
        message_id: &str,
        reaction: Reaction,
    ) -> Result<Option<Vec<Reaction>>, ApiError> {
        Ok(self.with_message(chat_id, message_id, |m| {
            let existing = m
                .reactions
                .iter()
                .position(|r| r.emoji == reaction.emoji && r.user_id == reaction.user_id);
            match existing {
                Some(idx) => {
                    m.reactions.remove(idx);
                }
                None => m.reactions.push(reaction),
            }
            m.reactions.clone()
        }))
    }
}
