//! Seams between the controller and the outside world.

use async_trait::async_trait;
use coursechat_common::api::{ListMessagesResponse, SendMessageRequest};
use coursechat_common::{Attachment, ChatEvent, ChatMessage, Reaction, Sender};
use futures_util::stream::BoxStream;

use crate::error::Result;

/// Decoded push-channel frames. A `Decode` error is one bad frame; any
/// other error ends the stream.
pub type EventStream = BoxStream<'static, Result<ChatEvent>>;

/// Everything the client needs from the chat API.
#[async_trait]
pub trait ChatApi: Send + Sync + 'static {
    /// Identity of the caller, used as the sender of optimistic messages.
    async fn current_user(&self) -> Result<Sender>;

    async fn open_stream(&self, chat_id: &str) -> Result<EventStream>;

    /// Page `page` counting back from the newest, oldest-first within the page.
    async fn fetch_page(&self, chat_id: &str, page: u32, limit: u32)
        -> Result<ListMessagesResponse>;

    async fn send_message(&self, chat_id: &str, request: &SendMessageRequest)
        -> Result<ChatMessage>;

    async fn edit_message(&self, chat_id: &str, message_id: &str, content: &str)
        -> Result<ChatMessage>;

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<()>;

    /// Toggle `emoji` on a message and return its new reaction list.
    async fn react(&self, chat_id: &str, message_id: &str, emoji: &str) -> Result<Vec<Reaction>>;

    async fn set_typing(&self, chat_id: &str, is_typing: bool) -> Result<()>;
}

/// Object-storage upload for attachments picked from local files.
#[async_trait]
pub trait Uploader: Send + Sync + 'static {
    /// Upload the file behind a pending attachment and return the attachment
    /// with its final URL and metadata.
    async fn upload(&self, attachment: &Attachment) -> Result<Attachment>;
}
