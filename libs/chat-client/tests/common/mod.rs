#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_client::{ChatApi, ClientError, EventStream, Uploader};
use chrono::Utc;
use coursechat_common::api::{ListMessagesResponse, Pagination, SendMessageRequest};
use coursechat_common::{Attachment, ChatEvent, ChatMessage, Reaction, Sender};
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const CHAT: &str = "cht_test";

pub fn sender(id: &str) -> Sender {
    Sender {
        id: id.to_string(),
        email: format!("{id}@example.com"),
        name: id.trim_start_matches("usr_").to_string(),
        icon: None,
    }
}

pub fn message(id: &str, from: &str, content: &str) -> ChatMessage {
    ChatMessage {
        id: id.to_string(),
        chat_id: CHAT.to_string(),
        content: content.to_string(),
        kind: Default::default(),
        attachments: vec![],
        sender: sender(from),
        created_at: Utc::now(),
        edited_at: None,
        reactions: vec![],
        reply_to: None,
        client_nonce: None,
    }
}

pub fn connected(connection_id: &str) -> ChatEvent {
    ChatEvent::Connected {
        connection_id: connection_id.to_string(),
        chat_id: Some(CHAT.to_string()),
    }
}

/// Push side of a scripted stream. Dropping it ends the stream.
pub type StreamHandle = mpsc::UnboundedSender<ChatEvent>;

#[derive(Default)]
struct Script {
    streams: VecDeque<mpsc::UnboundedReceiver<ChatEvent>>,
    opens: Vec<Instant>,
    fetches: Vec<(Instant, u32)>,
    /// Server-side history, oldest first.
    history: Vec<ChatMessage>,
    sent: Vec<SendMessageRequest>,
    failing_sends: usize,
    /// Page fetches never complete while set.
    stall_fetches: bool,
    next_id: u64,
}

/// In-process `ChatApi` driven by the test.
///
/// `open_stream` hands out queued streams in order and fails once the
/// queue is empty. Sends succeed and are appended to the history unless a
/// failure was queued.
pub struct ScriptedApi {
    me: Sender,
    script: Mutex<Script>,
}

impl ScriptedApi {
    pub fn new(me: &str) -> Arc<Self> {
        Arc::new(Self {
            me: sender(me),
            script: Mutex::new(Script::default()),
        })
    }

    pub fn queue_stream(&self) -> StreamHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script.lock().streams.push_back(rx);
        tx
    }

    pub fn fail_next_sends(&self, n: usize) {
        self.script.lock().failing_sends += n;
    }

    pub fn seed_history(&self, messages: Vec<ChatMessage>) {
        self.script.lock().history.extend(messages);
    }

    /// Delete from the server side without pushing anything.
    pub fn remove_from_history(&self, message_id: &str) {
        self.script.lock().history.retain(|m| m.id != message_id);
    }

    pub fn stall_fetches(&self, stall: bool) {
        self.script.lock().stall_fetches = stall;
    }

    pub fn opens(&self) -> Vec<Instant> {
        self.script.lock().opens.clone()
    }

    pub fn fetches(&self) -> Vec<(Instant, u32)> {
        self.script.lock().fetches.clone()
    }

    pub fn sent(&self) -> Vec<SendMessageRequest> {
        self.script.lock().sent.clone()
    }
}

#[async_trait]
impl ChatApi for ScriptedApi {
    async fn current_user(&self) -> chat_client::error::Result<Sender> {
        Ok(self.me.clone())
    }

    async fn open_stream(&self, _chat_id: &str) -> chat_client::error::Result<EventStream> {
        let mut script = self.script.lock();
        script.opens.push(Instant::now());
        let Some(rx) = script.streams.pop_front() else {
            return Err(ClientError::Status {
                status: 503,
                code: None,
                message: "stream unavailable".to_string(),
            });
        };
        let frames = stream::unfold(rx, |mut rx| async move {
            let event = rx.recv().await?;
            Some((Ok::<_, ClientError>(event), rx))
        });
        Ok(frames.boxed())
    }

    async fn fetch_page(
        &self,
        _chat_id: &str,
        page: u32,
        limit: u32,
    ) -> chat_client::error::Result<ListMessagesResponse> {
        let stall = {
            let mut script = self.script.lock();
            script.fetches.push((Instant::now(), page));
            script.stall_fetches
        };
        if stall {
            futures_util::future::pending::<()>().await;
        }

        let script = self.script.lock();
        let total = script.history.len();
        let limit = limit as usize;
        let end = total.saturating_sub((page as usize - 1) * limit);
        let start = end.saturating_sub(limit);
        Ok(ListMessagesResponse {
            success: true,
            messages: script.history[start..end].to_vec(),
            pagination: Pagination {
                page,
                limit: limit as u32,
                total,
                has_more: start > 0,
            },
        })
    }

    async fn send_message(
        &self,
        chat_id: &str,
        request: &SendMessageRequest,
    ) -> chat_client::error::Result<ChatMessage> {
        let mut script = self.script.lock();
        script.sent.push(request.clone());
        if script.failing_sends > 0 {
            script.failing_sends -= 1;
            return Err(ClientError::Status {
                status: 500,
                code: Some("INTERNAL_ERROR".to_string()),
                message: "persist failed".to_string(),
            });
        }
        script.next_id += 1;
        let message = ChatMessage {
            id: format!("msg_{}", script.next_id),
            chat_id: chat_id.to_string(),
            content: request.content.clone().unwrap_or_default(),
            kind: request.kind,
            attachments: request.attachments.clone(),
            sender: self.me.clone(),
            created_at: Utc::now(),
            edited_at: None,
            reactions: vec![],
            reply_to: request.reply_to.clone(),
            client_nonce: request.client_nonce.clone(),
        };
        script.history.push(message.clone());
        Ok(message)
    }

    async fn edit_message(
        &self,
        _chat_id: &str,
        message_id: &str,
        content: &str,
    ) -> chat_client::error::Result<ChatMessage> {
        let mut script = self.script.lock();
        let message = script
            .history
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| ClientError::UnknownMessage(message_id.to_string()))?;
        message.content = content.to_string();
        message.edited_at = Some(Utc::now());
        Ok(message.clone())
    }

    async fn delete_message(&self, _chat_id: &str, message_id: &str) -> chat_client::error::Result<()> {
        self.script.lock().history.retain(|m| m.id != message_id);
        Ok(())
    }

    async fn react(
        &self,
        _chat_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> chat_client::error::Result<Vec<Reaction>> {
        let mut script = self.script.lock();
        let message = script
            .history
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| ClientError::UnknownMessage(message_id.to_string()))?;
        message.reactions.push(Reaction {
            emoji: emoji.to_string(),
            user_id: self.me.id.clone(),
        });
        Ok(message.reactions.clone())
    }

    async fn set_typing(&self, _chat_id: &str, _is_typing: bool) -> chat_client::error::Result<()> {
        Ok(())
    }
}

/// Uploader that "stores" every file under a fixed CDN prefix.
pub struct FakeUploader;

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, attachment: &Attachment) -> chat_client::error::Result<Attachment> {
        Ok(Attachment {
            url: format!("https://cdn.example.com/{}", attachment.filename),
            size: 1024,
            is_uploading: false,
            local_path: None,
            ..attachment.clone()
        })
    }
}

/// Yield to the runtime until `check` holds, advancing paused time in small
/// steps. Panics after `limit` of (virtual) time.
pub async fn settle(limit: Duration, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + limit;
    while !check() {
        assert!(Instant::now() < deadline, "condition not reached in {limit:?}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
