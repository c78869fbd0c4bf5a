//! Handle for one chat subscription.

use std::sync::Arc;

use chrono::Utc;
use coursechat_common::api::SendMessageRequest;
use coursechat_common::id::{prefix, prefixed_ulid};
use coursechat_common::{Attachment, ChatEvent, ChatMessage, MessageKind, Reaction, Sender};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::{ChatApi, Uploader};
use crate::bus::EventBus;
use crate::config::ClientConfig;
use crate::controller::{Command, ConnectionState, Controller, Shared};
use crate::error::{ClientError, Result};
use crate::scroll::{ScrollAction, Viewport};
use crate::view::LocalMessage;

/// A message the user is about to send.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub content: String,
    pub kind: MessageKind,
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<String>,
}

impl Draft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Attach a file. A plain text draft becomes an image or file message.
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        if self.kind == MessageKind::Text {
            self.kind = if attachment.mime_type.starts_with("image/") {
                MessageKind::Image
            } else {
                MessageKind::File
            };
        }
        self.attachments.push(attachment);
        self
    }

    pub fn reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }
}

pub struct ChatSubscription {
    shared: Arc<Shared>,
    api: Arc<dyn ChatApi>,
    uploader: Option<Arc<dyn Uploader>>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
    page_size: u32,
}

impl ChatSubscription {
    pub(crate) fn spawn(
        api: Arc<dyn ChatApi>,
        uploader: Option<Arc<dyn Uploader>>,
        chat_id: String,
        me: Sender,
        config: &ClientConfig,
        bus: EventBus,
    ) -> Self {
        let shared = Arc::new(Shared::new(chat_id, me, config, bus));
        let (commands, rx) = mpsc::unbounded_channel();
        let controller = Controller::new(api.clone(), shared.clone(), rx, config);
        let task = tokio::spawn(controller.run());

        Self {
            shared,
            api,
            uploader,
            commands,
            task,
            page_size: config.page_size,
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.shared.chat_id
    }

    /// Snapshot of the local message list, oldest first.
    pub fn messages(&self) -> Vec<LocalMessage> {
        self.shared.view.lock().messages().to_vec()
    }

    /// Display names of other users typing in this chat.
    pub fn typing(&self) -> Vec<String> {
        self.shared.view.lock().typing()
    }

    pub fn has_more(&self) -> bool {
        self.shared.view.lock().has_more()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.shared.view.lock().set_viewport(viewport);
    }

    /// Show the message immediately, then persist it.
    ///
    /// On failure the local entry stays in the list marked failed and the
    /// error is returned. Nothing is retried automatically.
    pub async fn send(&self, draft: Draft) -> Result<ChatMessage> {
        let temp_id = prefixed_ulid(prefix::TEMP);
        let optimistic = ChatMessage {
            id: temp_id.clone(),
            chat_id: self.shared.chat_id.clone(),
            content: draft.content,
            kind: draft.kind,
            attachments: draft.attachments,
            sender: self.shared.me.clone(),
            created_at: Utc::now(),
            edited_at: None,
            reactions: Vec::new(),
            reply_to: draft.reply_to,
            client_nonce: Some(temp_id.clone()),
        };

        let action = self.shared.view.lock().push_optimistic(optimistic);
        self.shared.notify(Some(action));

        self.persist(&temp_id).await
    }

    /// Re-send a failed message with its original nonce.
    pub async fn retry(&self, temp_id: &str) -> Result<ChatMessage> {
        self.shared
            .view
            .lock()
            .mark_retrying(temp_id)
            .ok_or_else(|| ClientError::UnknownMessage(temp_id.to_string()))?;
        self.shared.notify(Some(ScrollAction::None));
        self.persist(temp_id).await
    }

    /// Remove a failed message from the list.
    pub fn discard(&self, temp_id: &str) -> bool {
        let removed = self.shared.view.lock().discard(temp_id);
        if removed {
            self.shared.notify(Some(ScrollAction::None));
        }
        removed
    }

    async fn persist(&self, temp_id: &str) -> Result<ChatMessage> {
        let pending = self
            .shared
            .view
            .lock()
            .pending(temp_id)
            .ok_or_else(|| ClientError::UnknownMessage(temp_id.to_string()))?;

        match self.upload_and_send(temp_id, pending).await {
            Ok(message) => {
                let confirmed = self.shared.view.lock().confirm(temp_id, message.clone());
                if confirmed {
                    self.shared.notify(Some(ScrollAction::None));
                }
                Ok(message)
            }
            Err(err) => {
                tracing::warn!(chat_id = %self.shared.chat_id, temp_id, error = %err, "send failed");
                let failed = self.shared.view.lock().fail(temp_id);
                if failed {
                    self.shared.notify(Some(ScrollAction::None));
                }
                Err(err)
            }
        }
    }

    async fn upload_and_send(&self, temp_id: &str, pending: ChatMessage) -> Result<ChatMessage> {
        let mut attachments = Vec::with_capacity(pending.attachments.len());
        let mut uploaded = false;
        for attachment in pending.attachments {
            if !attachment.is_uploading {
                attachments.push(attachment);
                continue;
            }
            let uploader = self
                .uploader
                .as_ref()
                .ok_or_else(|| ClientError::Upload("no uploader configured".to_string()))?;
            let mut done = uploader.upload(&attachment).await?;
            done.is_uploading = false;
            done.local_path = None;
            attachments.push(done);
            uploaded = true;
        }

        if uploaded {
            let replaced = self
                .shared
                .view
                .lock()
                .set_attachments(temp_id, attachments.clone());
            if replaced {
                self.shared.notify(Some(ScrollAction::None));
            }
        }

        let request = SendMessageRequest {
            content: Some(pending.content),
            kind: pending.kind,
            attachments,
            reply_to: pending.reply_to,
            client_nonce: Some(temp_id.to_string()),
        };
        self.api.send_message(&self.shared.chat_id, &request).await
    }

    /// Load the next older page. Returns how many messages were added.
    pub async fn load_older(&self) -> Result<usize> {
        let (page, anchor) = {
            let mut view = self.shared.view.lock();
            match view.begin_page_load() {
                Some(anchor) => (view.pages_loaded() + 1, anchor),
                None => return Ok(0),
            }
        };

        match self
            .api
            .fetch_page(&self.shared.chat_id, page, self.page_size)
            .await
        {
            Ok(resp) => {
                let (inserted, action) = self.shared.view.lock().prepend_page(
                    resp.messages,
                    resp.pagination.has_more,
                    anchor,
                );
                self.shared.notify(Some(action));
                Ok(inserted)
            }
            Err(err) => {
                self.shared.view.lock().cancel_page_load();
                Err(err)
            }
        }
    }

    pub async fn react(&self, message_id: &str, emoji: &str) -> Result<Vec<Reaction>> {
        let reactions = self
            .api
            .react(&self.shared.chat_id, message_id, emoji)
            .await?;
        self.shared.apply_event(&ChatEvent::ReactionUpdated {
            message_id: message_id.to_string(),
            reactions: reactions.clone(),
        });
        Ok(reactions)
    }

    pub async fn edit(&self, message_id: &str, content: &str) -> Result<ChatMessage> {
        let message = self
            .api
            .edit_message(&self.shared.chat_id, message_id, content)
            .await?;
        self.shared.apply_event(&ChatEvent::MessageEdited {
            message_id: message.id.clone(),
            updated_content: message.content.clone(),
            edited_at: message.edited_at,
        });
        Ok(message)
    }

    pub async fn delete(&self, message_id: &str) -> Result<()> {
        self.api
            .delete_message(&self.shared.chat_id, message_id)
            .await?;
        self.shared.apply_event(&ChatEvent::MessageDeleted {
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    pub async fn set_typing(&self, is_typing: bool) -> Result<()> {
        self.api.set_typing(&self.shared.chat_id, is_typing).await
    }

    /// Restart the connection state machine with a fresh attempt counter.
    pub fn reconnect(&self) -> Result<()> {
        self.commands
            .send(Command::Reconnect)
            .map_err(|_| ClientError::Closed)
    }

    /// Stop the controller. The open stream and any pending reconnect timer
    /// are dropped.
    pub fn close(&self) {
        self.task.abort();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ChatSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}
