//! Local message list for one chat.
//!
//! Stream events, optimistic sends and fetched pages all mutate the list
//! through this type, and only through it.

use std::collections::BTreeMap;

use coursechat_common::{Attachment, ChatEvent, ChatMessage};

use crate::scroll::{ScrollAction, ScrollAnchor, ScrollTracker, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Shown optimistically, persist request in flight.
    Pending,
    Confirmed,
    /// Persist failed. Kept until the user retries or discards it.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalMessage {
    pub message: ChatMessage,
    pub state: DeliveryState,
}

impl LocalMessage {
    fn confirmed(message: ChatMessage) -> Self {
        Self {
            message,
            state: DeliveryState::Confirmed,
        }
    }

    pub fn id(&self) -> &str {
        &self.message.id
    }

    pub fn is_optimistic(&self) -> bool {
        self.state != DeliveryState::Confirmed
    }

    pub fn is_failed(&self) -> bool {
        self.state == DeliveryState::Failed
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
    /// Confirmed entries the server no longer has.
    pub removed: usize,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.updated > 0 || self.removed > 0
    }
}

#[derive(Debug, Clone)]
pub struct ChatView {
    chat_id: String,
    my_id: String,
    messages: Vec<LocalMessage>,
    /// user id -> display name
    typing: BTreeMap<String, String>,
    pages_loaded: u32,
    has_more: bool,
    scroll: ScrollTracker,
}

impl ChatView {
    pub fn new(chat_id: impl Into<String>, my_id: impl Into<String>, near_bottom_px: f64) -> Self {
        Self {
            chat_id: chat_id.into(),
            my_id: my_id.into(),
            messages: Vec::new(),
            typing: BTreeMap::new(),
            pages_loaded: 0,
            has_more: true,
            scroll: ScrollTracker::new(near_bottom_px),
        }
    }

    pub fn messages(&self) -> &[LocalMessage] {
        &self.messages
    }

    pub fn get(&self, id: &str) -> Option<&LocalMessage> {
        self.messages.iter().find(|m| m.id() == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Display names of the other users currently typing.
    pub fn typing(&self) -> Vec<String> {
        self.typing.values().cloned().collect()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn pages_loaded(&self) -> u32 {
        self.pages_loaded
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.scroll.set_viewport(viewport);
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id() == id)
    }

    /// Pending or failed entry whose temp id matches the message's nonce.
    fn pending_for(&self, message: &ChatMessage) -> Option<usize> {
        let nonce = message.client_nonce.as_deref()?;
        self.messages
            .iter()
            .position(|m| m.is_optimistic() && m.id() == nonce)
    }

    // -----------------------------------------------------------------------
    // Stream events
    // -----------------------------------------------------------------------

    /// Apply one chat-scoped event. `None` means the list did not change.
    pub fn apply(&mut self, event: &ChatEvent) -> Option<ScrollAction> {
        match event {
            ChatEvent::NewMessage { message } => self.on_new_message(message),
            ChatEvent::MessageEdited {
                message_id,
                updated_content,
                edited_at,
            } => {
                let idx = self.position(message_id)?;
                let msg = &mut self.messages[idx].message;
                msg.content = updated_content.clone();
                msg.edited_at = (*edited_at).or(msg.edited_at);
                Some(ScrollAction::None)
            }
            ChatEvent::MessageDeleted { message_id } => {
                let idx = self.position(message_id)?;
                self.messages.remove(idx);
                Some(ScrollAction::None)
            }
            ChatEvent::ReactionUpdated {
                message_id,
                reactions,
            } => {
                let idx = self.position(message_id)?;
                self.messages[idx].message.reactions = reactions.clone();
                Some(ScrollAction::None)
            }
            ChatEvent::Typing {
                chat_id,
                user_id,
                display_name,
                is_typing,
            } => {
                if chat_id != &self.chat_id || user_id == &self.my_id {
                    return None;
                }
                let changed = if *is_typing {
                    self.typing.insert(user_id.clone(), display_name.clone()).as_ref()
                        != Some(display_name)
                } else {
                    self.typing.remove(user_id).is_some()
                };
                changed.then_some(ScrollAction::None)
            }
            _ => None,
        }
    }

    fn on_new_message(&mut self, message: &ChatMessage) -> Option<ScrollAction> {
        if message.chat_id != self.chat_id || self.position(&message.id).is_some() {
            return None;
        }
        if let Some(idx) = self.pending_for(message) {
            // Our own send echoed back before its persist call returned.
            self.messages[idx] = LocalMessage::confirmed(message.clone());
            return Some(ScrollAction::None);
        }
        self.typing.remove(&message.sender.id);
        self.messages.push(LocalMessage::confirmed(message.clone()));
        Some(self.scroll.on_incoming())
    }

    // -----------------------------------------------------------------------
    // Optimistic sends
    // -----------------------------------------------------------------------

    pub fn push_optimistic(&mut self, message: ChatMessage) -> ScrollAction {
        self.messages.push(LocalMessage {
            message,
            state: DeliveryState::Pending,
        });
        self.scroll.on_own_send()
    }

    /// Swap uploaded attachments in for the placeholders of a pending send.
    pub fn set_attachments(&mut self, temp_id: &str, attachments: Vec<Attachment>) -> bool {
        match self.position(temp_id) {
            Some(idx) if self.messages[idx].is_optimistic() => {
                self.messages[idx].message.attachments = attachments;
                true
            }
            _ => false,
        }
    }

    /// Replace the optimistic entry with the server's copy, in place.
    ///
    /// If the push echo already confirmed it, the server copy overwrites that
    /// entry instead. Returns false when neither is present.
    pub fn confirm(&mut self, temp_id: &str, message: ChatMessage) -> bool {
        let temp = self.position(temp_id);
        let real = self.position(&message.id);
        match (temp, real) {
            (Some(t), Some(r)) => {
                self.messages[t] = LocalMessage::confirmed(message);
                self.messages.remove(r);
                true
            }
            (Some(idx), None) | (None, Some(idx)) => {
                self.messages[idx] = LocalMessage::confirmed(message);
                true
            }
            (None, None) => false,
        }
    }

    pub fn fail(&mut self, temp_id: &str) -> bool {
        match self.position(temp_id) {
            Some(idx) if self.messages[idx].is_optimistic() => {
                self.messages[idx].state = DeliveryState::Failed;
                true
            }
            _ => false,
        }
    }

    /// Move a failed entry back to pending and return it for resending.
    pub fn mark_retrying(&mut self, temp_id: &str) -> Option<ChatMessage> {
        let idx = self.position(temp_id)?;
        let entry = &mut self.messages[idx];
        if entry.state != DeliveryState::Failed {
            return None;
        }
        entry.state = DeliveryState::Pending;
        Some(entry.message.clone())
    }

    pub fn pending(&self, temp_id: &str) -> Option<ChatMessage> {
        self.get(temp_id)
            .filter(|m| m.state == DeliveryState::Pending)
            .map(|m| m.message.clone())
    }

    /// Drop a failed entry.
    pub fn discard(&mut self, temp_id: &str) -> bool {
        match self.position(temp_id) {
            Some(idx) if self.messages[idx].is_failed() => {
                self.messages.remove(idx);
                true
            }
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Fetched pages
    // -----------------------------------------------------------------------

    pub fn begin_page_load(&mut self) -> Option<ScrollAnchor> {
        if !self.has_more || self.scroll.is_loading_older() {
            return None;
        }
        Some(self.scroll.begin_page_load())
    }

    pub fn cancel_page_load(&mut self) {
        self.scroll.cancel_page_load();
    }

    /// Prepend an older page, skipping ids already present. Returns the
    /// number of messages inserted and the restore action for the host.
    pub fn prepend_page(
        &mut self,
        messages: Vec<ChatMessage>,
        has_more: bool,
        anchor: ScrollAnchor,
    ) -> (usize, ScrollAction) {
        let fresh: Vec<LocalMessage> = messages
            .into_iter()
            .filter(|m| self.position(&m.id).is_none())
            .map(LocalMessage::confirmed)
            .collect();
        let inserted = fresh.len();
        self.messages.splice(0..0, fresh);
        self.pages_loaded += 1;
        self.has_more = has_more;
        (inserted, self.scroll.end_page_load(anchor))
    }

    /// Merge the latest page from a poll or reconciliation fetch.
    ///
    /// Unknown ids go in at their chronological position, confirmed entries
    /// take the server's content and reactions, local pending or failed
    /// entries are left alone unless the page carries their nonce.
    pub fn merge_latest(&mut self, messages: Vec<ChatMessage>, has_more: bool) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        if self.pages_loaded == 0 {
            self.pages_loaded = 1;
            self.has_more = has_more;
        }

        let messages: Vec<ChatMessage> = messages
            .into_iter()
            .filter(|m| m.chat_id == self.chat_id)
            .collect();

        // The page is authoritative within its own time range, and for all
        // older history when nothing precedes it.
        let oldest = messages.iter().map(|m| m.created_at).min();
        let newest = messages.iter().map(|m| m.created_at).max();
        if let (Some(oldest), Some(newest)) = (oldest, newest) {
            let before = self.messages.len();
            self.messages.retain(|local| {
                let at = local.message.created_at;
                local.is_optimistic()
                    || (has_more && at < oldest)
                    || at > newest
                    || messages.iter().any(|m| m.id == local.message.id)
            });
            outcome.removed = before - self.messages.len();
        }

        for message in messages {
            if let Some(idx) = self.position(&message.id) {
                let existing = &mut self.messages[idx].message;
                if existing.content != message.content
                    || existing.reactions != message.reactions
                    || existing.edited_at != message.edited_at
                {
                    existing.content = message.content;
                    existing.reactions = message.reactions;
                    existing.edited_at = message.edited_at;
                    outcome.updated += 1;
                }
                continue;
            }
            if let Some(idx) = self.pending_for(&message) {
                self.messages[idx] = LocalMessage::confirmed(message);
                outcome.updated += 1;
                continue;
            }
            let at = self
                .messages
                .iter()
                .position(|m| !m.is_optimistic() && m.message.created_at > message.created_at)
                .or_else(|| self.messages.iter().position(LocalMessage::is_optimistic))
                .unwrap_or(self.messages.len());
            self.messages.insert(at, LocalMessage::confirmed(message));
            outcome.inserted += 1;
        }

        outcome
    }

    /// Scroll action for messages that arrived through a merge.
    pub fn incoming_scroll(&self) -> ScrollAction {
        self.scroll.on_incoming()
    }
}
