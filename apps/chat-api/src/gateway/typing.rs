//! Who is typing in which chat, with expiry.
//!
//! Clients renew `isTyping=true` while the user types. Entries that are not
//! renewed within the TTL are swept and announced as stopped.

use std::time::{Duration, Instant};

use dashmap::DashMap;

struct TypingEntry {
    display_name: String,
    last_seen: Instant,
}

/// A typing indicator whose TTL elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredTyping {
    pub chat_id: String,
    pub user_id: String,
    pub display_name: String,
}

pub struct TypingTracker {
    inner: DashMap<(String, String), TypingEntry>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Record (or renew) that the user is typing. Returns true if they were
    /// not already marked as typing.
    pub fn start(&self, chat_id: &str, user_id: &str, display_name: &str) -> bool {
        let key = (chat_id.to_string(), user_id.to_string());
        let previous = self.inner.insert(
            key,
            TypingEntry {
                display_name: display_name.to_string(),
                last_seen: Instant::now(),
            },
        );
        previous.is_none()
    }

    /// Returns true if the user was marked as typing.
    pub fn stop(&self, chat_id: &str, user_id: &str) -> bool {
        self.inner
            .remove(&(chat_id.to_string(), user_id.to_string()))
            .is_some()
    }

    pub fn typing_in(&self, chat_id: &str) -> Vec<String> {
        let mut users: Vec<String> = self
            .inner
            .iter()
            .filter(|e| e.key().0 == chat_id)
            .map(|e| e.key().1.clone())
            .collect();
        users.sort();
        users
    }

    /// Remove entries older than `ttl` and return them for broadcasting.
    pub fn sweep_expired(&self, ttl: Duration) -> Vec<ExpiredTyping> {
        let now = Instant::now();
        let mut expired = Vec::new();
        self.inner.retain(|(chat_id, user_id), entry| {
            if now.duration_since(entry.last_seen) >= ttl {
                expired.push(ExpiredTyping {
                    chat_id: chat_id.clone(),
                    user_id: user_id.clone(),
                    display_name: entry.display_name.clone(),
                });
                false
            } else {
                true
            }
        });
        expired
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new()
    }
}
