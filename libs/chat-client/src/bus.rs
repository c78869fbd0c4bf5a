//! In-process publish/subscribe for things the host UI reacts to.

use coursechat_common::ChatEvent;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::controller::ConnectionState;
use crate::scroll::ScrollAction;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    ConnectionState {
        chat_id: String,
        state: ConnectionState,
    },
    /// The chat's message list or typing set changed.
    MessagesChanged { chat_id: String },
    /// The host should apply this scroll action after re-rendering.
    Scroll {
        chat_id: String,
        action: ScrollAction,
    },
    NotificationCount { count: u64 },
    FriendsUpdated { friends: Value },
}

impl ClientEvent {
    /// Map a user-scoped push event onto the bus.
    pub fn from_user_event(event: &ChatEvent) -> Option<Self> {
        match event {
            ChatEvent::NotificationCount { count } => {
                Some(ClientEvent::NotificationCount { count: *count })
            }
            ChatEvent::FriendsUpdated { friends } => Some(ClientEvent::FriendsUpdated {
                friends: friends.clone(),
            }),
            _ => None,
        }
    }
}

/// Cloneable handle; every clone publishes to the same subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}
