//! Event fan-out to open push-channels.
//!
//! An event is serialized once and queued on every connection in its scope.
//! A connection that cannot take the frame is unregistered and delivery
//! carries on with the rest.

use std::sync::Arc;

use coursechat_common::ChatEvent;
use serde_json::Value;

use super::connection::{Frame, PushError};
use super::registry::ConnectionRegistry;

/// Audience of a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// Every connection subscribed to the chat.
    Chat(&'a str),
    /// Every connection owned by the user, whatever it is scoped to.
    User(&'a str),
}

/// Outcome of one publish call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub pruned: usize,
}

pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn publish(&self, scope: Scope<'_>, event: &ChatEvent) -> Delivery {
        let frame: Frame = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(err) => {
                tracing::error!(?err, kind = event.kind(), ?scope, "failed to serialize event");
                return Delivery::default();
            }
        };

        let targets = match scope {
            Scope::Chat(chat_id) => self.registry.connections_for_chat(chat_id),
            Scope::User(user_id) => self.registry.connections_for_user(user_id),
        };

        let mut delivery = Delivery::default();
        for conn in targets {
            match conn.try_push(frame.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(reason) => {
                    if reason == PushError::Full {
                        tracing::warn!(
                            connection_id = %conn.id,
                            user_id = %conn.user_id,
                            "connection buffer full, dropping slow consumer"
                        );
                    } else {
                        tracing::debug!(connection_id = %conn.id, "pruning closed connection");
                    }
                    self.registry.unregister(&conn.id);
                    delivery.pruned += 1;
                }
            }
        }

        tracing::debug!(
            kind = event.kind(),
            ?scope,
            delivered = delivery.delivered,
            pruned = delivery.pruned,
            "event published"
        );
        delivery
    }

    pub fn to_chat(&self, chat_id: &str, event: &ChatEvent) -> Delivery {
        self.publish(Scope::Chat(chat_id), event)
    }

    pub fn to_user(&self, user_id: &str, event: &ChatEvent) -> Delivery {
        self.publish(Scope::User(user_id), event)
    }

    /// Entry point for the notification subsystem.
    pub fn notification_count(&self, user_id: &str, count: u64) -> Delivery {
        self.to_user(user_id, &ChatEvent::NotificationCount { count })
    }

    /// Entry point for the friends subsystem.
    pub fn friends_updated(&self, user_id: &str, friends: Value) -> Delivery {
        self.to_user(user_id, &ChatEvent::FriendsUpdated { friends })
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::gateway::connection::Connection;

    fn setup() -> (Arc<ConnectionRegistry>, Dispatcher) {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone());
        (registry, dispatcher)
    }

    fn open(
        registry: &ConnectionRegistry,
        user: &str,
        chat: Option<&str>,
    ) -> (Arc<Connection>, mpsc::Receiver<Frame>) {
        let (conn, rx) = Connection::open(user.to_string(), chat.map(String::from), 8);
        registry.register(conn.clone());
        (conn, rx)
    }

    fn deleted(id: &str) -> ChatEvent {
        ChatEvent::MessageDeleted {
            message_id: id.to_string(),
        }
    }

    fn recv(rx: &mut mpsc::Receiver<Frame>) -> ChatEvent {
        serde_json::from_str(&rx.try_recv().expect("frame queued")).unwrap()
    }

    #[test]
    fn chat_events_reach_only_that_chat() {
        let (reg, dispatcher) = setup();
        let (_a, mut rx_a) = open(&reg, "alice", Some("c1"));
        let (_b, mut rx_b) = open(&reg, "bob", Some("c2"));

        let d = dispatcher.to_chat("c1", &deleted("m1"));
        assert_eq!(d, Delivery { delivered: 1, pruned: 0 });
        assert_eq!(recv(&mut rx_a), deleted("m1"));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn per_connection_order_matches_publish_order() {
        let (reg, dispatcher) = setup();
        let (_a, mut rx) = open(&reg, "alice", Some("c1"));

        dispatcher.to_chat("c1", &deleted("e1"));
        dispatcher.to_chat("c1", &deleted("e2"));
        dispatcher.to_chat("c1", &deleted("e3"));

        assert_eq!(recv(&mut rx), deleted("e1"));
        assert_eq!(recv(&mut rx), deleted("e2"));
        assert_eq!(recv(&mut rx), deleted("e3"));
    }

    #[test]
    fn dead_connection_does_not_block_the_rest() {
        let (reg, dispatcher) = setup();
        let (dead, dead_rx) = open(&reg, "alice", Some("c1"));
        let (_b, mut rx_b) = open(&reg, "bob", Some("c1"));
        let (_c, mut rx_c) = open(&reg, "carol", Some("c1"));
        drop(dead_rx);

        let d = dispatcher.to_chat("c1", &deleted("m1"));
        assert_eq!(d, Delivery { delivered: 2, pruned: 1 });
        assert_eq!(recv(&mut rx_b), deleted("m1"));
        assert_eq!(recv(&mut rx_c), deleted("m1"));

        assert_eq!(reg.chat_connection_count("c1"), 2);
        assert!(reg.unregister(&dead.id).is_none());
    }

    #[test]
    fn slow_consumer_is_pruned() {
        let (reg, dispatcher) = setup();
        let (conn, _rx) = Connection::open("alice".into(), Some("c1".into()), 1);
        reg.register(conn);

        assert_eq!(dispatcher.to_chat("c1", &deleted("m1")).delivered, 1);
        assert_eq!(dispatcher.to_chat("c1", &deleted("m2")).pruned, 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn user_events_reach_every_connection_of_the_user() {
        let (reg, dispatcher) = setup();
        let (_chat, mut rx_chat) = open(&reg, "alice", Some("c1"));
        let (_notif, mut rx_notif) = open(&reg, "alice", None);
        let (_bob, mut rx_bob) = open(&reg, "bob", Some("c1"));

        let d = dispatcher.notification_count("alice", 7);
        assert_eq!(d.delivered, 2);
        assert_eq!(recv(&mut rx_chat), ChatEvent::NotificationCount { count: 7 });
        assert_eq!(recv(&mut rx_notif), ChatEvent::NotificationCount { count: 7 });
        assert!(rx_bob.try_recv().is_err());
    }

    #[test]
    fn publish_to_empty_scope_is_a_no_op() {
        let (_reg, dispatcher) = setup();
        assert_eq!(
            dispatcher.friends_updated("nobody", serde_json::json!([])),
            Delivery::default()
        );
    }
}
