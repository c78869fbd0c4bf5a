use std::collections::HashMap;
use std::sync::Arc;

use coursechat_common::Sender;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::api::{ChatApi, Uploader};
use crate::bus::{ClientEvent, EventBus};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::subscription::ChatSubscription;

/// Entry point: owns at most one live subscription per chat.
pub struct ChatClient {
    api: Arc<dyn ChatApi>,
    uploader: Option<Arc<dyn Uploader>>,
    config: ClientConfig,
    bus: EventBus,
    identity: Mutex<Option<Sender>>,
    subscriptions: Mutex<HashMap<String, Arc<ChatSubscription>>>,
}

impl ChatClient {
    pub fn new(api: Arc<dyn ChatApi>, config: ClientConfig) -> Self {
        let bus = EventBus::new(config.bus_capacity);
        Self {
            api,
            uploader: None,
            config,
            bus,
            identity: Mutex::new(None),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.bus.subscribe()
    }

    /// The caller's identity, fetched once and cached.
    pub async fn me(&self) -> Result<Sender> {
        if let Some(me) = self.identity.lock().clone() {
            return Ok(me);
        }
        let me = self.api.current_user().await?;
        *self.identity.lock() = Some(me.clone());
        Ok(me)
    }

    /// Drop the cached identity, e.g. after a profile change.
    pub fn forget_identity(&self) {
        self.identity.lock().take();
    }

    /// Start following a chat. An existing subscription to the same chat is
    /// closed first.
    pub async fn subscribe(&self, chat_id: &str) -> Result<Arc<ChatSubscription>> {
        let me = self.me().await?;

        // Remove and insert under one guard.
        let mut subscriptions = self.subscriptions.lock();
        if let Some(previous) = subscriptions.remove(chat_id) {
            tracing::info!(chat_id, "replacing existing subscription");
            previous.close();
        }

        let subscription = Arc::new(ChatSubscription::spawn(
            self.api.clone(),
            self.uploader.clone(),
            chat_id.to_string(),
            me,
            &self.config,
            self.bus.clone(),
        ));
        subscriptions.insert(chat_id.to_string(), subscription.clone());
        Ok(subscription)
    }

    pub fn subscription(&self, chat_id: &str) -> Option<Arc<ChatSubscription>> {
        self.subscriptions.lock().get(chat_id).cloned()
    }

    pub fn unsubscribe(&self, chat_id: &str) -> bool {
        let removed = self.subscriptions.lock().remove(chat_id);
        match removed {
            Some(subscription) => {
                subscription.close();
                true
            }
            None => false,
        }
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        for (_, subscription) in self.subscriptions.lock().drain() {
            subscription.close();
        }
    }
}
