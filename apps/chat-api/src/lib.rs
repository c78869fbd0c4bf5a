pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;

use std::sync::Arc;

use config::Config;
use db::kv::{KeyValueStore, MemoryStore};
use db::store::{ChatStore, MemoryChatStore};
use gateway::fanout::Dispatcher;
use gateway::registry::ConnectionRegistry;
use gateway::typing::TypingTracker;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub typing: Arc<TypingTracker>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn ChatStore>, kv: Arc<dyn KeyValueStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            store,
            kv,
            config: Arc::new(config),
            dispatcher: Arc::new(Dispatcher::new(registry.clone())),
            registry,
            typing: Arc::new(TypingTracker::new()),
        }
    }

    /// State backed by the in-memory store and session table.
    pub fn in_memory(config: Config) -> Self {
        Self::new(
            config,
            Arc::new(MemoryChatStore::new()),
            Arc::new(MemoryStore::new()),
        )
    }
}
