pub mod connection;
pub mod fanout;
pub mod registry;
pub mod server;
pub mod typing;

use coursechat_common::ChatEvent;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::AppState;

/// Spawn the background sweeper that prunes stale connections and expires
/// typing indicators.
pub fn spawn_sweepers(state: &AppState) -> JoinHandle<()> {
    let state = state.clone();
    tokio::spawn(async move {
        let mut tick = time::interval(state.config.sweep_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            sweep_once(&state);
        }
    })
}

/// One sweeper pass. Public so tests can drive it without timers.
pub fn sweep_once(state: &AppState) {
    let pruned = state.registry.prune_stale(state.config.stale_connection_after);
    if !pruned.is_empty() {
        tracing::info!(count = pruned.len(), "pruned stale connections");
    }

    for expired in state.typing.sweep_expired(state.config.typing_ttl) {
        state.dispatcher.to_chat(
            &expired.chat_id,
            &ChatEvent::Typing {
                chat_id: expired.chat_id.clone(),
                user_id: expired.user_id,
                display_name: expired.display_name,
                is_typing: false,
            },
        );
    }
}
