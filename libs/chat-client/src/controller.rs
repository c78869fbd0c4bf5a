//! Per-chat stream controller.
//!
//! One task per subscription owns the push-channel. It opens the stream,
//! watches it for silence, reconnects with backoff and falls back to
//! polling once reconnects are exhausted. Aborting the task drops the open
//! stream and any pending timer with it.

use std::sync::Arc;
use std::time::Duration;

use coursechat_common::{ChatEvent, Sender};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::api::{ChatApi, EventStream};
use crate::backoff::ReconnectState;
use crate::bus::{ClientEvent, EventBus};
use crate::config::ClientConfig;
use crate::scroll::ScrollAction;
use crate::view::ChatView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected { connection_id: String },
    /// Reconnects exhausted. Polling may still be running.
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

#[derive(Debug)]
pub(crate) enum Command {
    Reconnect,
}

/// State shared between a subscription handle and its controller task.
pub(crate) struct Shared {
    pub chat_id: String,
    pub me: Sender,
    pub view: Mutex<ChatView>,
    pub state: watch::Sender<ConnectionState>,
    pub bus: EventBus,
}

impl Shared {
    pub fn new(chat_id: String, me: Sender, config: &ClientConfig, bus: EventBus) -> Self {
        let view = ChatView::new(chat_id.clone(), me.id.clone(), config.near_bottom_px);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            chat_id,
            me,
            view: Mutex::new(view),
            state,
            bus,
        }
    }

    pub fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next.clone();
            true
        });
        if changed {
            tracing::debug!(chat_id = %self.chat_id, state = ?next, "connection state");
            self.bus.publish(ClientEvent::ConnectionState {
                chat_id: self.chat_id.clone(),
                state: next,
            });
        }
    }

    /// Tell the host about a list change. `None` means nothing changed.
    pub fn notify(&self, change: Option<ScrollAction>) {
        let Some(action) = change else {
            return;
        };
        self.bus.publish(ClientEvent::MessagesChanged {
            chat_id: self.chat_id.clone(),
        });
        if !action.is_none() {
            self.bus.publish(ClientEvent::Scroll {
                chat_id: self.chat_id.clone(),
                action,
            });
        }
    }

    pub fn apply_event(&self, event: &ChatEvent) {
        let change = self.view.lock().apply(event);
        self.notify(change);
    }
}

/// What ended a wait inside the controller.
enum Flow {
    /// Timer elapsed or stream ended; carry on with the state machine.
    Continue,
    /// Caller asked for an immediate reconnect.
    Reconnect,
    /// The subscription handle is gone.
    Shutdown,
}

pub(crate) struct Controller {
    api: Arc<dyn ChatApi>,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    backoff: ReconnectState,
    stale_after: Duration,
    stale_check_every: Duration,
    poll_interval: Duration,
    poll_window: Duration,
    reconcile_every: Duration,
    request_timeout: Duration,
    page_size: u32,
    /// Set once the first stream reports `connected`.
    connected_before: bool,
}

impl Controller {
    pub fn new(
        api: Arc<dyn ChatApi>,
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            api,
            shared,
            commands,
            backoff: ReconnectState::new(config.reconnect.clone()),
            stale_after: config.stale_after,
            stale_check_every: config.stale_check_every,
            poll_interval: config.poll_interval,
            poll_window: config.poll_window,
            reconcile_every: config.reconcile_every,
            request_timeout: config.request_timeout,
            page_size: config.page_size,
            connected_before: false,
        }
    }

    pub async fn run(mut self) {
        self.refresh_latest().await;

        loop {
            match self.connect_once().await {
                Flow::Shutdown => return,
                Flow::Reconnect => {
                    self.backoff.reset();
                    continue;
                }
                Flow::Continue => {}
            }

            let flow = match self.backoff.next_delay() {
                Some((attempt, delay)) => {
                    tracing::info!(
                        chat_id = %self.shared.chat_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "reconnect scheduled"
                    );
                    self.wait(delay).await
                }
                None => {
                    tracing::warn!(
                        chat_id = %self.shared.chat_id,
                        attempts = self.backoff.attempts(),
                        "reconnects exhausted, falling back to polling"
                    );
                    self.shared.set_state(ConnectionState::Failed);
                    self.poll_fallback().await
                }
            };

            match flow {
                Flow::Shutdown => return,
                Flow::Reconnect => self.backoff.reset(),
                Flow::Continue => {}
            }
        }
    }

    /// Open one stream and pump it until it ends.
    async fn connect_once(&mut self) -> Flow {
        self.shared.set_state(ConnectionState::Connecting);
        let flow = match self.api.open_stream(&self.shared.chat_id).await {
            Ok(stream) => self.pump(stream).await,
            Err(err) => {
                tracing::warn!(chat_id = %self.shared.chat_id, error = %err, "failed to open stream");
                Flow::Continue
            }
        };
        self.shared.set_state(ConnectionState::Disconnected);
        flow
    }

    async fn pump(&mut self, mut stream: EventStream) -> Flow {
        let start = Instant::now();
        let mut last_traffic = start;
        let mut saw_new_message = false;

        let mut stale_check = time::interval_at(start + self.stale_check_every, self.stale_check_every);
        stale_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reconcile = time::interval_at(start + self.reconcile_every, self.reconcile_every);
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                item = stream.next() => match item {
                    Some(Ok(event)) => {
                        last_traffic = Instant::now();
                        self.backoff.reset();
                        let connected = matches!(event, ChatEvent::Connected { .. });
                        if matches!(event, ChatEvent::NewMessage { .. }) {
                            saw_new_message = true;
                        }
                        self.handle_event(event);
                        if connected {
                            if self.connected_before {
                                tracing::debug!(chat_id = %self.shared.chat_id, "reconnected, catching up on latest page");
                                self.refresh_latest().await;
                            }
                            self.connected_before = true;
                        }
                    }
                    Some(Err(err)) if !err.is_transport() => {
                        last_traffic = Instant::now();
                        tracing::warn!(chat_id = %self.shared.chat_id, error = %err, "ignoring undecodable frame");
                    }
                    Some(Err(err)) => {
                        tracing::warn!(chat_id = %self.shared.chat_id, error = %err, "stream error");
                        return Flow::Continue;
                    }
                    None => {
                        tracing::info!(chat_id = %self.shared.chat_id, "stream closed by server");
                        return Flow::Continue;
                    }
                },
                _ = stale_check.tick() => {
                    if last_traffic.elapsed() >= self.stale_after {
                        tracing::warn!(
                            chat_id = %self.shared.chat_id,
                            silent_ms = last_traffic.elapsed().as_millis() as u64,
                            "stream went silent, closing"
                        );
                        return Flow::Continue;
                    }
                }
                _ = reconcile.tick() => {
                    let connected = self.shared.state.borrow().is_connected();
                    if connected && !saw_new_message {
                        tracing::debug!(chat_id = %self.shared.chat_id, "no new messages in window, refetching latest page");
                        self.refresh_latest().await;
                    }
                    saw_new_message = false;
                }
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Reconnect) => return Flow::Reconnect,
                    None => return Flow::Shutdown,
                },
            }
        }
    }

    fn handle_event(&self, event: ChatEvent) {
        match &event {
            ChatEvent::Connected { connection_id, .. } => {
                tracing::info!(chat_id = %self.shared.chat_id, connection_id = %connection_id, "stream connected");
                self.shared.set_state(ConnectionState::Connected {
                    connection_id: connection_id.clone(),
                });
            }
            ChatEvent::Ping { .. } | ChatEvent::HealthCheck { .. } => {}
            ChatEvent::NotificationCount { .. } | ChatEvent::FriendsUpdated { .. } => {
                if let Some(ev) = ClientEvent::from_user_event(&event) {
                    self.shared.bus.publish(ev);
                }
            }
            ChatEvent::Unknown => {
                tracing::debug!(chat_id = %self.shared.chat_id, "ignoring unknown event kind");
            }
            _ => self.shared.apply_event(&event),
        }
    }

    /// Fetch page 1 and merge it into the view. Gives up after
    /// `request_timeout`.
    async fn refresh_latest(&self) {
        let fetch = self.api.fetch_page(&self.shared.chat_id, 1, self.page_size);
        let Ok(result) = time::timeout(self.request_timeout, fetch).await else {
            tracing::warn!(
                chat_id = %self.shared.chat_id,
                timeout_ms = self.request_timeout.as_millis() as u64,
                "latest page fetch timed out"
            );
            return;
        };
        match result {
            Ok(page) => {
                let change = {
                    let mut view = self.shared.view.lock();
                    let outcome = view.merge_latest(page.messages, page.pagination.has_more);
                    match outcome {
                        o if o.inserted > 0 => Some(view.incoming_scroll()),
                        o if o.changed() => Some(ScrollAction::None),
                        _ => None,
                    }
                };
                self.shared.notify(change);
            }
            Err(err) => {
                tracing::warn!(chat_id = %self.shared.chat_id, error = %err, "failed to fetch latest messages");
            }
        }
    }

    async fn wait(&mut self, delay: Duration) -> Flow {
        tokio::select! {
            _ = time::sleep(delay) => Flow::Continue,
            cmd = self.commands.recv() => match cmd {
                Some(Command::Reconnect) => Flow::Reconnect,
                None => Flow::Shutdown,
            },
        }
    }

    /// Poll the latest page for `poll_window`, then idle in `Failed` until a
    /// reconnect is requested.
    async fn poll_fallback(&mut self) -> Flow {
        let window = time::sleep(self.poll_window);
        tokio::pin!(window);
        let mut polling = true;
        let mut poll = time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick(), if polling => self.refresh_latest().await,
                _ = &mut window, if polling => {
                    tracing::warn!(chat_id = %self.shared.chat_id, "polling window elapsed, subscription idle");
                    polling = false;
                }
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Reconnect) => {
                        tracing::info!(chat_id = %self.shared.chat_id, "manual reconnect requested");
                        return Flow::Reconnect;
                    }
                    None => return Flow::Shutdown,
                },
            }
        }
    }
}
