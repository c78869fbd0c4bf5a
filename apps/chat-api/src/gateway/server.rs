//! Push-channel endpoint: SSE upgrade and per-connection stream.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use axum::routing::get;
use axum::Router;
use coursechat_common::ChatEvent;
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{self, Interval, MissedTickBehavior};

use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::routes::require_participant;
use crate::AppState;

use super::connection::{Connection, Frame};
use super::registry::ConnectionRegistry;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chats/stream", get(chat_stream))
        .route("/notifications/stream", get(notification_stream))
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    #[serde(rename = "chatId")]
    pub chat_id: String,
}

async fn chat_stream(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let chat = require_participant(&state, &params.chat_id, auth.user_id()).await?;
    Ok(open_stream(&state, auth.0.user_id, Some(chat.id)))
}

async fn notification_stream(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    open_stream(&state, auth.0.user_id, None)
}

/// Register a new connection and build the stream that feeds it.
///
/// The `connected` frame is queued before the connection becomes visible to
/// the dispatcher, so it is always the first frame on the stream.
fn open_stream(
    state: &AppState,
    user_id: String,
    chat_id: Option<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (conn, rx) = Connection::open(user_id, chat_id.clone(), state.config.connection_buffer);

    let hello = ChatEvent::Connected {
        connection_id: conn.id.clone(),
        chat_id,
    };
    match serde_json::to_string(&hello) {
        Ok(json) => {
            let _ = conn.try_push(json.into());
        }
        Err(err) => tracing::error!(?err, "failed to serialize connected frame"),
    }

    state.registry.register(conn.clone());

    tracing::info!(
        connection_id = %conn.id,
        user_id = %conn.user_id,
        chat_id = conn.chat_id.as_deref().unwrap_or("-"),
        "push-channel opened"
    );

    let period = state.config.keepalive_interval;
    let mut keepalive = time::interval_at(time::Instant::now() + period, period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let channel = ChannelStream {
        rx,
        keepalive,
        ticks: 0,
        health_check_every: state.config.health_check_every.max(1),
        guard: ConnectionGuard {
            conn,
            registry: state.registry.clone(),
        },
    };

    Sse::new(stream::unfold(channel, next_frame))
}

/// Unregisters the connection when the response stream is dropped, which
/// happens when the client disconnects or a write fails.
struct ConnectionGuard {
    conn: Arc<Connection>,
    registry: Arc<ConnectionRegistry>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.conn.id);
        tracing::info!(
            connection_id = %self.conn.id,
            user_id = %self.conn.user_id,
            "push-channel closed"
        );
    }
}

struct ChannelStream {
    rx: mpsc::Receiver<Frame>,
    keepalive: Interval,
    ticks: u32,
    health_check_every: u32,
    guard: ConnectionGuard,
}

impl ChannelStream {
    fn keepalive_frame(&mut self) -> Frame {
        self.ticks = self.ticks.wrapping_add(1);
        let event = if self.ticks % self.health_check_every == 0 {
            ChatEvent::HealthCheck {
                timestamp: chrono::Utc::now(),
                connections: self.guard.registry.len(),
            }
        } else {
            ChatEvent::ping()
        };
        serde_json::to_string(&event)
            .map(Frame::from)
            .unwrap_or_else(|_| Frame::from(r#"{"type":"ping"}"#))
    }
}

async fn next_frame(mut channel: ChannelStream) -> Option<(Result<Event, Infallible>, ChannelStream)> {
    let frame = tokio::select! {
        // Queued frames go first so a burst is not interleaved with pings.
        biased;
        frame = channel.rx.recv() => match frame {
            Some(frame) => frame,
            // Closed by the registry: end the stream so the client reconnects.
            None => return None,
        },
        _ = channel.keepalive.tick() => channel.keepalive_frame(),
    };

    channel.guard.conn.touch();
    Some((Ok(Event::default().data(&*frame)), channel))
}
