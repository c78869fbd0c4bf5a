//! A single open push-channel.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use coursechat_common::id::{prefix, prefixed_ulid};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// A serialized event, shared by every connection it is written to.
pub type Frame = Arc<str>;

/// Why a frame could not be queued on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// The stream has gone away.
    Closed,
    /// The client is not draining its stream fast enough.
    Full,
}

pub struct Connection {
    /// Unique per open stream (`sc_` prefixed ULID).
    pub id: String,
    pub user_id: String,
    /// `None` for user-scoped notification streams.
    pub chat_id: Option<String>,
    pub created_at: DateTime<Utc>,
    last_activity_ms: AtomicI64,
    /// Taken on close so the stream drains its buffer and ends.
    sender: Mutex<Option<mpsc::Sender<Frame>>>,
}

impl Connection {
    /// Create a connection and the receiving half its stream reads from.
    pub fn open(
        user_id: String,
        chat_id: Option<String>,
        buffer: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let now = Utc::now();
        let conn = Self {
            id: prefixed_ulid(prefix::CONNECTION),
            user_id,
            chat_id,
            created_at: now,
            last_activity_ms: AtomicI64::new(now.timestamp_millis()),
            sender: Mutex::new(Some(sender)),
        };
        (Arc::new(conn), receiver)
    }

    /// Queue a frame without waiting. Frames pushed from one caller are
    /// received in the same order.
    pub fn try_push(&self, frame: Frame) -> Result<(), PushError> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(PushError::Closed)?;
        sender.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => PushError::Full,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }

    /// Stop accepting frames. Idempotent.
    pub fn close(&self) {
        self.sender.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .as_ref()
            .map_or(true, |s| s.is_closed())
    }

    /// Record that something was written to the stream.
    pub fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn idle_longer_than(&self, max_idle: std::time::Duration) -> bool {
        let idle_ms = Utc::now().timestamp_millis() - self.last_activity_ms.load(Ordering::Relaxed);
        idle_ms > i64::try_from(max_idle.as_millis()).unwrap_or(i64::MAX)
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, by: std::time::Duration) {
        self.last_activity_ms
            .fetch_sub(by.as_millis() as i64, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("chat_id", &self.chat_id)
            .field("created_at", &self.created_at)
            .finish()
    }
}
