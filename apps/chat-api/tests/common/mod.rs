#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use futures_util::StreamExt;
use serde_json::Value;

use chat_api::auth::tokens::{self, SessionData};
use chat_api::config::Config;
use chat_api::models::chat::Chat;
use chat_api::AppState;

/// Build a test AppState with in-memory collaborators.
pub fn test_state() -> AppState {
    AppState::in_memory(Config::default())
}

pub fn test_state_with(config: Config) -> AppState {
    AppState::in_memory(config)
}

/// Build the full application router wired to the test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = chat_api::routes::router().with_state(state.clone());
    (app, state)
}

/// Issue a session for a test user and return its bearer token.
pub async fn login(state: &AppState, user_id: &str, name: &str) -> String {
    tokens::issue_session(
        state.kv.as_ref(),
        &SessionData {
            user_id: user_id.to_string(),
            email: format!("{name}@example.com"),
            display_name: name.to_string(),
            icon_url: None,
        },
    )
    .await
    .expect("issue session")
}

/// Create a chat with the given participants and return its id.
pub async fn create_chat(state: &AppState, participants: &[&str]) -> String {
    let chat = Chat::new(
        "Test chat",
        participants.iter().map(|p| p.to_string()).collect(),
    );
    let id = chat.id.clone();
    state.store.create_chat(chat).await.expect("create chat");
    id
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Start an actual TCP server for push-channel testing.
pub async fn start_server(state: AppState) -> SocketAddr {
    let app = chat_api::routes::router().with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Reads `data:` frames off an SSE response.
pub struct FrameReader {
    body: futures_util::stream::BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buf: String,
}

impl FrameReader {
    pub fn new(resp: reqwest::Response) -> Self {
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        Self {
            body,
            buf: String::new(),
        }
    }

    /// Next decoded frame, or panic after `timeout`.
    pub async fn next(&mut self, timeout: Duration) -> Value {
        tokio::time::timeout(timeout, self.next_frame())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
    }

    /// Skip keep-alives and return the next state-changing frame.
    pub async fn next_event(&mut self, timeout: Duration) -> Value {
        loop {
            let frame = self.next(timeout).await;
            match frame["type"].as_str() {
                Some("ping") | Some("health_check") => continue,
                _ => return frame,
            }
        }
    }

    /// True if the server closes the stream within `timeout`. Frames that
    /// arrive before the close are discarded.
    pub async fn ended(&mut self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while self.next_frame().await.is_some() {}
        })
        .await
        .is_ok()
    }

    async fn next_frame(&mut self) -> Option<Value> {
        loop {
            if let Some(end) = self.buf.find("\n\n") {
                let raw: String = self.buf.drain(..end + 2).collect();
                let data: String = raw
                    .lines()
                    .filter_map(|l| l.strip_prefix("data:"))
                    .map(str::trim_start)
                    .collect::<Vec<_>>()
                    .join("\n");
                if data.is_empty() {
                    continue;
                }
                return Some(serde_json::from_str(&data).expect("frame is JSON"));
            }
            let chunk = self.body.next().await?.ok()?;
            self.buf.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}

/// Open a chat push-channel as the given user.
pub async fn open_chat_stream(addr: SocketAddr, token: &str, chat_id: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!("http://{addr}/api/v1/chats/stream"))
        .query(&[("chatId", chat_id)])
        .header("Authorization", bearer(token))
        .send()
        .await
        .expect("stream request")
}

/// Poll `check` until it returns true or the timeout elapses.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
