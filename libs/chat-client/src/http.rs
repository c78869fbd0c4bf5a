//! `ChatApi` over HTTP with reqwest.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use coursechat_common::api::{
    EditMessageRequest, ListMessagesResponse, MeResponse, ReactRequest, ReactResponse,
    SendMessageRequest, SendMessageResponse, TypingRequest,
};
use coursechat_common::{ChatMessage, Reaction, Sender};
use futures_util::stream::{self, StreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::api::{ChatApi, EventStream};
use crate::error::{ClientError, Result};
use crate::sse::SseDecoder;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Applies to REST calls only; the push-channel request has no deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct HttpChatApi {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Deserialize)]
struct SuccessBody {
    success: bool,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        // No overall timeout: push-channel responses stay open indefinitely.
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self::with_client(client, base_url, token))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(AUTHORIZATION, format!("Bearer {}", self.token))
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let resp = check(self.authed(builder).timeout(REQUEST_TIMEOUT).send().await?).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Turn a non-2xx response into `ClientError::Status`.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (Some(body.error.code), body.error.message),
        Err(_) => (None, text),
    };
    Err(ClientError::Status {
        status: status.as_u16(),
        code,
        message,
    })
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn current_user(&self) -> Result<Sender> {
        let body: MeResponse = self.json(self.client.get(self.url("/me"))).await?;
        Ok(body.user)
    }

    async fn open_stream(&self, chat_id: &str) -> Result<EventStream> {
        let resp = self
            .authed(self.client.get(self.url("/chats/stream")))
            .query(&[("chatId", chat_id)])
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let resp = check(resp).await?;

        let state = (resp.bytes_stream().boxed(), SseDecoder::new(), VecDeque::new());
        let frames = stream::unfold(state, |(mut body, mut decoder, mut ready)| async move {
            loop {
                if let Some(frame) = ready.pop_front() {
                    return Some((frame, (body, decoder, ready)));
                }
                match body.next().await {
                    Some(Ok(chunk)) => ready.extend(decoder.feed(&chunk)),
                    Some(Err(err)) => {
                        return Some((Err(ClientError::Http(err)), (body, decoder, ready)))
                    }
                    None => return None,
                }
            }
        });

        Ok(frames.boxed())
    }

    async fn fetch_page(&self, chat_id: &str, page: u32, limit: u32) -> Result<ListMessagesResponse> {
        let body: ListMessagesResponse = self
            .json(
                self.client
                    .get(self.url(&format!("/chats/{chat_id}/messages")))
                    .query(&[("page", page), ("limit", limit)]),
            )
            .await?;
        if !body.success {
            return Err(ClientError::Rejected);
        }
        Ok(body)
    }

    async fn send_message(&self, chat_id: &str, request: &SendMessageRequest) -> Result<ChatMessage> {
        let body: SendMessageResponse = self
            .json(
                self.client
                    .post(self.url(&format!("/chats/{chat_id}/messages")))
                    .json(request),
            )
            .await?;
        if !body.success {
            return Err(ClientError::Rejected);
        }
        Ok(body.message)
    }

    async fn edit_message(&self, chat_id: &str, message_id: &str, content: &str) -> Result<ChatMessage> {
        let body: SendMessageResponse = self
            .json(
                self.client
                    .patch(self.url(&format!("/chats/{chat_id}/messages/{message_id}")))
                    .json(&EditMessageRequest {
                        content: content.to_string(),
                    }),
            )
            .await?;
        Ok(body.message)
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<()> {
        let resp = self
            .authed(
                self.client
                    .delete(self.url(&format!("/chats/{chat_id}/messages/{message_id}"))),
            )
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn react(&self, chat_id: &str, message_id: &str, emoji: &str) -> Result<Vec<Reaction>> {
        let body: ReactResponse = self
            .json(
                self.client
                    .post(self.url(&format!("/chats/{chat_id}/messages/{message_id}/react")))
                    .json(&ReactRequest {
                        emoji: emoji.to_string(),
                    }),
            )
            .await?;
        if !body.success {
            return Err(ClientError::Rejected);
        }
        Ok(body.reactions)
    }

    async fn set_typing(&self, chat_id: &str, is_typing: bool) -> Result<()> {
        let body: SuccessBody = self
            .json(
                self.client
                    .post(self.url(&format!("/chats/{chat_id}/typing")))
                    .json(&TypingRequest { is_typing }),
            )
            .await?;
        if !body.success {
            return Err(ClientError::Rejected);
        }
        Ok(())
    }
}
