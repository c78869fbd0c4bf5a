use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the chat client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response. `code` comes from the server's error body when it
    /// has one.
    #[error("server returned {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// A frame or response body that is not valid JSON for its type.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The server accepted the request but reported `success: false`.
    #[error("request rejected by server")]
    Rejected,

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("no local message with id {0}")]
    UnknownMessage(String),

    #[error("subscription closed")]
    Closed,
}

impl ClientError {
    /// True for errors that mean the stream itself is gone. A bad frame is
    /// not one of them: the stream carries on after it.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}
