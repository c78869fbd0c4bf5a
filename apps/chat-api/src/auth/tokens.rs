//! Session tokens that identify the caller.
//!
//! Tokens are issued by the platform's session service. This module only
//! stores and resolves them through the [`KeyValueStore`].

use coursechat_common::id::prefix;
use coursechat_common::Sender;
use serde::{Deserialize, Serialize};

use crate::db::kv::KeyValueStore;
use crate::error::ApiError;

/// Generate an opaque random token with the given prefix.
pub fn generate_opaque_token(prefix: &str, bytes: usize) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::Rng;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(&buf))
}

/// Session TTL in seconds (24 hours).
pub const SESSION_TTL_SECS: u64 = 24 * 3600;

/// Identity stored alongside a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub icon_url: Option<String>,
}

impl SessionData {
    pub fn sender(&self) -> Sender {
        Sender {
            id: self.user_id.clone(),
            email: self.email.clone(),
            name: self.display_name.clone(),
            icon: self.icon_url.clone(),
        }
    }
}

fn session_key(token: &str) -> String {
    format!("chat:session:{}", token)
}

/// Store a new session for `data` and return its bearer token.
pub async fn issue_session(kv: &dyn KeyValueStore, data: &SessionData) -> Result<String, ApiError> {
    let token = generate_opaque_token(prefix::SESSION, 32);
    let value = serde_json::to_string(data)?;
    kv.set_ex(&session_key(&token), &value, SESSION_TTL_SECS).await?;
    Ok(token)
}

pub async fn lookup_session(
    kv: &dyn KeyValueStore,
    token: &str,
) -> Result<Option<SessionData>, ApiError> {
    match kv.get(&session_key(token)).await? {
        Some(v) => {
            let data: SessionData =
                serde_json::from_str(&v).map_err(|_| ApiError::internal("corrupt session data"))?;
            Ok(Some(data))
        }
        None => Ok(None),
    }
}

pub async fn revoke_session(kv: &dyn KeyValueStore, token: &str) -> Result<(), ApiError> {
    kv.del(&session_key(token)).await
}
