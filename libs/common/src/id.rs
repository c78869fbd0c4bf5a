use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = coursechat_common::id::prefixed_ulid("msg");
/// assert!(id.starts_with("msg_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Returns true if `id` was minted client-side for a not-yet-persisted message.
pub fn is_temporary(id: &str) -> bool {
    id.starts_with(prefix::TEMP) && id.as_bytes().get(prefix::TEMP.len()) == Some(&b'_')
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const CHAT: &str = "cht";
    pub const MESSAGE: &str = "msg";
    pub const CONNECTION: &str = "sc";
    pub const SESSION: &str = "cst";
    /// Optimistic messages that have not been confirmed by the server.
    pub const TEMP: &str = "temp";
}
