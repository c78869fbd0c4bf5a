use std::time::Duration;

use crate::backoff::ReconnectPolicy;

/// Client configuration. `Default` carries production timings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the chat API, without the `/api/v1` prefix.
    pub base_url: String,
    /// Bearer session token.
    pub token: String,
    pub reconnect: ReconnectPolicy,
    /// A stream silent for this long is presumed dead.
    pub stale_after: Duration,
    /// How often the staleness check runs.
    pub stale_check_every: Duration,
    /// Fallback poll period once reconnects are exhausted.
    pub poll_interval: Duration,
    /// How long fallback polling lasts before the subscription idles in `Failed`.
    pub poll_window: Duration,
    /// Latest-page refetch period while connected but quiet.
    pub reconcile_every: Duration,
    /// Upper bound on a background page fetch.
    pub request_timeout: Duration,
    pub page_size: u32,
    /// Viewport distance from the bottom that still counts as "at the bottom".
    pub near_bottom_px: f64,
    pub bus_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4100".to_string(),
            token: String::new(),
            reconnect: ReconnectPolicy::default(),
            stale_after: Duration::from_secs(60),
            stale_check_every: Duration::from_secs(1),
            poll_interval: Duration::from_secs(15),
            poll_window: Duration::from_secs(300),
            reconcile_every: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
            page_size: 20,
            near_bottom_px: 100.0,
            bus_capacity: 256,
        }
    }
}

impl ClientConfig {
    /// Read `CHAT_API_URL` and `CHAT_TOKEN`. Timings keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("CHAT_API_URL").unwrap_or(defaults.base_url.clone()),
            token: std::env::var("CHAT_TOKEN").unwrap_or_default(),
            ..defaults
        }
    }
}
