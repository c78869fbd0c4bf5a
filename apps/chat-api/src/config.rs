use std::time::Duration;

/// Chat API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Interval between keep-alive frames on an open stream.
    pub keepalive_interval: Duration,
    /// Every Nth keep-alive is a `health_check` instead of a `ping`.
    pub health_check_every: u32,
    /// Connections silent for longer than this are pruned by the sweeper.
    pub stale_connection_after: Duration,
    /// How often the background sweepers run.
    pub sweep_interval: Duration,
    /// A typing indicator not renewed within this window is cleared.
    pub typing_ttl: Duration,
    /// Frames buffered per connection before it is treated as dead.
    pub connection_buffer: usize,
    /// Seed a demo chat with two users on start-up.
    pub dev_seed: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4100,
            keepalive_interval: Duration::from_secs(25),
            health_check_every: 4,
            stale_connection_after: Duration::from_secs(90),
            sweep_interval: Duration::from_secs(15),
            typing_ttl: Duration::from_secs(6),
            connection_buffer: 256,
            dev_seed: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables. Every variable is
    /// optional and falls back to [`Config::default`].
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed_var("PORT").unwrap_or(defaults.port),
            keepalive_interval: secs_var("CHAT_KEEPALIVE_SECS")
                .unwrap_or(defaults.keepalive_interval),
            health_check_every: parsed_var("CHAT_HEALTH_CHECK_EVERY")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.health_check_every),
            stale_connection_after: secs_var("CHAT_STALE_CONNECTION_SECS")
                .unwrap_or(defaults.stale_connection_after),
            sweep_interval: secs_var("CHAT_SWEEP_INTERVAL_SECS")
                .unwrap_or(defaults.sweep_interval),
            typing_ttl: secs_var("CHAT_TYPING_TTL_SECS").unwrap_or(defaults.typing_ttl),
            connection_buffer: parsed_var("CHAT_CONNECTION_BUFFER")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.connection_buffer),
            dev_seed: std::env::var("CHAT_DEV_SEED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.dev_seed),
        }
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn secs_var(name: &str) -> Option<Duration> {
    parsed_var::<u64>(name)
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}
