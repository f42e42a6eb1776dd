//! Sync client configuration

use std::time::Duration;

/// Configuration for the order synchronization channel
///
/// # Environment variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | ORDER_API_URL | http://localhost:8080 | REST base URL |
/// | ORDER_PUSH_URL | derived from ORDER_API_URL | WebSocket URL |
/// | ORDER_API_TOKEN | - | Bearer token |
/// | ORDER_POLL_INTERVAL_SECS | 15 | Full refetch interval |
/// | ORDER_REQUEST_TIMEOUT_MS | 10000 | Per-request timeout |
/// | ORDER_RECONNECT_DELAY_MS | 500 | First push reconnect delay |
/// | ORDER_MAX_RECONNECT_DELAY_SECS | 30 | Backoff ceiling |
/// | ORDER_OPTIMISTIC_UPDATES | false | Apply status changes before confirmation |
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// REST base URL (e.g. "http://localhost:8080")
    pub base_url: String,
    /// Push channel URL; derived from `base_url` when None
    pub push_url: Option<String>,
    /// Bearer token
    pub token: Option<String>,
    /// Interval between scheduled full refetches
    pub poll_interval: Duration,
    /// Bound on every REST request, pull included
    pub request_timeout: Duration,
    /// First push reconnect delay
    pub reconnect_delay: Duration,
    /// Exponential backoff ceiling
    pub max_reconnect_delay: Duration,
    /// Replace the local order before the backend confirms a status change
    pub optimistic_updates: bool,
}

impl SyncConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            push_url: None,
            token: None,
            poll_interval: Duration::from_secs(15),
            request_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_millis(500),
            max_reconnect_delay: Duration::from_secs(30),
            optimistic_updates: false,
        }
    }

    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::new(
            std::env::var("ORDER_API_URL").unwrap_or_else(|_| "http://localhost:8080".into()),
        );
        config.push_url = std::env::var("ORDER_PUSH_URL").ok();
        config.token = std::env::var("ORDER_API_TOKEN").ok().filter(|t| !t.is_empty());
        if let Some(secs) = env_parse::<u64>("ORDER_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(ms) = env_parse::<u64>("ORDER_REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = env_parse::<u64>("ORDER_RECONNECT_DELAY_MS") {
            config.reconnect_delay = Duration::from_millis(ms.max(1));
        }
        if let Some(secs) = env_parse::<u64>("ORDER_MAX_RECONNECT_DELAY_SECS") {
            config.max_reconnect_delay = Duration::from_secs(secs.max(1));
        }
        if let Some(enabled) = env_parse::<bool>("ORDER_OPTIMISTIC_UPDATES") {
            config.optimistic_updates = enabled;
        }
        config
    }

    pub fn with_push_url(mut self, url: impl Into<String>) -> Self {
        self.push_url = Some(url.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the reconnect backoff range
    pub fn with_reconnect_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay = initial;
        self.max_reconnect_delay = max.max(initial);
        self
    }

    pub fn with_optimistic_updates(mut self, enabled: bool) -> Self {
        self.optimistic_updates = enabled;
        self
    }

    /// Push URL, derived as `ws(s)://host/ws/orders` when not set
    pub fn resolved_push_url(&self) -> String {
        if let Some(url) = &self.push_url {
            return url.clone();
        }
        let base = self.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws_base}/ws/orders")
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
