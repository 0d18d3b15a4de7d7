//! Transport Configuration
//!
//! Endpoint, timeouts, reconnect policy and outbound buffering for a
//! [`Connection`](super::Connection).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::outbound::{OverflowPolicy, DEFAULT_OUTBOUND_CAPACITY};

/// Default server endpoint; the identity token is appended as `?token=`
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws/chat";

/// When and how often to retry after a link closes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay before the first retry in milliseconds
    pub delay_ms: u64,

    /// Upper bound for the delay when backing off
    pub max_delay_ms: u64,

    /// Multiplier applied per consecutive failure (1 = fixed delay)
    pub backoff_factor: u32,

    /// Consecutive failed attempts before giving up (`None` = never)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay_ms: 2000,
            max_delay_ms: 30_000,
            backoff_factor: 2,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based), or `None` once exhausted
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt >= max) {
            return None;
        }

        if self.backoff_factor <= 1 {
            return Some(Duration::from_millis(self.delay_ms));
        }

        let factor = u64::from(self.backoff_factor).saturating_pow(attempt.min(16));
        let ceiling = self.max_delay_ms.max(self.delay_ms);
        Some(Duration::from_millis(
            self.delay_ms.saturating_mul(factor).min(ceiling),
        ))
    }
}

/// Transport configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// WebSocket endpoint without the token parameter
    pub endpoint: String,

    /// Connection timeout in milliseconds
    ///
    /// A connect attempt that exceeds this counts as a failed attempt.
    pub connect_timeout_ms: u64,

    /// Longest a single frame write may take, in milliseconds
    ///
    /// A write that stalls past this (peer not reading) counts as a lost link.
    pub write_timeout_ms: u64,

    /// Retry behaviour after a close
    pub reconnect: ReconnectPolicy,

    /// Requests held while no link is open
    pub outbound_capacity: usize,

    /// What to drop when the outbound buffer is full
    pub overflow_policy: OverflowPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout_ms: 5000,
            write_timeout_ms: 10_000,
            reconnect: ReconnectPolicy::default(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl TransportConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `CHAT_ENDPOINT`: WebSocket endpoint
    /// - `CHAT_CONNECT_TIMEOUT`: Connection timeout in ms
    /// - `CHAT_WRITE_TIMEOUT`: Frame write timeout in ms
    /// - `CHAT_RECONNECT_DELAY`: Delay before reconnecting in ms
    /// - `CHAT_RECONNECT_MAX_DELAY`: Backoff ceiling in ms
    /// - `CHAT_RECONNECT_BACKOFF`: Backoff multiplier
    /// - `CHAT_RECONNECT_ATTEMPTS`: Attempts before giving up (0 = unlimited)
    /// - `CHAT_OUTBOUND_CAPACITY`: Outbound buffer size
    /// - `CHAT_OVERFLOW_POLICY`: "drop_newest" or "drop_oldest"
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay any `CHAT_*` variables that are set; returns whether any applied
    pub fn apply_env(&mut self) -> bool {
        let mut applied = false;

        if let Ok(endpoint) = std::env::var("CHAT_ENDPOINT") {
            self.endpoint = endpoint;
            applied = true;
        }
        if let Some(ms) = env_parse("CHAT_CONNECT_TIMEOUT") {
            self.connect_timeout_ms = ms;
            applied = true;
        }
        if let Some(ms) = env_parse("CHAT_WRITE_TIMEOUT") {
            self.write_timeout_ms = ms;
            applied = true;
        }
        if let Some(ms) = env_parse("CHAT_RECONNECT_DELAY") {
            self.reconnect.delay_ms = ms;
            applied = true;
        }
        if let Some(ms) = env_parse("CHAT_RECONNECT_MAX_DELAY") {
            self.reconnect.max_delay_ms = ms;
            applied = true;
        }
        if let Some(factor) = env_parse("CHAT_RECONNECT_BACKOFF") {
            self.reconnect.backoff_factor = factor;
            applied = true;
        }
        if let Some(attempts) = env_parse::<u32>("CHAT_RECONNECT_ATTEMPTS") {
            self.reconnect.max_attempts = (attempts > 0).then_some(attempts);
            applied = true;
        }
        if let Some(capacity) = env_parse("CHAT_OUTBOUND_CAPACITY") {
            self.outbound_capacity = capacity;
            applied = true;
        }
        if let Some(policy) = env_parse("CHAT_OVERFLOW_POLICY") {
            self.overflow_policy = policy;
            applied = true;
        }

        applied
    }

    /// Connect timeout as a `Duration`
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Write timeout as a `Duration`
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Parse `key` from the environment; unparseable values are logged and ignored
pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %value, "Ignoring unparseable environment value");
            None
        }
    }
}
