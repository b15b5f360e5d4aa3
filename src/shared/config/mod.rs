//! Application configuration module
//!
//! Provides the configuration surface for the broadcaster strategy, the
//! durable log connection and the timing knobs of the background loops.
//!
//! # Configuration Sources
//!
//! - Environment variables (optionally loaded from a `.env` file)
//! - A TOML file (`AppConfig::from_toml_file`)
//! - `AppConfigBuilder` for programmatic construction (tests, embedding)
//!
//! Every source ends in `validate()`, so an `AppConfig` in hand is always
//! usable.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which broadcaster strategy the server runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcasterKind {
    /// Forward outbound straight to inbound, single process, no durability
    Loopback,
    /// Publish through the durable log and tail it back
    #[default]
    Durable,
}

impl FromStr for BroadcasterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "loopback" | "nopub" => Ok(Self::Loopback),
            "durable" | "redis" => Ok(Self::Durable),
            other => Err(ConfigError::InvalidValue {
                key: "BROADCASTER_TYPE",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for BroadcasterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loopback => f.write_str("loopback"),
            Self::Durable => f.write_str("durable"),
        }
    }
}

/// Connection parameters for the Redis-backed log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Full connection URL, takes precedence over the individual fields
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub db: u32,
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

impl RedisConfig {
    /// Connection URL in `redis://[:password@]host:port/db` form
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Broadcaster strategy
    pub broadcaster: BroadcasterKind,
    /// Durable log connection
    pub redis: RedisConfig,
    /// Maximum entries retained per topic
    pub retention_cap: usize,
    /// How long a tailing or group read may block (milliseconds)
    pub block_ms: u64,
    /// Fixed delay before a pump retries after a transport error (milliseconds)
    pub retry_delay_ms: u64,
    /// Reclaim loop period (seconds)
    pub reclaim_interval_secs: u64,
    /// Idle time after which a pending entry may be reclaimed (seconds)
    pub min_idle_secs: u64,
    /// Pending entries inspected per reclaim pass
    pub pending_count: usize,
    /// Capacity of each broadcaster queue
    pub queue_capacity: usize,
    /// Topics exposed as websocket endpoints
    pub topics: Vec<String>,
    /// HTTP listen port
    pub port: u16,
    /// Upper bound on the shutdown drain phase (seconds)
    pub drain_timeout_secs: u64,
    /// Appends slower than this are logged as warnings (milliseconds)
    pub slow_append_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            broadcaster: BroadcasterKind::Durable,
            redis: RedisConfig::default(),
            retention_cap: 1000,
            block_ms: 200,
            retry_delay_ms: 200,
            reclaim_interval_secs: 60,
            min_idle_secs: 60,
            pending_count: 10,
            queue_capacity: 1024,
            topics: vec!["test".to_string()],
            port: 3000,
            drain_timeout_secs: 5,
            slow_append_ms: 800,
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Load from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, starting from defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("BROADCASTER_TYPE") {
            config.broadcaster = v.parse()?;
        }
        config.redis.url = lookup("REDIS_URL").filter(|v| !v.is_empty());
        if let Some(v) = lookup("REDIS_HOST") {
            config.redis.host = v;
        }
        parse_into(&lookup, "REDIS_PORT", &mut config.redis.port)?;
        parse_into(&lookup, "REDIS_DB", &mut config.redis.db)?;
        config.redis.password = lookup("REDIS_PASSWORD").filter(|v| !v.is_empty());

        parse_into(&lookup, "STREAM_RETENTION_CAP", &mut config.retention_cap)?;
        parse_into(&lookup, "STREAM_BLOCK_MS", &mut config.block_ms)?;
        parse_into(&lookup, "STREAM_RETRY_DELAY_MS", &mut config.retry_delay_ms)?;
        parse_into(&lookup, "RECLAIM_INTERVAL_SECS", &mut config.reclaim_interval_secs)?;
        parse_into(&lookup, "RECLAIM_MIN_IDLE_SECS", &mut config.min_idle_secs)?;
        parse_into(&lookup, "PENDING_COUNT", &mut config.pending_count)?;
        parse_into(&lookup, "QUEUE_CAPACITY", &mut config.queue_capacity)?;
        parse_into(&lookup, "SERVER_PORT", &mut config.port)?;
        parse_into(&lookup, "DRAIN_TIMEOUT_SECS", &mut config.drain_timeout_secs)?;
        parse_into(&lookup, "SLOW_APPEND_MS", &mut config.slow_append_ms)?;

        if let Some(v) = lookup("WS_TOPICS") {
            config.topics = v
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file; missing keys fall back to defaults
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_cap == 0 {
            return Err(ConfigError::Invalid("retention_cap must be greater than zero".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be greater than zero".into()));
        }
        if self.pending_count == 0 {
            return Err(ConfigError::Invalid("pending_count must be greater than zero".into()));
        }
        if self.reclaim_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reclaim_interval_secs must be greater than zero".into(),
            ));
        }
        if self.topics.is_empty() {
            return Err(ConfigError::MissingValue("topics"));
        }
        if let Some(topic) = self.topics.iter().find(|t| t.contains('/')) {
            return Err(ConfigError::Invalid(format!(
                "topic '{}' must not contain '/'",
                topic
            )));
        }
        Ok(())
    }

    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    pub fn min_idle(&self) -> Duration {
        Duration::from_secs(self.min_idle_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn slow_append(&self) -> Duration {
        Duration::from_millis(self.slow_append_ms)
    }
}

fn parse_into<F, T>(lookup: &F, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
        })?;
    }
    Ok(())
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    pub fn broadcaster(mut self, kind: BroadcasterKind) -> Self {
        self.config.broadcaster = kind;
        self
    }

    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.config.redis.url = Some(url.into());
        self
    }

    pub fn retention_cap(mut self, cap: usize) -> Self {
        self.config.retention_cap = cap;
        self
    }

    pub fn block(mut self, block: Duration) -> Self {
        self.config.block_ms = block.as_millis() as u64;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn reclaim(mut self, interval: Duration, min_idle: Duration) -> Self {
        self.config.reclaim_interval_secs = interval.as_secs();
        self.config.min_idle_secs = min_idle.as_secs();
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.drain_timeout_secs = timeout.as_secs();
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read config file {0}")]
    Io(String),
    #[error("failed to parse config file: {0}")]
    Parse(String),
}
