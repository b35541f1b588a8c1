//! Configuration for the attendance relay.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use clockrelay_core::{EventSource, NormalizerConfig};
use clockrelay_delivery::{
    BackoffStrategy, ClientConfig, RetryPolicy, DEFAULT_REPLAY_TIMEOUT_SECONDS,
    DEFAULT_TIMEOUT_SECONDS,
};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "clockrelay.toml";
const ENV_PREFIX: &str = "CLOCKRELAY_";

/// Paths the relay serves itself; the device webhook cannot take them.
const RESERVED_PATHS: &[&str] = &["/", "/health", "/heartbeat"];

/// Extra time the inbound request is given on top of the outbound timeout,
/// so a slow downstream surfaces as 502 rather than a server-side timeout.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Process-wide relay configuration.
///
/// Loaded once at startup in priority order:
/// 1. Environment variables prefixed with `CLOCKRELAY_` (e.g.
///    `CLOCKRELAY_DOWNSTREAM_URL`)
/// 2. Configuration file (`clockrelay.toml`, optional)
/// 3. Built-in defaults
///
/// # Example
///
/// ```no_run
/// use clockrelay_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Relay will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Inbound device webhook path.
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    /// Largest accepted inbound body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    // Events
    /// Device id used when neither payload nor path name one.
    #[serde(default = "default_device_id")]
    pub default_device_id: String,
    /// Include the original device body as `rawData` downstream.
    #[serde(default)]
    pub forward_raw_payload: bool,

    // Downstream
    /// Downstream webhook URL.
    #[serde(default = "default_downstream_url")]
    pub downstream_url: String,
    /// Outbound timeout for device callbacks, in seconds.
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_seconds: u64,
    /// Outbound timeout for batch replays, in seconds.
    #[serde(default = "default_replay_timeout")]
    pub replay_timeout_seconds: u64,
    /// Idle keep-alive connections kept to the downstream host.
    #[serde(default = "default_max_idle_connections")]
    pub max_idle_connections: usize,
    /// Idle connection lifetime, in seconds.
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_seconds: u64,

    // Replay retry
    /// Attempts per event during a batch replay.
    #[serde(default = "default_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Base delay for exponential backoff in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Jitter factor for retry timing (0.0 to 1.0).
    #[serde(default = "default_jitter_factor")]
    pub retry_jitter_factor: f64,

    // Logging
    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

impl Config {
    /// Loads configuration from defaults, `clockrelay.toml` and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Fails when a source cannot be parsed or the result does not validate.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Like [`Config::load`] with an explicit configuration file.
    ///
    /// A missing file is not an error; figment skips it.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.into()))
            .merge(Env::prefixed(ENV_PREFIX));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Delivery client settings for device callbacks.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            url: self.downstream_url.clone(),
            timeout: Duration::from_secs(self.delivery_timeout_seconds),
            max_idle_connections: self.max_idle_connections,
            pool_idle_timeout: Duration::from_secs(self.pool_idle_timeout_seconds),
            ..ClientConfig::default()
        }
    }

    /// Delivery client settings for batch replays.
    pub fn to_replay_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.replay_timeout_seconds),
            ..self.to_client_config()
        }
    }

    /// Retry policy for batch replays.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter_factor: self.retry_jitter_factor,
            backoff_strategy: BackoffStrategy::Exponential,
        }
    }

    /// Normalizer defaults for events pushed by devices.
    pub fn to_normalizer_config(&self) -> NormalizerConfig {
        NormalizerConfig {
            default_device_id: self.default_device_id.clone(),
            default_source: EventSource::Webhook,
        }
    }

    /// Bound on a whole inbound request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_seconds) + REQUEST_TIMEOUT_MARGIN
    }

    /// Parse server socket address from host and port configuration.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Host of the downstream URL, safe to log.
    pub fn downstream_host(&self) -> String {
        Url::parse(&self.downstream_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if !self.webhook_path.starts_with('/') {
            anyhow::bail!("webhook_path must start with '/'");
        }

        if RESERVED_PATHS.contains(&self.webhook_path.trim_end_matches('/').max("/")) {
            anyhow::bail!("webhook_path '{}' is reserved", self.webhook_path);
        }

        // Segments the router would read as captures or wildcards.
        if self.webhook_path.split('/').any(|segment| {
            segment.starts_with([':', '*']) || segment.contains(['{', '}'])
        }) {
            anyhow::bail!("webhook_path '{}' must be a literal path", self.webhook_path);
        }

        let url = Url::parse(&self.downstream_url).context("downstream_url is not a valid URL")?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("downstream_url must use http or https");
        }

        if self.default_device_id.trim().is_empty() {
            anyhow::bail!("default_device_id must not be empty");
        }

        if self.delivery_timeout_seconds == 0 || self.replay_timeout_seconds == 0 {
            anyhow::bail!("delivery timeouts must be greater than 0");
        }

        if self.max_body_bytes == 0 {
            anyhow::bail!("max_body_bytes must be greater than 0");
        }

        if self.max_retry_attempts == 0 {
            anyhow::bail!("max_retry_attempts must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            anyhow::bail!("retry_jitter_factor must be between 0.0 and 1.0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            webhook_path: default_webhook_path(),
            max_body_bytes: default_max_body_bytes(),
            default_device_id: default_device_id(),
            forward_raw_payload: false,
            downstream_url: default_downstream_url(),
            delivery_timeout_seconds: default_delivery_timeout(),
            replay_timeout_seconds: default_replay_timeout(),
            max_idle_connections: default_max_idle_connections(),
            pool_idle_timeout_seconds: default_pool_idle_timeout(),
            max_retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_base_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            retry_jitter_factor: default_jitter_factor(),
            rust_log: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7660
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_device_id() -> String {
    "admin".to_string()
}

fn default_downstream_url() -> String {
    "https://localhost/attendanceWebhook".to_string()
}

fn default_delivery_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_replay_timeout() -> u64 {
    DEFAULT_REPLAY_TIMEOUT_SECONDS
}

fn default_max_idle_connections() -> usize {
    4
}

fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_factor() -> f64 {
    0.1
}

fn default_log_level() -> String {
    "info".to_string()
}
