//! HTTP client for the downstream webhook.
//!
//! One POST per event, bounded by a timeout, no internal retries. Every
//! attempt is classified into exactly one [`DeliveryOutcome`].

use std::{
    fmt,
    time::{Duration, Instant},
};

use bytes::Bytes;
use clockrelay_core::AttendanceEvent;
use reqwest::{
    header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER},
    Url,
};
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::{
    error::{DeliveryError, Result},
    payload::WebhookPayload,
};

/// Configuration for the delivery client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Downstream webhook URL.
    pub url: String,
    /// Bound on the whole request, body included.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
    /// Idle keep-alive connections kept to the downstream host.
    pub max_idle_connections: usize,
    /// How long an idle connection is kept.
    pub pool_idle_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "https://localhost/attendanceWebhook".to_string(),
            timeout: Duration::from_secs(10),
            user_agent: concat!("clockrelay/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 3,
            max_idle_connections: 4,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

impl ClientConfig {
    /// Default settings pointed at `url`.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Self::default() }
    }
}

/// Classified result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Downstream answered 2xx.
    Delivered {
        /// HTTP status code
        status_code: u16,
        /// Response body
        body: Bytes,
    },
    /// No HTTP response was obtained.
    Unreachable {
        /// Why the downstream could not be reached
        error: DeliveryError,
    },
    /// Downstream answered with a non-2xx status.
    Rejected {
        /// HTTP status code
        status_code: u16,
        /// Response body, verbatim
        body: Bytes,
        /// Response content type, if any
        content_type: Option<String>,
        /// Delay requested through `Retry-After`
        retry_after: Option<Duration>,
    },
}

impl DeliveryOutcome {
    /// Whether the downstream accepted the event.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Whether another attempt could succeed.
    ///
    /// True for transient transport failures, 5xx and 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Delivered { .. } => false,
            Self::Unreachable { error } => error.is_retryable(),
            Self::Rejected { status_code, .. } => *status_code >= 500 || *status_code == 429,
        }
    }

    /// Delay the downstream asked for before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Rejected { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status, when a response was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Delivered { status_code, .. } | Self::Rejected { status_code, .. } => {
                Some(*status_code)
            },
            Self::Unreachable { .. } => None,
        }
    }

    /// Short label for logs and summaries.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::Unreachable { .. } => "unreachable",
            Self::Rejected { .. } => "rejected",
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered { status_code, .. } => write!(f, "delivered (HTTP {status_code})"),
            Self::Unreachable { error } => write!(f, "unreachable: {error}"),
            Self::Rejected { status_code, .. } => write!(f, "rejected (HTTP {status_code})"),
        }
    }
}

/// Seam between the relay and the downstream transport.
///
/// Implementations never retry; retry policy belongs to the caller.
#[async_trait::async_trait]
pub trait Deliver: Send + Sync + fmt::Debug {
    /// Posts a prepared payload.
    async fn deliver_payload(&self, payload: &WebhookPayload) -> DeliveryOutcome;

    /// Posts an event in the downstream contract shape.
    async fn deliver(&self, event: &AttendanceEvent) -> DeliveryOutcome {
        self.deliver_payload(&WebhookPayload::from(event)).await
    }
}

/// HTTP client bound to one downstream webhook.
///
/// Reuses keep-alive connections to the downstream host, capped by
/// [`ClientConfig::max_idle_connections`].
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    url: Url,
    config: ClientConfig,
}

impl DeliveryClient {
    /// Creates a client for `config.url`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the URL is not an
    /// absolute http(s) URL or the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| DeliveryError::configuration(format!("invalid downstream URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DeliveryError::configuration(format!(
                "unsupported downstream scheme: {}",
                url.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .pool_max_idle_per_host(config.max_idle_connections)
            .pool_idle_timeout(config.pool_idle_timeout)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, url, config })
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Host part of the downstream URL.
    pub fn downstream_host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    fn classify_transport_error(&self, error: &reqwest::Error) -> DeliveryError {
        if error.is_timeout() {
            return DeliveryError::timeout(
                u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX),
            );
        }
        if error.is_connect() {
            return DeliveryError::network(format!("connection failed: {error}"));
        }
        DeliveryError::network(error.to_string())
    }
}

#[async_trait::async_trait]
impl Deliver for DeliveryClient {
    async fn deliver_payload(&self, payload: &WebhookPayload) -> DeliveryOutcome {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                return DeliveryOutcome::Unreachable {
                    error: DeliveryError::serialization(e.to_string()),
                };
            },
        };

        let span = info_span!(
            "webhook_delivery",
            device_id = %payload.device_id,
            employee_id = %payload.employee_id,
            direction = %payload.attendance_status,
            host = self.downstream_host(),
        );

        async move {
            let start_time = Instant::now();
            tracing::debug!("Forwarding event downstream");

            let response = match self
                .client
                .post(self.url.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let error = self.classify_transport_error(&e);
                    tracing::warn!(
                        duration_ms = start_time.elapsed().as_millis(),
                        error = %error,
                        "Downstream request failed"
                    );
                    return DeliveryOutcome::Unreachable { error };
                },
            };

            let status_code = response.status().as_u16();
            let is_success = response.status().is_success();
            let content_type = header_string(response.headers(), CONTENT_TYPE.as_str());
            let retry_after = parse_retry_after(response.headers());

            let body = match response.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    let error = self.classify_transport_error(&e);
                    tracing::warn!(
                        status = status_code,
                        error = %error,
                        "Failed to read response body"
                    );
                    return DeliveryOutcome::Unreachable { error };
                },
            };

            tracing::debug!(
                status = status_code,
                body_size = body.len(),
                duration_ms = start_time.elapsed().as_millis(),
                "Received downstream response"
            );

            if is_success {
                DeliveryOutcome::Delivered { status_code, body }
            } else {
                DeliveryOutcome::Rejected { status_code, body, content_type, retry_after }
            }
        }
        .instrument(span)
        .await
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Reads `Retry-After` in either delta-seconds or HTTP-date form.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = header_string(headers, RETRY_AFTER.as_str())?;
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delay = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delay.to_std().unwrap_or_default())
}
