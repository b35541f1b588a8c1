//! Mock downstream webhook for delivery and relay tests.

use std::{net::TcpListener, time::Duration};

use bytes::Bytes;
use clockrelay_delivery::WebhookPayload;
use serde_json::Value;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, Request, ResponseTemplate,
};

/// Path the mock downstream listens on.
pub const DOWNSTREAM_PATH: &str = "/attendanceWebhook";

/// Canned downstream answers.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// JSON body with the given status.
    Json {
        /// HTTP status
        status: u16,
        /// Response body
        body: Value,
    },
    /// Arbitrary body and content type.
    Raw {
        /// HTTP status
        status: u16,
        /// Response body
        body: Bytes,
        /// Content type header, if any
        content_type: Option<String>,
    },
    /// Status with a `Retry-After` header in seconds.
    RetryAfter {
        /// HTTP status
        status: u16,
        /// Requested delay
        seconds: u64,
    },
    /// `{"success":true}` after a delay.
    Delayed {
        /// How long the downstream stalls
        delay: Duration,
    },
}

impl MockResponse {
    /// `200 {"success":true}`.
    pub fn success() -> Self {
        Self::Json { status: 200, body: serde_json::json!({ "success": true }) }
    }

    /// Status code with an empty body.
    pub fn status(status: u16) -> Self {
        Self::Raw { status, body: Bytes::new(), content_type: None }
    }

    fn template(self) -> ResponseTemplate {
        match self {
            Self::Json { status, body } => ResponseTemplate::new(status).set_body_json(body),
            Self::Raw { status, body, content_type } => {
                let template = ResponseTemplate::new(status);
                match content_type {
                    Some(content_type) => template.set_body_raw(body.to_vec(), &content_type),
                    None => template.set_body_bytes(body.to_vec()),
                }
            },
            Self::RetryAfter { status, seconds } => {
                ResponseTemplate::new(status).insert_header("Retry-After", seconds.to_string())
            },
            Self::Delayed { delay } => ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "success": true }))
                .set_delay(delay),
        }
    }
}

/// Wiremock server standing in for the downstream webhook.
pub struct MockDownstream {
    server: MockServer,
}

impl MockDownstream {
    /// Starts a new mock server on a random port.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Full URL of the webhook endpoint.
    pub fn url(&self) -> String {
        format!("{}{DOWNSTREAM_PATH}", self.server.uri())
    }

    /// Answers every delivery with `response`.
    pub async fn respond_with(&self, response: MockResponse) {
        Mock::given(method("POST"))
            .and(path(DOWNSTREAM_PATH))
            .respond_with(response.template())
            .mount(&self.server)
            .await;
    }

    /// Answers deliveries with `responses` in order, then with the last one
    /// forever.
    pub async fn respond_in_sequence(&self, responses: Vec<MockResponse>) {
        let Some((last, first)) = responses.split_last() else {
            return;
        };

        for response in first {
            Mock::given(method("POST"))
                .and(path(DOWNSTREAM_PATH))
                .respond_with(response.clone().template())
                .up_to_n_times(1)
                .mount(&self.server)
                .await;
        }
        self.respond_with(last.clone()).await;
    }

    /// Every request the downstream received, in arrival order.
    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Bodies of all deliveries, decoded as the webhook contract.
    ///
    /// # Panics
    ///
    /// Panics when a body does not match the contract.
    pub async fn received_payloads(&self) -> Vec<WebhookPayload> {
        self.received_requests()
            .await
            .iter()
            .map(|request| {
                serde_json::from_slice(&request.body).unwrap_or_else(|e| {
                    panic!("downstream received a non-contract body ({e}): {:?}", request.body)
                })
            })
            .collect()
    }

    /// Number of deliveries received.
    pub async fn request_count(&self) -> usize {
        self.received_requests().await.len()
    }

    /// Asserts that exactly n deliveries were received.
    pub async fn assert_request_count(&self, expected: usize) {
        let actual = self.request_count().await;
        assert_eq!(actual, expected, "Expected {expected} deliveries, received {actual}");
    }
}

/// URL of a local port nothing listens on.
///
/// # Panics
///
/// Panics when no local port can be reserved.
pub fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("reserve local port");
    let port = listener.local_addr().expect("local address").port();
    drop(listener);
    format!("http://127.0.0.1:{port}{DOWNSTREAM_PATH}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_downstream_starts() {
        let downstream = MockDownstream::start().await;
        assert!(downstream.url().starts_with("http://"));
        assert!(downstream.url().ends_with(DOWNSTREAM_PATH));
        downstream.assert_request_count(0).await;
    }

    #[test]
    fn refused_url_points_at_loopback() {
        assert!(refused_url().starts_with("http://127.0.0.1:"));
    }
}
