//! Test infrastructure for the attendance relay.
//!
//! Provides a mock downstream webhook, device payload builders, and
//! [`TestRelay`], the full router driven in-process with a deterministic
//! clock.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, HeaderMap, Method, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use clockrelay_api::{create_router, AppState, Config};
use clockrelay_core::TestClock;
use clockrelay_delivery::{Deliver, DeliveryClient};
use tower::ServiceExt;

pub mod fixtures;
pub mod http;

pub use fixtures::{AlertBuilder, SAMPLE_CHECKOUT_XML};
pub use http::{refused_url, MockDownstream, MockResponse};

/// Wall-clock time a [`TestRelay`] starts at: 2026-02-26T10:00:00Z.
pub fn relay_start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 26, 10, 0, 0).single().unwrap_or_default()
}

/// The relay router wired to a mock downstream.
pub struct TestRelay {
    /// Downstream webhook double
    pub downstream: MockDownstream,
    /// Deterministic clock shared with the router
    pub clock: TestClock,
    /// Configuration the router was built from
    pub config: Config,
    router: Router,
}

impl TestRelay {
    /// Starts a relay with default configuration.
    ///
    /// # Panics
    ///
    /// Panics when the delivery client cannot be built.
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Starts a relay after letting `configure` adjust the configuration.
    ///
    /// The downstream URL always points at the mock unless `configure`
    /// overrides it.
    ///
    /// # Panics
    ///
    /// Panics when the delivery client cannot be built.
    pub async fn start_with(configure: impl FnOnce(&mut Config)) -> Self {
        let downstream = MockDownstream::start().await;
        let mut config = Config { downstream_url: downstream.url(), ..Config::default() };
        configure(&mut config);

        let client = DeliveryClient::new(config.to_client_config())
            .unwrap_or_else(|e| panic!("delivery client: {e}"));

        Self::with_sink(downstream, config, Arc::new(client))
    }

    /// Builds a relay around an arbitrary sink.
    pub fn with_sink(downstream: MockDownstream, config: Config, sink: Arc<dyn Deliver>) -> Self {
        let clock = TestClock::with_start_time(relay_start_time());
        let state = AppState::with_delivery(&config, sink, Arc::new(clock.clone()));
        Self { downstream, clock, config, router: create_router(state) }
    }

    /// Posts `body` to `path` with the given content type.
    pub async fn post(
        &self,
        path: &str,
        content_type: Option<&str>,
        body: impl Into<Bytes>,
    ) -> TestResponse {
        let mut request = Request::builder().method(Method::POST).uri(path);
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        self.send(request.body(Body::from(body.into()))).await
    }

    /// Posts to the configured webhook path.
    pub async fn post_event(&self, content_type: &str, body: impl Into<Bytes>) -> TestResponse {
        let path = self.config.webhook_path.clone();
        self.post(&path, Some(content_type), body).await
    }

    /// Sends a bodiless request.
    pub async fn request(&self, method: Method, path: &str) -> TestResponse {
        self.send(Request::builder().method(method).uri(path).body(Body::empty())).await
    }

    /// Sends a `GET`.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path).await
    }

    async fn send(&self, request: axum::http::Result<Request<Body>>) -> TestResponse {
        let request = request.unwrap_or_else(|e| panic!("invalid test request: {e}"));
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .unwrap_or_else(|e| match e {});

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_else(|e| panic!("response body: {e}"));

        TestResponse { status, headers, body }
    }
}

/// A fully buffered router response.
#[derive(Debug, Clone)]
pub struct TestResponse {
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl TestResponse {
    /// Body parsed as JSON.
    ///
    /// # Panics
    ///
    /// Panics when the body is not JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|e| panic!("response is not JSON ({e}): {}", self.text()))
    }

    /// Body as lossy UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// A header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}
