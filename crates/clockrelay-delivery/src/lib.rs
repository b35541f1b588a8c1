//! Downstream delivery for normalized attendance events.
//!
//! This crate owns the outbound half of the relay: it turns an
//! [`clockrelay_core::AttendanceEvent`] into the downstream webhook's JSON
//! contract, posts it once with a bounded timeout, and classifies what
//! happened into a [`DeliveryOutcome`].
//!
//! # Retries
//!
//! [`DeliveryClient`] never retries. The device-facing relay relies on the
//! terminal's own retry-on-failure, so it surfaces the outcome immediately.
//! Contexts without a device behind them (batch replays) wrap the client in
//! a [`BatchForwarder`], which retries each event on its own with
//! exponential backoff and jitter.
//!
//! # Example
//!
//! ```no_run
//! use clockrelay_delivery::{ClientConfig, Deliver, DeliveryClient, DeliveryError};
//! # use clockrelay_core::AttendanceEvent;
//!
//! # async fn example(event: AttendanceEvent) -> std::result::Result<(), DeliveryError> {
//! let client = DeliveryClient::new(ClientConfig::for_url("https://example.com/attendanceWebhook"))?;
//!
//! let outcome = client.deliver(&event).await;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod client;
pub mod error;
pub mod payload;
pub mod retry;

pub use batch::{BatchForwarder, BatchSummary, FailedEvent, ForwardReport};
pub use client::{ClientConfig, Deliver, DeliveryClient, DeliveryOutcome};
pub use error::{DeliveryError, Result};
pub use payload::WebhookPayload;
pub use retry::{BackoffStrategy, RetryDecision, RetryPolicy};

/// Default outbound timeout for device callbacks, in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Default outbound timeout for batch replays, in seconds.
pub const DEFAULT_REPLAY_TIMEOUT_SECONDS: u64 = 60;
