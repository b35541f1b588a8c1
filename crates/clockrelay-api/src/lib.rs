//! ClockRelay HTTP API.
//!
//! Receives attendance events pushed by biometric terminals, normalizes them
//! and forwards each one to the downstream webhook before answering the
//! device. The response the device sees mirrors what the downstream did, so
//! terminals keep their own retry-on-failure behavior.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use clockrelay_core::{Clock, Normalizer};
use clockrelay_delivery::{Deliver, DeliveryClient};

pub mod config;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use server::{create_router, start_server};

/// Request-independent settings read by handlers.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Listen port, reported by the liveness text.
    pub port: u16,
    /// Device webhook path.
    pub webhook_path: String,
    /// Attach the original body as `rawData`.
    pub forward_raw_payload: bool,
    /// Largest accepted inbound body.
    pub max_body_bytes: usize,
    /// Bound on a whole inbound request.
    pub request_timeout: Duration,
    /// Host of the downstream webhook, never the full URL.
    pub downstream_host: String,
    /// When the relay started, on the state's clock.
    pub started_at: Instant,
}

impl RelaySettings {
    /// Derives handler settings from configuration.
    pub fn from_config(config: &Config, started_at: Instant) -> Self {
        Self {
            port: config.port,
            webhook_path: config.webhook_path.clone(),
            forward_raw_payload: config.forward_raw_payload,
            max_body_bytes: config.max_body_bytes,
            request_timeout: config.request_timeout(),
            downstream_host: config.downstream_host(),
            started_at,
        }
    }
}

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Payload normalizer.
    pub normalizer: Arc<Normalizer>,
    /// Downstream sink.
    pub delivery: Arc<dyn Deliver>,
    /// Time source for receipt times and uptime.
    pub clock: Arc<dyn Clock>,
    /// Static relay settings.
    pub settings: Arc<RelaySettings>,
}

impl AppState {
    /// Assembles state from its parts.
    pub fn new(
        normalizer: Normalizer,
        delivery: Arc<dyn Deliver>,
        clock: Arc<dyn Clock>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            normalizer: Arc::new(normalizer),
            delivery,
            clock,
            settings: Arc::new(settings),
        }
    }

    /// Builds production state: a real delivery client against the
    /// configured downstream.
    ///
    /// # Errors
    ///
    /// Fails when the delivery client cannot be built from the configuration.
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let client = DeliveryClient::new(config.to_client_config())?;
        Ok(Self::with_delivery(config, Arc::new(client), clock))
    }

    /// Builds state around an existing sink.
    pub fn with_delivery(
        config: &Config,
        delivery: Arc<dyn Deliver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let normalizer = Normalizer::new(config.to_normalizer_config(), Arc::clone(&clock));
        let settings = RelaySettings::from_config(config, clock.now());
        Self::new(normalizer, delivery, clock, settings)
    }
}
