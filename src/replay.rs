//! Batch replay of stored device payloads.
//!
//! Input is a JSON array whose entries have the inbound device JSON shape.
//! Nobody retries on our behalf here, so each event goes through a
//! [`BatchForwarder`] with the configured backoff. Entries that cannot be
//! normalized are reported and skipped; the rest still go out.
//!
//! With `forward_raw_payload` on, each entry's JSON text goes along as
//! `rawData`, the same as for live device pushes.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use clockrelay_api::Config;
use clockrelay_core::{Clock, EventSource, Normalizer, RealClock};
use clockrelay_delivery::{BatchForwarder, BatchSummary, DeliveryClient, WebhookPayload};
use serde_json::Value;
use tracing::{info, warn};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Replays `file` against the configured downstream.
///
/// Fails when the file cannot be read or any entry was not delivered.
pub async fn run(config: &Config, file: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let entries = parse_entries(&content)?;

    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());
    let client = DeliveryClient::new(config.to_replay_client_config())
        .context("Failed to build delivery client")?;
    let forwarder =
        BatchForwarder::new(Arc::new(client), config.to_retry_policy(), Arc::clone(&clock));
    let normalizer = replay_normalizer(config, clock);

    info!(
        file = %file.display(),
        entries = entries.len(),
        downstream_host = %config.downstream_host(),
        max_attempts = forwarder.policy().max_attempts,
        "Starting replay"
    );

    let summary =
        replay_entries(&entries, &normalizer, &forwarder, config.forward_raw_payload).await;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !summary.is_success() {
        anyhow::bail!("{} of {} events were not delivered", summary.failed.len(), summary.total);
    }

    info!(delivered = summary.delivered, "Replay complete");
    Ok(())
}

/// Normalizer whose events are tagged as relayed unless they say otherwise.
fn replay_normalizer(config: &Config, clock: Arc<dyn Clock>) -> Normalizer {
    let mut normalizer_config = config.to_normalizer_config();
    normalizer_config.default_source = EventSource::Relay;
    Normalizer::new(normalizer_config, clock)
}

fn parse_entries(content: &str) -> Result<Vec<Value>> {
    serde_json::from_str(content).context("Replay file must hold a JSON array of device payloads")
}

/// Normalizes and forwards entries in file order.
async fn replay_entries(
    entries: &[Value],
    normalizer: &Normalizer,
    forwarder: &BatchForwarder,
    forward_raw_payload: bool,
) -> BatchSummary {
    let mut summary = BatchSummary::default();

    for (index, entry) in entries.iter().enumerate() {
        let body = entry.to_string();
        match normalizer.normalize(body.as_bytes(), Some(JSON_CONTENT_TYPE)) {
            Ok(event) => {
                let mut payload = WebhookPayload::from(&event);
                if forward_raw_payload {
                    payload = payload.with_raw_data(body.as_bytes());
                }
                let report = forwarder.forward_payload(&payload).await;
                summary.record(index, &event, &report);
            },
            Err(e) => {
                warn!(index, reason = e.reason(), error = %e, "Skipping replay entry");
                summary.record_skipped(index, e.to_string());
            },
        }
    }

    summary
}
