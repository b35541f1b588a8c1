//! Per-event forwarding with retries for batch replays.
//!
//! Each event gets its own retry loop. A failure is recorded and the batch
//! moves on, so one bad event never blocks the rest.

use std::{sync::Arc, time::Duration};

use clockrelay_core::{AttendanceEvent, Clock};
use serde::Serialize;
use tracing::{info_span, Instrument};

use crate::{
    client::{Deliver, DeliveryOutcome},
    payload::WebhookPayload,
    retry::{RetryDecision, RetryPolicy},
};

/// Final result of forwarding one event.
#[derive(Debug, Clone)]
pub struct ForwardReport {
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Outcome of the last attempt.
    pub outcome: DeliveryOutcome,
    /// Total time spent waiting between attempts.
    pub waited: Duration,
}

/// An entry of a batch that was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEvent {
    /// Position of the entry in the batch.
    pub index: usize,
    /// Employee of the event, when it could be normalized.
    pub employee_id: Option<String>,
    /// Attempts made; zero when the entry never reached delivery.
    pub attempts: u32,
    /// Human-readable failure.
    pub reason: String,
}

/// Tally of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Entries processed.
    pub total: usize,
    /// Entries the downstream accepted.
    pub delivered: usize,
    /// Entries that were not delivered.
    pub failed: Vec<FailedEvent>,
}

impl BatchSummary {
    /// Records the report of a forwarded event.
    pub fn record(&mut self, index: usize, event: &AttendanceEvent, report: &ForwardReport) {
        self.total += 1;
        if report.outcome.is_delivered() {
            self.delivered += 1;
        } else {
            self.failed.push(FailedEvent {
                index,
                employee_id: Some(event.employee_id().to_string()),
                attempts: report.attempts,
                reason: report.outcome.to_string(),
            });
        }
    }

    /// Records an entry that failed before delivery.
    pub fn record_skipped(&mut self, index: usize, reason: impl Into<String>) {
        self.total += 1;
        self.failed.push(FailedEvent {
            index,
            employee_id: None,
            attempts: 0,
            reason: reason.into(),
        });
    }

    /// True when every entry was delivered.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Forwards events one at a time, retrying each per the policy.
#[derive(Debug, Clone)]
pub struct BatchForwarder {
    sink: Arc<dyn Deliver>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl BatchForwarder {
    /// Creates a forwarder.
    pub fn new(sink: Arc<dyn Deliver>, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { sink, policy, clock }
    }

    /// Returns the retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delivers one event, retrying retryable outcomes.
    pub async fn forward_one(&self, event: &AttendanceEvent) -> ForwardReport {
        self.forward_payload(&WebhookPayload::from(event)).await
    }

    /// Delivers a prepared payload, retrying retryable outcomes.
    ///
    /// The same payload is sent on every attempt.
    pub async fn forward_payload(&self, payload: &WebhookPayload) -> ForwardReport {
        let span = info_span!(
            "replay_event",
            employee_id = %payload.employee_id,
            device_id = %payload.device_id,
            timestamp = %payload.timestamp,
        );

        async move {
            let mut attempt = 1;
            let mut waited = Duration::ZERO;

            loop {
                let outcome = self.sink.deliver_payload(payload).await;

                if outcome.is_delivered() {
                    tracing::info!(attempt, "Replayed event delivered");
                    return ForwardReport { attempts: attempt, outcome, waited };
                }

                match self.policy.decide(attempt, &outcome) {
                    RetryDecision::Retry { delay } => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis(),
                            outcome = %outcome,
                            "Replay attempt failed, retrying"
                        );
                        self.clock.sleep(delay).await;
                        waited += delay;
                        attempt += 1;
                    },
                    RetryDecision::GiveUp { reason } => {
                        tracing::error!(
                            attempt,
                            outcome = %outcome,
                            reason = %reason,
                            payload = %serde_json::to_string(payload).unwrap_or_default(),
                            "Replay gave up on event"
                        );
                        return ForwardReport { attempts: attempt, outcome, waited };
                    },
                }
            }
        }
        .instrument(span)
        .await
    }
}
