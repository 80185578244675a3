use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{info, warn};

use crate::clock::Sleeper;
use crate::transport::{MessageTransport, OutboundMessage, SendError, UserId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per recipient for transient failures, first try included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 500, max_delay_ms: 10_000 }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        exponential_backoff(self.base_delay_ms, self.max_delay_ms, attempt)
    }
}

/// `base_ms * 2^attempt`, capped at `max_ms`. Attempt zero is the first retry.
pub fn exponential_backoff(base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let multiplier = 1_u64 << attempt.min(16);
    Duration::from_millis(base_ms.saturating_mul(multiplier).min(max_ms))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryFailure {
    RetriesExhausted { attempts: u32, last_error: String },
    Rejected(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<UserId>,
    pub failed: Vec<(UserId, DeliveryFailure)>,
}

impl DeliveryReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fans a message out to every recipient. Each recipient is retried on its
/// own; one unreachable admin never holds up or fails the others.
#[derive(Clone)]
pub struct DeliveryRelay {
    transport: Arc<dyn MessageTransport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl DeliveryRelay {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
    ) -> Self {
        Self { transport, sleeper, policy }
    }

    pub async fn deliver(
        &self,
        message: &OutboundMessage,
        recipients: &[UserId],
    ) -> DeliveryReport {
        let attempts = recipients.iter().map(|recipient| self.deliver_one(*recipient, message));
        let results = join_all(attempts).await;

        let mut report = DeliveryReport::default();
        for (recipient, result) in recipients.iter().copied().zip(results) {
            match result {
                Ok(()) => report.delivered.push(recipient),
                Err(failure) => report.failed.push((recipient, failure)),
            }
        }

        info!(
            event_name = "relay.delivery_finished",
            recipients = recipients.len(),
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "order relay finished"
        );
        report
    }

    async fn deliver_one(
        &self,
        recipient: UserId,
        message: &OutboundMessage,
    ) -> Result<(), DeliveryFailure> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0_u32;

        loop {
            match self.transport.send(recipient, message).await {
                Ok(()) => return Ok(()),
                Err(SendError::RateLimited { retry_after }) => {
                    warn!(
                        event_name = "relay.rate_limited",
                        recipient = %recipient,
                        retry_after_ms = retry_after.as_millis() as u64,
                        "transport asked to back off; waiting before retrying"
                    );
                    self.sleeper.sleep(retry_after).await;
                }
                Err(SendError::Transient(error)) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        warn!(
                            event_name = "relay.retries_exhausted",
                            recipient = %recipient,
                            attempts = attempt,
                            error = %error,
                            "giving up on recipient after transient failures"
                        );
                        return Err(DeliveryFailure::RetriesExhausted {
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    let delay = self.policy.backoff(attempt - 1);
                    warn!(
                        event_name = "relay.transient_failure",
                        recipient = %recipient,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient delivery failure; retrying"
                    );
                    self.sleeper.sleep(delay).await;
                }
                Err(SendError::Permanent(error)) => {
                    warn!(
                        event_name = "relay.permanent_failure",
                        recipient = %recipient,
                        error = %error,
                        "delivery rejected; skipping recipient"
                    );
                    return Err(DeliveryFailure::Rejected(error));
                }
            }
        }
    }
}
