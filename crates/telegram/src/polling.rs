use std::collections::HashMap;
use std::future::{self, Future};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::FutureExt;
use procurebot_core::messages;
use procurebot_core::relay::exponential_backoff;
use procurebot_core::{
    InboundEvent, MessageTransport, OrderDesk, OutboundMessage, SendError, Sleeper, UserId,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::Update;
use crate::client::BotApiClient;
use crate::events::{ClassifiedUpdate, UpdateClassifier};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_delay_ms: 500, max_delay_ms: 30_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        exponential_backoff(self.base_delay_ms, self.max_delay_ms, attempt)
    }
}

/// Where updates come from. `Ok(None)` means the source is closed for good.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn next_batch(&self, offset: Option<i64>) -> Result<Option<Vec<Update>>, SendError>;
    async fn answer_callback(&self, callback_id: &str) -> Result<(), SendError>;
}

#[async_trait]
impl UpdateSource for BotApiClient {
    async fn next_batch(&self, offset: Option<i64>) -> Result<Option<Vec<Update>>, SendError> {
        self.get_updates(offset).await.map(Some)
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), SendError> {
        self.answer_callback_query(callback_id).await
    }
}

pub struct PollingRunner {
    source: Arc<dyn UpdateSource>,
    replies: Arc<dyn MessageTransport>,
    desk: Arc<OrderDesk>,
    classifier: UpdateClassifier,
    reconnect_policy: ReconnectPolicy,
    sleeper: Arc<dyn Sleeper>,
    drain_timeout: Duration,
}

impl PollingRunner {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        replies: Arc<dyn MessageTransport>,
        desk: Arc<OrderDesk>,
        classifier: UpdateClassifier,
        reconnect_policy: ReconnectPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            source,
            replies,
            desk,
            classifier,
            reconnect_policy,
            sleeper,
            drain_timeout: Duration::from_secs(10),
        }
    }

    /// How long in-flight updates may keep running once polling stops.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub async fn run(&self) {
        self.run_until(future::pending::<()>()).await;
    }

    /// Polls until the source closes or `shutdown` resolves. Poll failures
    /// back off and retry forever; a failing update never stops the loop.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut offset = None;
        let mut consecutive_failures = 0_u32;
        // Last task per user; the next task for that user waits on it so one
        // user's updates are handled in arrival order.
        let mut lanes: HashMap<UserId, JoinHandle<()>> = HashMap::new();
        let mut unowned: Vec<JoinHandle<()>> = Vec::new();

        info!(event_name = "telegram.polling_started", "polling for telegram updates");
        loop {
            let polled = tokio::select! {
                _ = &mut shutdown => break,
                polled = self.source.next_batch(offset) => polled,
            };
            let batch = match polled {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(poll_error) => {
                    let delay = self.reconnect_policy.backoff(consecutive_failures);
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    warn!(
                        event_name = "telegram.poll_failed",
                        attempt = consecutive_failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %poll_error,
                        "polling failed; backing off"
                    );
                    self.sleeper.sleep(poll_delay(&poll_error, delay)).await;
                    continue;
                }
            };
            consecutive_failures = 0;

            lanes.retain(|_, task| !task.is_finished());
            unowned.retain(|task| !task.is_finished());
            for update in batch {
                offset = Some(update.update_id + 1);
                let Some(classified) = self.classifier.classify(&update) else {
                    debug!(
                        event_name = "telegram.update_skipped",
                        update_id = update.update_id,
                        "update carries nothing the desk handles"
                    );
                    continue;
                };
                let lane = classified.event.as_ref().map(|event| event.sender.id);
                let previous = lane.and_then(|user| lanes.remove(&user));
                let task = self.spawn_update(classified, previous);
                match lane {
                    Some(user) => {
                        lanes.insert(user, task);
                    }
                    None => unowned.push(task),
                }
            }
        }

        let in_flight = lanes.into_values().chain(unowned).collect::<Vec<_>>();
        let pending = in_flight.len();
        if tokio::time::timeout(self.drain_timeout, join_all(in_flight)).await.is_err() {
            warn!(
                event_name = "telegram.drain_timeout",
                pending,
                "in-flight updates did not finish before the drain timeout"
            );
        }
        info!(event_name = "telegram.polling_stopped", "polling stopped");
    }

    fn spawn_update(
        &self,
        classified: ClassifiedUpdate,
        previous: Option<JoinHandle<()>>,
    ) -> JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let replies = Arc::clone(&self.replies);
        let desk = Arc::clone(&self.desk);

        tokio::spawn(async move {
            if let Some(previous) = previous {
                if let Err(join_error) = previous.await {
                    warn!(
                        event_name = "telegram.previous_update_aborted",
                        update_id = classified.update_id,
                        error = %join_error,
                        "earlier update for this user did not finish cleanly"
                    );
                }
            }

            if let Some(callback_id) = classified.callback_id.as_deref() {
                if let Err(ack_error) = source.answer_callback(callback_id).await {
                    warn!(
                        event_name = "telegram.callback_ack_failed",
                        update_id = classified.update_id,
                        error = %ack_error,
                        "failed to answer callback query"
                    );
                }
            }

            if let Some(event) = classified.event {
                let handled =
                    AssertUnwindSafe(handle_event(desk.as_ref(), replies.as_ref(), &event))
                        .catch_unwind()
                        .await;
                if handled.is_err() {
                    error!(
                        event_name = "telegram.event_failed",
                        correlation_id = %event.correlation_id,
                        user_id = %event.sender.id,
                        "event handler panicked"
                    );
                    reply_generic_failure(replies.as_ref(), &event).await;
                }
            }
        })
    }
}

async fn handle_event(desk: &OrderDesk, replies: &dyn MessageTransport, event: &InboundEvent) {
    info!(
        event_name = "telegram.event_received",
        correlation_id = %event.correlation_id,
        user_id = %event.sender.id,
        "handling inbound event"
    );

    let reply = match desk.handle(event).await {
        Ok(Some(reply)) => reply,
        Ok(None) => return,
        Err(desk_error) => {
            error!(
                event_name = "telegram.event_failed",
                correlation_id = %event.correlation_id,
                user_id = %event.sender.id,
                error = %desk_error,
                "desk failed to handle event"
            );
            OutboundMessage::plain(desk_error.user_message())
        }
    };

    if let Err(send_error) = replies.send(event.reply_to, &reply).await {
        warn!(
            event_name = "telegram.reply_failed",
            correlation_id = %event.correlation_id,
            chat_id = %event.reply_to,
            error = %send_error,
            "could not deliver reply"
        );
    }
}

async fn reply_generic_failure(replies: &dyn MessageTransport, event: &InboundEvent) {
    let reply = OutboundMessage::plain(messages::GENERIC_FAILURE);
    if let Err(send_error) = replies.send(event.reply_to, &reply).await {
        warn!(
            event_name = "telegram.reply_failed",
            correlation_id = %event.correlation_id,
            chat_id = %event.reply_to,
            error = %send_error,
            "could not deliver failure notice"
        );
    }
}

fn poll_delay(error: &SendError, backoff: Duration) -> Duration {
    match error {
        SendError::RateLimited { retry_after } => (*retry_after).max(backoff),
        SendError::Transient(_) | SendError::Permanent(_) => backoff,
    }
}
