//! Routes classified inbound events to the registry, the order flow and the
//! relay. Transport agnostic: the adapter turns updates into
//! [`InboundEvent`]s and sends whatever reply comes back.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::access::AccessRegistry;
use crate::clock::Clock;
use crate::conversations::ConversationStore;
use crate::errors::DeskError;
use crate::flows::{
    DiscardReason, FlowAction, FlowTransitionError, OrderEvent, OrderFlow, Selection, Submitter,
};
use crate::messages;
use crate::relay::DeliveryRelay;
use crate::transport::{OutboundMessage, UserId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundEvent {
    pub sender: Submitter,
    /// Chat the reply goes to. For private chats this is the sender's id.
    pub reply_to: UserId,
    pub correlation_id: String,
    pub kind: EventKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Command { name: String, args: String },
    Text(String),
    Selection(Selection),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeskCommand {
    Start,
    Help,
    Order,
    Cancel,
    ReloadUsers,
}

impl DeskCommand {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "order" => Some(Self::Order),
            "cancel" => Some(Self::Cancel),
            "reload_users" => Some(Self::ReloadUsers),
            _ => None,
        }
    }
}

pub struct OrderDesk {
    registry: Arc<AccessRegistry>,
    flow: OrderFlow,
    conversations: ConversationStore,
    relay: DeliveryRelay,
    clock: Arc<dyn Clock>,
}

impl OrderDesk {
    pub fn new(
        registry: Arc<AccessRegistry>,
        flow: OrderFlow,
        relay: DeliveryRelay,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { registry, flow, conversations: ConversationStore::new(), relay, clock }
    }

    pub fn registry(&self) -> &Arc<AccessRegistry> {
        &self.registry
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub async fn handle(&self, event: &InboundEvent) -> Result<Option<OutboundMessage>, DeskError> {
        match &event.kind {
            EventKind::Command { name, .. } => match DeskCommand::parse(name) {
                Some(command) => self.handle_command(event, command).await,
                None => {
                    debug!(
                        event_name = "desk.unknown_command",
                        correlation_id = %event.correlation_id,
                        user_id = %event.sender.id,
                        command = %name,
                        "ignoring unknown command"
                    );
                    Ok(None)
                }
            },
            EventKind::Text(text) => self.advance(event, OrderEvent::Text(text.clone())).await,
            EventKind::Selection(selection) => {
                self.advance(event, OrderEvent::Selection(selection.clone())).await
            }
        }
    }

    async fn handle_command(
        &self,
        event: &InboundEvent,
        command: DeskCommand,
    ) -> Result<Option<OutboundMessage>, DeskError> {
        let user = event.sender.id;
        match command {
            DeskCommand::Start => {
                let greeting = if self.registry.is_allowed(user) {
                    messages::START_ALLOWED
                } else {
                    messages::START_NOT_ALLOWED
                };
                Ok(Some(OutboundMessage::plain(greeting)))
            }
            DeskCommand::Help => {
                let help = if self.registry.is_allowed(user) {
                    messages::HELP
                } else {
                    messages::ACCESS_DENIED
                };
                Ok(Some(OutboundMessage::plain(help)))
            }
            DeskCommand::Order => {
                if !self.registry.is_allowed(user) {
                    warn!(
                        event_name = "desk.access_denied",
                        correlation_id = %event.correlation_id,
                        user_id = %user,
                        "order attempt from a user without access"
                    );
                    return Ok(Some(OutboundMessage::plain(messages::ACCESS_DENIED)));
                }
                self.advance(event, OrderEvent::Start).await
            }
            DeskCommand::Cancel => self.advance(event, OrderEvent::Cancel).await,
            DeskCommand::ReloadUsers => Ok(Some(self.reload_users(event))),
        }
    }

    fn reload_users(&self, event: &InboundEvent) -> OutboundMessage {
        let user = event.sender.id;
        if !self.registry.is_admin(user) {
            warn!(
                event_name = "desk.reload_refused",
                correlation_id = %event.correlation_id,
                user_id = %user,
                "reload requested by a non-administrator"
            );
            return OutboundMessage::plain(messages::RELOAD_NOT_ADMIN);
        }

        match self.registry.reload() {
            Ok(snapshot) => {
                info!(
                    event_name = "desk.registry_reloaded",
                    correlation_id = %event.correlation_id,
                    user_id = %user,
                    admins = snapshot.admin_count(),
                    allowed_users = snapshot.allowed_count(),
                    "user registry reloaded on request"
                );
                messages::reload_succeeded(snapshot.admin_count(), snapshot.allowed_count())
            }
            Err(error) => {
                warn!(
                    event_name = "desk.registry_reload_failed",
                    correlation_id = %event.correlation_id,
                    user_id = %user,
                    error = %error,
                    "reload failed; previous registry stays active"
                );
                OutboundMessage::plain(messages::RELOAD_FAILED)
            }
        }
    }

    async fn advance(
        &self,
        event: &InboundEvent,
        order_event: OrderEvent,
    ) -> Result<Option<OutboundMessage>, DeskError> {
        let sender = &event.sender;
        let mut slot = self.conversations.lock(sender.id).await;

        let applied = self.flow.apply(slot.current(), sender, &order_event);
        let outcome = match applied {
            Ok(outcome) => outcome,
            Err(error @ FlowTransitionError::MissingRequiredFields { .. }) => {
                self.conversations.release(slot);
                return Err(error.into());
            }
            Err(error) => {
                self.conversations.release(slot);
                debug!(
                    event_name = "desk.event_ignored",
                    correlation_id = %event.correlation_id,
                    user_id = %sender.id,
                    reason = %error,
                    "event not accepted in the current state"
                );
                return Ok(None);
            }
        };

        slot.replace(outcome.conversation.clone());
        self.conversations.release(slot);

        info!(
            event_name = "desk.transition",
            correlation_id = %event.correlation_id,
            user_id = %sender.id,
            from = ?outcome.from,
            to = ?outcome.to,
            "order conversation advanced"
        );

        let reply = match outcome.action {
            FlowAction::PromptDepartment => messages::department_prompt(self.flow.catalog()),
            FlowAction::PromptProduct { department } => messages::product_prompt(&department),
            FlowAction::PromptQuantity => messages::quantity_prompt(),
            FlowAction::PromptPriority => messages::priority_prompt(self.flow.catalog()),
            FlowAction::PromptConfirmation { order } => messages::confirmation_prompt(&order),
            FlowAction::SubmitOrder { order } => {
                let notification = messages::order_notification(&order, self.clock.now());
                let admins = self.registry.admin_ids();
                let report = self.relay.deliver(&notification, &admins).await;
                if !report.is_complete() {
                    warn!(
                        event_name = "desk.order_partially_delivered",
                        correlation_id = %event.correlation_id,
                        user_id = %sender.id,
                        delivered = report.delivered.len(),
                        failed = report.failed.len(),
                        "order did not reach every administrator"
                    );
                }
                messages::submitted(&order)
            }
            FlowAction::Discard { reason } => {
                debug!(
                    event_name = "desk.draft_discarded",
                    correlation_id = %event.correlation_id,
                    user_id = %sender.id,
                    reason = ?reason,
                    "order draft discarded"
                );
                match reason {
                    DiscardReason::Cancelled | DiscardReason::Rejected => {
                        OutboundMessage::plain(messages::ORDER_CANCELLED)
                    }
                }
            }
            FlowAction::ReportAlreadyInProgress => {
                OutboundMessage::plain(messages::ALREADY_IN_PROGRESS)
            }
            FlowAction::ReportNothingToCancel => {
                OutboundMessage::plain(messages::NOTHING_TO_CANCEL)
            }
        };

        Ok(Some(reply))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use super::{DeskCommand, EventKind, InboundEvent, OrderDesk};
    use crate::access::{AccessRegistry, InMemoryRegistrySource};
    use crate::catalog::Catalog;
    use crate::clock::{FixedClock, RecordingSleeper};
    use crate::flows::{OrderFlow, OrderState, Selection, Submitter};
    use crate::messages;
    use crate::relay::{DeliveryRelay, RetryPolicy};
    use crate::transport::{MessageTransport, OutboundMessage, SendError, UserId};

    const USERS: &str = "\
[ADMINISTRATORS]
1
2
3

[ALLOWED_USERS]
10
11
";

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(UserId, OutboundMessage)>>,
        failing: HashMap<UserId, SendError>,
    }

    impl RecordingTransport {
        fn failing(recipient: i64, error: SendError) -> Self {
            Self { failing: HashMap::from([(UserId(recipient), error)]), ..Self::default() }
        }

        fn sent(&self) -> Vec<(UserId, OutboundMessage)> {
            self.sent.lock().expect("sent").clone()
        }
    }

    #[async_trait]
    impl MessageTransport for RecordingTransport {
        async fn send(
            &self,
            recipient: UserId,
            message: &OutboundMessage,
        ) -> Result<(), SendError> {
            if let Some(error) = self.failing.get(&recipient) {
                return Err(error.clone());
            }
            self.sent.lock().expect("sent").push((recipient, message.clone()));
            Ok(())
        }
    }

    struct Harness {
        desk: OrderDesk,
        source: InMemoryRegistrySource,
        transport: Arc<RecordingTransport>,
    }

    fn harness_with(transport: RecordingTransport) -> Harness {
        let source = InMemoryRegistrySource::new(USERS);
        let registry = Arc::new(AccessRegistry::load(source.clone()).expect("registry loads"));
        let transport = Arc::new(transport);
        let relay = DeliveryRelay::new(
            transport.clone(),
            Arc::new(RecordingSleeper::default()),
            RetryPolicy::default(),
        );
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).single().expect("time"));
        let flow = OrderFlow::new(Catalog::default());
        let desk = OrderDesk::new(registry, flow, relay, Arc::new(clock));
        Harness { desk, source, transport }
    }

    fn harness() -> Harness {
        harness_with(RecordingTransport::default())
    }

    fn event(user: i64, kind: EventKind) -> InboundEvent {
        InboundEvent {
            sender: Submitter::new(UserId(user), "Ann Smith", Some("ann".to_owned())),
            reply_to: UserId(user),
            correlation_id: format!("test-{user}"),
            kind,
        }
    }

    fn command(user: i64, name: &str) -> InboundEvent {
        event(user, EventKind::Command { name: name.to_owned(), args: String::new() })
    }

    fn text(user: i64, body: &str) -> InboundEvent {
        event(user, EventKind::Text(body.to_owned()))
    }

    fn select(user: i64, selection: Selection) -> InboundEvent {
        event(user, EventKind::Selection(selection))
    }

    async fn reply(desk: &OrderDesk, event: InboundEvent) -> Option<OutboundMessage> {
        desk.handle(&event).await.expect("desk handles event")
    }

    async fn reply_text(desk: &OrderDesk, event: InboundEvent) -> String {
        reply(desk, event).await.expect("desk replies").text
    }

    async fn state_of(desk: &OrderDesk, user: i64) -> Option<OrderState> {
        desk.conversations().current(UserId(user)).await.map(|conversation| conversation.state)
    }

    async fn fill_order(desk: &OrderDesk, user: i64) {
        reply(desk, command(user, "order")).await;
        reply(desk, select(user, Selection::Department("it".to_owned()))).await;
        reply(desk, text(user, " Mouse ")).await;
        reply(desk, text(user, "10")).await;
        reply(desk, select(user, Selection::Priority("high".to_owned()))).await;
    }

    #[test]
    fn command_names_are_case_insensitive() {
        assert_eq!(DeskCommand::parse("ORDER"), Some(DeskCommand::Order));
        assert_eq!(DeskCommand::parse("reload_users"), Some(DeskCommand::ReloadUsers));
        assert_eq!(DeskCommand::parse("shop"), None);
    }

    #[tokio::test]
    async fn unknown_user_is_denied_and_gets_no_draft() {
        let Harness { desk, .. } = harness();

        assert_eq!(reply_text(&desk, command(999, "order")).await, messages::ACCESS_DENIED);
        assert_eq!(state_of(&desk, 999).await, None);

        // later events from the same user have no effect
        assert_eq!(reply(&desk, select(999, Selection::Department("it".to_owned()))).await, None);
        assert_eq!(reply(&desk, text(999, "Mouse")).await, None);
        assert_eq!(state_of(&desk, 999).await, None);
        assert_eq!(desk.conversations().active_count(), 0);
    }

    #[tokio::test]
    async fn start_and_help_depend_on_access() {
        let Harness { desk, .. } = harness();

        assert_eq!(reply_text(&desk, command(10, "start")).await, messages::START_ALLOWED);
        assert_eq!(reply_text(&desk, command(999, "start")).await, messages::START_NOT_ALLOWED);
        assert_eq!(reply_text(&desk, command(10, "help")).await, messages::HELP);
        assert_eq!(reply_text(&desk, command(999, "help")).await, messages::ACCESS_DENIED);
    }

    #[tokio::test]
    async fn second_order_command_reports_progress_and_keeps_draft() {
        let Harness { desk, .. } = harness();

        let prompt = reply(&desk, command(10, "order")).await.expect("department prompt");
        assert_eq!(prompt.choices.len(), Catalog::default().departments.len());
        reply(&desk, select(10, Selection::Department("office".to_owned()))).await;
        reply(&desk, text(10, "Stapler")).await;

        assert_eq!(reply_text(&desk, command(10, "order")).await, messages::ALREADY_IN_PROGRESS);

        let conversation = desk.conversations().current(UserId(10)).await.expect("draft kept");
        assert_eq!(conversation.state, OrderState::EnteringQuantity);
        assert_eq!(conversation.draft.department.map(|entry| entry.id), Some("office".to_owned()));
        assert_eq!(conversation.draft.product.as_deref(), Some("Stapler"));
        assert_eq!(conversation.draft.quantity, None);
    }

    #[tokio::test]
    async fn confirmed_order_reaches_every_admin_once() {
        let Harness { desk, transport, .. } = harness();

        fill_order(&desk, 10).await;
        assert_eq!(state_of(&desk, 10).await, Some(OrderState::ConfirmingOrder));

        let confirmation = reply(&desk, select(10, Selection::Confirm)).await.expect("reply");
        assert!(confirmation.text.contains("sent to the administrators"));

        let sent = transport.sent();
        let mut recipients = sent.iter().map(|(recipient, _)| *recipient).collect::<Vec<_>>();
        recipients.sort_unstable();
        assert_eq!(recipients, vec![UserId(1), UserId(2), UserId(3)]);
        for (_, message) in &sent {
            assert!(message.text.contains("IT"));
            assert!(message.text.contains("Mouse"));
            assert!(message.text.contains("Quantity: 10"));
            assert!(message.text.contains("High"));
            assert!(message.text.contains("Ann Smith"));
            assert!(message.text.contains("User ID: 10"));
            assert!(message.text.contains("04.05.2026 09:30 UTC"));
        }
        assert_eq!(state_of(&desk, 10).await, None);
        assert_eq!(desk.conversations().active_count(), 0);
    }

    #[tokio::test]
    async fn permanent_failure_for_one_admin_still_confirms_to_submitter() {
        let Harness { desk, transport, .. } = harness_with(RecordingTransport::failing(
            2,
            SendError::Permanent("bot was blocked by the user".to_owned()),
        ));

        fill_order(&desk, 11).await;
        let confirmation = reply(&desk, select(11, Selection::Confirm)).await.expect("reply");

        assert!(confirmation.text.contains("sent to the administrators"));
        let recipients =
            transport.sent().into_iter().map(|(recipient, _)| recipient).collect::<Vec<_>>();
        assert!(recipients.contains(&UserId(1)));
        assert!(recipients.contains(&UserId(3)));
        assert!(!recipients.contains(&UserId(2)));
    }

    #[tokio::test]
    async fn cancel_at_quantity_discards_and_next_order_starts_fresh() {
        let Harness { desk, transport, .. } = harness();

        reply(&desk, command(10, "order")).await;
        reply(&desk, select(10, Selection::Department("it".to_owned()))).await;
        reply(&desk, text(10, "Mouse")).await;
        assert_eq!(state_of(&desk, 10).await, Some(OrderState::EnteringQuantity));

        assert_eq!(reply_text(&desk, command(10, "cancel")).await, messages::ORDER_CANCELLED);
        assert_eq!(state_of(&desk, 10).await, None);

        reply(&desk, command(10, "order")).await;
        let fresh = desk.conversations().current(UserId(10)).await.expect("fresh draft");
        assert_eq!(fresh.state, OrderState::SelectingDepartment);
        assert_eq!(fresh.draft.department, None);
        assert_eq!(fresh.draft.product, None);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn cancel_without_conversation_has_no_side_effects() {
        let Harness { desk, .. } = harness();

        assert_eq!(reply_text(&desk, command(10, "cancel")).await, messages::NOTHING_TO_CANCEL);
        assert_eq!(desk.conversations().active_count(), 0);
    }

    #[tokio::test]
    async fn rejecting_the_summary_discards_without_relaying() {
        let Harness { desk, transport, .. } = harness();

        fill_order(&desk, 10).await;
        let reply = reply_text(&desk, select(10, Selection::Reject)).await;
        assert_eq!(reply, messages::ORDER_CANCELLED);
        assert_eq!(state_of(&desk, 10).await, None);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn unexpected_events_are_ignored_without_consuming_state() {
        let Harness { desk, .. } = harness();

        reply(&desk, command(10, "order")).await;
        assert_eq!(reply(&desk, text(10, "Mouse")).await, None);
        let unknown = select(10, Selection::Department("garden".to_owned()));
        assert_eq!(reply(&desk, unknown).await, None);
        assert_eq!(reply(&desk, command(10, "shop")).await, None);
        assert_eq!(state_of(&desk, 10).await, Some(OrderState::SelectingDepartment));
    }

    #[tokio::test]
    async fn users_progress_independently() {
        let Harness { desk, .. } = harness();

        reply(&desk, command(10, "order")).await;
        reply(&desk, command(11, "order")).await;
        reply(&desk, select(10, Selection::Department("it".to_owned()))).await;
        reply(&desk, text(10, "Monitor")).await;

        assert_eq!(state_of(&desk, 10).await, Some(OrderState::EnteringQuantity));
        assert_eq!(state_of(&desk, 11).await, Some(OrderState::SelectingDepartment));
    }

    #[tokio::test]
    async fn access_is_only_checked_when_an_order_starts() {
        let Harness { desk, source, transport } = harness();

        reply(&desk, command(10, "order")).await;
        reply(&desk, select(10, Selection::Department("it".to_owned()))).await;

        source.replace("[ADMINISTRATORS]\n1\n2\n3\n[ALLOWED_USERS]\n11\n");
        assert!(reply_text(&desk, command(1, "reload_users")).await.contains("reloaded"));

        reply(&desk, text(10, "Mouse")).await;
        reply(&desk, text(10, "10")).await;
        reply(&desk, select(10, Selection::Priority("low".to_owned()))).await;
        reply(&desk, select(10, Selection::Confirm)).await;
        assert_eq!(transport.sent().len(), 3);

        assert_eq!(reply_text(&desk, command(10, "order")).await, messages::ACCESS_DENIED);
    }

    #[tokio::test]
    async fn reload_is_admin_only_and_failures_keep_previous_registry() {
        let Harness { desk, source, .. } = harness();

        source.replace("[ADMINISTRATORS]\n5\n");
        let refused = reply_text(&desk, command(10, "reload_users")).await;
        assert_eq!(refused, messages::RELOAD_NOT_ADMIN);
        assert!(desk.registry().is_admin(UserId(1)));
        assert!(!desk.registry().is_admin(UserId(5)));

        source.replace("[ADMINISTRATORS]\nnot-a-number\n");
        assert_eq!(reply_text(&desk, command(1, "reload_users")).await, messages::RELOAD_FAILED);
        assert!(desk.registry().is_admin(UserId(1)));
        assert!(desk.registry().is_allowed(UserId(10)));

        source.replace("[ADMINISTRATORS]\n5\n[ALLOWED_USERS]\n6\n");
        let reloaded = reply_text(&desk, command(1, "reload_users")).await;
        assert!(reloaded.contains("1 administrator(s), 2 user(s)"));
        assert!(desk.registry().is_admin(UserId(5)));
        assert!(!desk.registry().is_admin(UserId(1)));
    }
}
