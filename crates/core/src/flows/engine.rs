use thiserror::Error;

use crate::catalog::Catalog;
use crate::flows::states::{
    Conversation, DiscardReason, FlowAction, OrderEvent, OrderState, Selection, Submitter,
    TransitionOutcome,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required fields before transition from {state:?}: {missing_fields:?}")]
    MissingRequiredFields { state: OrderState, missing_fields: Vec<String> },
    #[error("event {event:?} is not accepted in state {state:?}")]
    InvalidTransition { state: Option<OrderState>, event: OrderEvent },
    #[error("{kind} `{id}` is not in the catalog")]
    UnknownCatalogEntry { kind: &'static str, id: String },
}

/// The purchase-order dialog. Pure: it never touches the registry, the store
/// or the network, it only says what the next conversation looks like and what
/// the caller has to do about it.
#[derive(Clone, Debug, Default)]
pub struct OrderFlow {
    catalog: Catalog,
}

impl OrderFlow {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn apply(
        &self,
        current: Option<&Conversation>,
        submitter: &Submitter,
        event: &OrderEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        match current {
            None => self.apply_idle(submitter, event),
            Some(conversation) => self.apply_active(conversation, event),
        }
    }

    fn apply_idle(
        &self,
        submitter: &Submitter,
        event: &OrderEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        let (conversation, action) = match event {
            OrderEvent::Start => {
                (Some(Conversation::start(submitter.clone())), FlowAction::PromptDepartment)
            }
            OrderEvent::Cancel => (None, FlowAction::ReportNothingToCancel),
            OrderEvent::Text(_) | OrderEvent::Selection(_) => {
                return Err(FlowTransitionError::InvalidTransition {
                    state: None,
                    event: event.clone(),
                });
            }
        };

        Ok(outcome(None, event, action, conversation))
    }

    fn apply_active(
        &self,
        current: &Conversation,
        event: &OrderEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        use OrderState::{
            ConfirmingOrder, EnteringProduct, EnteringQuantity, SelectingDepartment,
            SelectingPriority,
        };

        let from = Some(current.state);
        let mut next = current.clone();

        let action = match (current.state, event) {
            (_, OrderEvent::Start) => FlowAction::ReportAlreadyInProgress,
            (_, OrderEvent::Cancel) => {
                return Ok(outcome(
                    from,
                    event,
                    FlowAction::Discard { reason: DiscardReason::Cancelled },
                    None,
                ));
            }
            (SelectingDepartment, OrderEvent::Selection(Selection::Department(id))) => {
                let department = self.catalog.department(id).cloned().ok_or_else(|| {
                    FlowTransitionError::UnknownCatalogEntry { kind: "department", id: id.clone() }
                })?;
                next.draft.department = Some(department.clone());
                next.state = EnteringProduct;
                FlowAction::PromptProduct { department }
            }
            (EnteringProduct, OrderEvent::Text(text)) => {
                next.draft.product = Some(accepted_text(current.state, event, text)?);
                next.state = EnteringQuantity;
                FlowAction::PromptQuantity
            }
            (EnteringQuantity, OrderEvent::Text(text)) => {
                next.draft.quantity = Some(accepted_text(current.state, event, text)?);
                next.state = SelectingPriority;
                FlowAction::PromptPriority
            }
            (SelectingPriority, OrderEvent::Selection(Selection::Priority(id))) => {
                let priority = self.catalog.priority(id).cloned().ok_or_else(|| {
                    FlowTransitionError::UnknownCatalogEntry { kind: "priority", id: id.clone() }
                })?;
                next.draft.priority = Some(priority);
                let order = next.draft.complete().ok_or_else(|| {
                    FlowTransitionError::MissingRequiredFields {
                        state: current.state,
                        missing_fields: next.draft.missing_fields(),
                    }
                })?;
                next.state = ConfirmingOrder;
                FlowAction::PromptConfirmation { order }
            }
            (ConfirmingOrder, OrderEvent::Selection(Selection::Confirm)) => {
                let order = current.draft.complete().ok_or_else(|| {
                    FlowTransitionError::MissingRequiredFields {
                        state: current.state,
                        missing_fields: current.draft.missing_fields(),
                    }
                })?;
                return Ok(outcome(from, event, FlowAction::SubmitOrder { order }, None));
            }
            (ConfirmingOrder, OrderEvent::Selection(Selection::Reject)) => {
                return Ok(outcome(
                    from,
                    event,
                    FlowAction::Discard { reason: DiscardReason::Rejected },
                    None,
                ));
            }
            _ => {
                return Err(FlowTransitionError::InvalidTransition {
                    state: from,
                    event: event.clone(),
                });
            }
        };

        Ok(outcome(from, event, action, Some(next)))
    }
}

fn accepted_text(
    state: OrderState,
    event: &OrderEvent,
    text: &str,
) -> Result<String, FlowTransitionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(FlowTransitionError::InvalidTransition {
            state: Some(state),
            event: event.clone(),
        });
    }
    Ok(trimmed.to_owned())
}

fn outcome(
    from: Option<OrderState>,
    event: &OrderEvent,
    action: FlowAction,
    conversation: Option<Conversation>,
) -> TransitionOutcome {
    TransitionOutcome {
        from,
        to: conversation.as_ref().map(|conversation| conversation.state),
        event: event.clone(),
        action,
        conversation,
    }
}
