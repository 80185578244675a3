pub mod engine;
pub mod states;

pub use engine::{FlowTransitionError, OrderFlow};
pub use states::{
    CompletedOrder, Conversation, DiscardReason, FlowAction, OrderDraft, OrderEvent, OrderState,
    Selection, SelectionParseError, Submitter, TransitionOutcome,
};
