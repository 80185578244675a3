use thiserror::Error;

use crate::flows::FlowTransitionError;
use crate::messages;

/// Failures that escape the desk. Expected outcomes (ignored events, denied
/// access, failed reloads) are replies, not errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeskError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
}

impl DeskError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::FlowTransition(_) => messages::GENERIC_FAILURE,
        }
    }
}
