use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::CatalogEntry;
use crate::transport::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    SelectingDepartment,
    EnteringProduct,
    EnteringQuantity,
    SelectingPriority,
    ConfirmingOrder,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submitter {
    pub id: UserId,
    pub full_name: String,
    pub username: Option<String>,
}

impl Submitter {
    pub fn new(id: UserId, full_name: impl Into<String>, username: Option<String>) -> Self {
        Self { id, full_name: full_name.into(), username }
    }
}

/// A button press, already decoded from its `"<kind>_<value>"` payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selection {
    Department(String),
    Priority(String),
    Confirm,
    Reject,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SelectionParseError {
    #[error("selection payload `{0}` is not of the form <kind>_<value>")]
    Malformed(String),
    #[error("selection payload `{0}` has an unknown kind")]
    UnknownKind(String),
}

impl Selection {
    pub fn payload(&self) -> String {
        match self {
            Self::Department(id) => format!("department_{id}"),
            Self::Priority(id) => format!("priority_{id}"),
            Self::Confirm => "confirm_yes".to_owned(),
            Self::Reject => "confirm_no".to_owned(),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.payload())
    }
}

impl FromStr for Selection {
    type Err = SelectionParseError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        let (kind, value) = payload
            .trim()
            .split_once('_')
            .filter(|(kind, value)| !kind.is_empty() && !value.is_empty())
            .ok_or_else(|| SelectionParseError::Malformed(payload.to_owned()))?;

        match (kind.to_ascii_lowercase().as_str(), value) {
            ("department" | "dept", id) => Ok(Self::Department(id.to_owned())),
            ("priority", id) => Ok(Self::Priority(id.to_owned())),
            ("confirm", "yes") => Ok(Self::Confirm),
            ("confirm", "no") => Ok(Self::Reject),
            _ => Err(SelectionParseError::UnknownKind(payload.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    Start,
    Cancel,
    Text(String),
    Selection(Selection),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub owner: Submitter,
    pub department: Option<CatalogEntry>,
    pub product: Option<String>,
    pub quantity: Option<String>,
    pub priority: Option<CatalogEntry>,
}

impl OrderDraft {
    pub fn new(owner: Submitter) -> Self {
        Self { owner, department: None, product: None, quantity: None, priority: None }
    }

    pub fn missing_fields(&self) -> Vec<String> {
        [
            ("department", self.department.is_none()),
            ("product", self.product.is_none()),
            ("quantity", self.quantity.is_none()),
            ("priority", self.priority.is_none()),
        ]
        .into_iter()
        .filter(|(_, missing)| *missing)
        .map(|(field, _)| field.to_owned())
        .collect()
    }

    pub fn complete(&self) -> Option<CompletedOrder> {
        Some(CompletedOrder {
            submitter: self.owner.clone(),
            department: self.department.clone()?,
            product: self.product.clone()?,
            quantity: self.quantity.clone()?,
            priority: self.priority.clone()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedOrder {
    pub submitter: Submitter,
    pub department: CatalogEntry,
    pub product: String,
    pub quantity: String,
    pub priority: CatalogEntry,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub state: OrderState,
    pub draft: OrderDraft,
}

impl Conversation {
    pub fn start(owner: Submitter) -> Self {
        Self { state: OrderState::SelectingDepartment, draft: OrderDraft::new(owner) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscardReason {
    Cancelled,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    PromptDepartment,
    PromptProduct { department: CatalogEntry },
    PromptQuantity,
    PromptPriority,
    PromptConfirmation { order: CompletedOrder },
    SubmitOrder { order: CompletedOrder },
    Discard { reason: DiscardReason },
    ReportAlreadyInProgress,
    ReportNothingToCancel,
}

/// Result of one accepted event. `conversation` is what the store keeps for
/// the user afterwards; `None` means the dialog reached its terminal state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: Option<OrderState>,
    pub to: Option<OrderState>,
    pub event: OrderEvent,
    pub action: FlowAction,
    pub conversation: Option<Conversation>,
}
