use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextFormat {
    #[default]
    Plain,
    Html,
}

/// A selectable option rendered by the transport as a button. `payload` is
/// echoed back verbatim in the selection callback.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub label: String,
    pub payload: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { label: label.into(), payload: payload.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub text: String,
    pub format: TextFormat,
    /// One inner vector per row of buttons.
    pub choices: Vec<Vec<Choice>>,
}

impl OutboundMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), format: TextFormat::Plain, choices: Vec::new() }
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self { text: text.into(), format: TextFormat::Html, choices: Vec::new() }
    }

    pub fn choice_row(mut self, row: Vec<Choice>) -> Self {
        if !row.is_empty() {
            self.choices.push(row);
        }
        self
    }

    pub fn has_choices(&self) -> bool {
        !self.choices.is_empty()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("rate limited by transport; retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("transient transport failure: {0}")]
    Transient(String),
    #[error("permanent transport failure: {0}")]
    Permanent(String),
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, recipient: UserId, message: &OutboundMessage) -> Result<(), SendError>;
}
