//! Telegram adapter - Bot API long polling for the order desk
//!
//! - **Client** (`client`) - reqwest Bot API calls with retry classification
//! - **Events** (`events`) - update classifier (commands, text, button callbacks)
//! - **Render** (`render`) - `sendMessage` bodies with inline keyboards
//! - **Polling** (`polling`) - `getUpdates` loop with back-off and per-user ordering
//!
//! ```text
//! getUpdates → UpdateClassifier → OrderDesk → sendMessage
//! ```

pub mod api;
pub mod client;
pub mod events;
pub mod polling;
pub mod render;

pub use client::{BotApiClient, ClientError};
pub use events::{ClassifiedUpdate, UpdateClassifier};
pub use polling::{PollingRunner, ReconnectPolicy, UpdateSource};
