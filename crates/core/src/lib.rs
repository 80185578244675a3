//! Procurebot core - purchase-order desk logic
//!
//! Everything here is transport agnostic:
//! - **Access** (`access`) - reloadable registry of administrators and allowed users
//! - **Flows** (`flows`) - the order dialog as a pure state machine
//! - **Relay** (`relay`) - per-recipient delivery with retry and back-off
//! - **Desk** (`desk`) - routes inbound events through the pieces above
//!
//! ```text
//! Transport → InboundEvent → OrderDesk → OrderFlow
//!                               ↓
//!                  AccessRegistry / DeliveryRelay → MessageTransport
//! ```

pub mod access;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod conversations;
pub mod desk;
pub mod errors;
pub mod flows;
pub mod messages;
pub mod relay;
pub mod transport;

pub use access::{
    AccessRegistry, FileRegistrySource, InMemoryRegistrySource, RegistryError, RegistrySnapshot,
    RegistrySource,
};
pub use catalog::{Catalog, CatalogEntry, CatalogError};
pub use clock::{Clock, Sleeper, SystemClock, TokioSleeper};
pub use desk::{EventKind, InboundEvent, OrderDesk};
pub use errors::DeskError;
pub use flows::{OrderFlow, OrderState, Selection, SelectionParseError, Submitter};
pub use relay::{DeliveryRelay, DeliveryReport, RetryPolicy};
pub use transport::{Choice, MessageTransport, OutboundMessage, SendError, TextFormat, UserId};
