//! Push delivery: token validation, gateway access, outcome classification
//! and chunked dispatch.
//!
//! Data flows validator → dispatcher → gateway → classifier. The dispatcher
//! returns a [`DispatchReport`] with one [`DeliveryOutcome`] per token;
//! permanently invalid tokens are surfaced as [`InvalidTokenSignal`]s.

pub mod classifier;
mod dispatcher;
mod gateway;
mod token;
mod types;

pub use dispatcher::{BatchDispatcher, DispatchReport, DispatcherConfig};
pub use gateway::{GatewayError, HttpPushGateway, PushGateway, PushTicket, TicketDetails};
pub use token::{is_valid_token, validate_recipients, ValidatedRecipients};
pub use types::{
    DeliveryOutcome, DeliveryResult, DeviceToken, InvalidTokenSignal, Priority, PushMessage,
    PushPayload,
};
