//! Ticket classification.
//!
//! Gateway tickets are turned into a [`DeliveryOutcome`] here and nowhere
//! else; nothing downstream sees a raw ticket.

use super::{DeliveryOutcome, DeliveryResult, DeviceToken, InvalidTokenSignal, PushTicket};

/// Error codes with which the gateway confirms the token itself is dead.
pub const PERMANENT_ERROR_CODES: [&str; 2] = ["DeviceNotRegistered", "BadDeviceToken"];

/// Classify one ticket for the token it was returned for.
pub fn classify(token: DeviceToken, ticket: &PushTicket) -> DeliveryOutcome {
    match ticket {
        PushTicket::Ok { .. } => DeliveryOutcome::delivered(token),
        PushTicket::Error { .. } => match ticket.error_code() {
            Some(code) if PERMANENT_ERROR_CODES.contains(&code) => {
                DeliveryOutcome::invalid(token, code.to_string())
            }
            // Quota, payload or credential problems: the token may be fine
            code => DeliveryOutcome::transient(token, code.map(str::to_string)),
        },
    }
}

/// Invalidation signals for every permanently invalid outcome, in order.
pub fn invalidation_signals(outcomes: &[DeliveryOutcome]) -> Vec<InvalidTokenSignal> {
    outcomes
        .iter()
        .filter(|o| o.result == DeliveryResult::PermanentInvalid)
        .map(|o| InvalidTokenSignal {
            token: o.token.clone(),
            reason: o
                .provider_error_code
                .clone()
                .unwrap_or_else(|| "PermanentInvalid".to_string()),
        })
        .collect()
}
