use serde::{Deserialize, Serialize};

/// Device token as issued by the push gateway. Opaque to this service.
pub type DeviceToken = String;

/// Delivery priority requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Gateway wire value
    pub fn as_gateway_str(&self) -> &'static str {
        match self {
            Priority::Low => "normal",
            Priority::Normal => "default",
            Priority::High => "high",
        }
    }
}

/// Content shared by every recipient of one logical send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub priority: Priority,
}

/// One message in a batched gateway call.
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub to: DeviceToken,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,
    pub priority: &'static str,
    pub sound: &'static str,
}

impl PushMessage {
    pub fn new(to: &str, payload: &PushPayload) -> Self {
        Self {
            to: to.to_string(),
            title: payload.title.clone(),
            body: payload.body.clone(),
            data: payload.data.clone(),
            priority: payload.priority.as_gateway_str(),
            sound: "default",
        }
    }
}

/// Disposition of a single recipient after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryResult {
    Delivered,
    TransientFailure,
    PermanentInvalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub token: DeviceToken,
    pub result: DeliveryResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_error_code: Option<String>,
}

impl DeliveryOutcome {
    pub fn delivered(token: DeviceToken) -> Self {
        Self {
            token,
            result: DeliveryResult::Delivered,
            provider_error_code: None,
        }
    }

    pub fn transient(token: DeviceToken, code: Option<String>) -> Self {
        Self {
            token,
            result: DeliveryResult::TransientFailure,
            provider_error_code: code,
        }
    }

    pub fn invalid(token: DeviceToken, code: String) -> Self {
        Self {
            token,
            result: DeliveryResult::PermanentInvalid,
            provider_error_code: Some(code),
        }
    }
}

/// Emitted for tokens the gateway confirmed dead; consumed by device storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidTokenSignal {
    pub token: DeviceToken,
    pub reason: String,
}
