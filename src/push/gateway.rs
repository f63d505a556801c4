//! Push gateway client.
//!
//! The gateway accepts a JSON array of messages and answers with one ticket
//! per message, in request order:
//!
//! ```json
//! { "data": [
//!     { "status": "ok", "id": "XXXX-XXXX" },
//!     { "status": "error", "message": "...", "details": { "error": "DeviceNotRegistered" } }
//! ] }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::GatewayConfig;

use super::PushMessage;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected gateway response: {0}")]
    Decode(String),

    #[error("Gateway call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Gateway circuit breaker is open")]
    CircuitOpen,
}

/// Per-message receipt as returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PushTicket {
    Ok {
        #[serde(default)]
        id: Option<String>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        details: Option<TicketDetails>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TicketDetails {
    #[serde(default)]
    pub error: Option<String>,
}

impl PushTicket {
    pub fn ok() -> Self {
        PushTicket::Ok { id: None }
    }

    pub fn error(code: &str) -> Self {
        PushTicket::Error {
            message: None,
            details: Some(TicketDetails {
                error: Some(code.to_string()),
            }),
        }
    }

    /// Provider error code, if this is an error ticket carrying one
    pub fn error_code(&self) -> Option<&str> {
        match self {
            PushTicket::Ok { .. } => None,
            PushTicket::Error { details, .. } => details.as_ref().and_then(|d| d.error.as_deref()),
        }
    }
}

/// Batched send capability of a push gateway.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Send one chunk. On success, returns one ticket per message in order.
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    data: Option<Vec<PushTicket>>,
}

/// HTTP implementation of [`PushGateway`].
pub struct HttpPushGateway {
    client: reqwest::Client,
    url: String,
    access_token: Option<String>,
}

impl HttpPushGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("push-ledger-service/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            access_token: config.access_token.clone(),
        })
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    #[tracing::instrument(name = "gateway.send_batch", skip(self, messages), fields(size = messages.len()))]
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>, GatewayError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(messages);

        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let decoded: SendResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;

        decoded
            .data
            .ok_or_else(|| GatewayError::Decode("response has no data array".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ticket_decoding() {
        let tickets: Vec<PushTicket> = serde_json::from_value(json!([
            {"status": "ok", "id": "abc"},
            {"status": "error", "message": "gone", "details": {"error": "DeviceNotRegistered"}},
            {"status": "error", "message": "slow down"}
        ]))
        .unwrap();

        assert_eq!(tickets[0], PushTicket::Ok { id: Some("abc".to_string()) });
        assert_eq!(tickets[1].error_code(), Some("DeviceNotRegistered"));
        assert_eq!(tickets[2].error_code(), None);
    }
}
