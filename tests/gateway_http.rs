//! HTTP gateway client tests against a local mock server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use push_ledger_service::config::GatewayConfig;
use push_ledger_service::push::{
    BatchDispatcher, DeliveryResult, DispatcherConfig, GatewayError, HttpPushGateway, Priority,
    PushGateway, PushMessage, PushPayload, PushTicket,
};

fn config(server: &MockServer, access_token: Option<&str>) -> GatewayConfig {
    GatewayConfig {
        url: format!("{}/--/api/v2/push/send", server.uri()),
        access_token: access_token.map(str::to_string),
        ..Default::default()
    }
}

fn payload() -> PushPayload {
    PushPayload {
        title: "Card approved".to_string(),
        body: "Your membership card is ready".to_string(),
        priority: Priority::High,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_send_batch_decodes_tickets_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/--/api/v2/push/send"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"status": "ok", "id": "ticket-1"},
                {"status": "error", "message": "not registered",
                 "details": {"error": "DeviceNotRegistered"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpPushGateway::new(&config(&server, Some("secret-token"))).unwrap();
    let messages = vec![
        PushMessage::new("ExponentPushToken[a]", &payload()),
        PushMessage::new("ExponentPushToken[b]", &payload()),
    ];

    let tickets = gateway.send_batch(&messages).await.unwrap();
    assert_eq!(tickets.len(), 2);
    assert_eq!(
        tickets[0],
        PushTicket::Ok {
            id: Some("ticket-1".to_string())
        }
    );
    assert_eq!(tickets[1].error_code(), Some("DeviceNotRegistered"));
}

#[tokio::test]
async fn test_request_body_carries_message_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!([{
            "to": "ExponentPushToken[a]",
            "title": "Card approved",
            "priority": "high",
            "sound": "default"
        }])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"status": "ok", "id": "t"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HttpPushGateway::new(&config(&server, None)).unwrap();
    let tickets = gateway
        .send_batch(&[PushMessage::new("ExponentPushToken[a]", &payload())])
        .await
        .unwrap();
    assert_eq!(tickets, vec![PushTicket::Ok { id: Some("t".to_string()) }]);
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let gateway = HttpPushGateway::new(&config(&server, None)).unwrap();
    let err = gateway
        .send_batch(&[PushMessage::new("ExponentPushToken[a]", &payload())])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GatewayError::Status { status: 429, ref body } if body == "slow down"
    ));
}

#[tokio::test]
async fn test_missing_data_array_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errors": []})))
        .mount(&server)
        .await;

    let gateway = HttpPushGateway::new(&config(&server, None)).unwrap();
    let err = gateway
        .send_batch(&[PushMessage::new("ExponentPushToken[a]", &payload())])
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Decode(_)));
}

#[tokio::test]
async fn test_dispatcher_over_http_classifies_and_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": [{"status": "ok"}]}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let gateway = Arc::new(HttpPushGateway::new(&config(&server, None)).unwrap());
    let dispatcher = BatchDispatcher::new(
        gateway,
        DispatcherConfig {
            chunk_size: 100,
            request_timeout: Duration::from_millis(50),
        },
    );

    let report = dispatcher
        .dispatch(&["ExponentPushToken[a]".to_string()], &payload())
        .await;

    assert!(report.is_total_failure());
    assert_eq!(report.count(DeliveryResult::TransientFailure), 1);
    assert!(report.invalid_token_signals().is_empty());
}
