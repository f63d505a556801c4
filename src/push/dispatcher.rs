use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::GatewayConfig;
use crate::infrastructure::resilience::{CircuitBreaker, CircuitBreakerConfig};
use crate::metrics::{DeliveryMetrics, GatewayMetrics};

use super::classifier::{classify, invalidation_signals};
use super::{
    DeliveryOutcome, DeliveryResult, DeviceToken, GatewayError, InvalidTokenSignal, PushGateway,
    PushMessage, PushPayload,
};

/// Chunking and timeout settings for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub chunk_size: usize,
    pub request_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&GatewayConfig> for DispatcherConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

/// Everything one dispatch produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    /// One outcome per input token, in input order
    pub outcomes: Vec<DeliveryOutcome>,
    /// Number of chunk calls attempted
    pub chunks_attempted: usize,
    /// Chunk calls that failed as a whole (no per-token evidence)
    pub chunks_failed: usize,
}

impl DispatchReport {
    pub fn delivered_count(&self) -> usize {
        self.count(DeliveryResult::Delivered)
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.len() - self.delivered_count()
    }

    pub fn count(&self, result: DeliveryResult) -> usize {
        self.outcomes.iter().filter(|o| o.result == result).count()
    }

    /// True when chunks were attempted and none reached the gateway successfully.
    pub fn is_total_failure(&self) -> bool {
        self.chunks_attempted > 0 && self.chunks_failed == self.chunks_attempted
    }

    pub fn invalid_token_signals(&self) -> Vec<InvalidTokenSignal> {
        invalidation_signals(&self.outcomes)
    }
}

/// Sends recipient lists to the gateway in provider-sized chunks.
///
/// Chunks go out one at a time; provider rate limits make parallel chunk
/// sends unsafe without throttling.
pub struct BatchDispatcher {
    gateway: Arc<dyn PushGateway>,
    config: DispatcherConfig,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl BatchDispatcher {
    pub fn new(gateway: Arc<dyn PushGateway>, config: DispatcherConfig) -> Self {
        Self::with_circuit_breaker(
            gateway,
            config,
            Arc::new(CircuitBreaker::with_config(
                "gateway",
                CircuitBreakerConfig::default(),
            )),
        )
    }

    pub fn with_circuit_breaker(
        gateway: Arc<dyn PushGateway>,
        mut config: DispatcherConfig,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        config.chunk_size = config.chunk_size.max(1);
        Self {
            gateway,
            config,
            circuit_breaker,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    /// Dispatch `payload` to every recipient.
    ///
    /// Never fails: a chunk that errors as a whole marks all of its tokens
    /// as transient failures and the next chunk is still attempted.
    #[tracing::instrument(
        name = "dispatcher.dispatch",
        skip(self, recipients, payload),
        fields(recipients = recipients.len(), chunk_size = self.config.chunk_size)
    )]
    pub async fn dispatch(&self, recipients: &[DeviceToken], payload: &PushPayload) -> DispatchReport {
        let mut report = DispatchReport {
            outcomes: Vec::with_capacity(recipients.len()),
            ..Default::default()
        };

        for (index, chunk) in recipients.chunks(self.config.chunk_size).enumerate() {
            report.chunks_attempted += 1;

            match self.send_chunk(chunk, payload).await {
                Ok(outcomes) => report.outcomes.extend(outcomes),
                Err(e) => {
                    report.chunks_failed += 1;
                    tracing::warn!(
                        chunk = index,
                        size = chunk.len(),
                        error = %e,
                        "Chunk send failed, marking all tokens as transient failures"
                    );
                    report.outcomes.extend(
                        chunk
                            .iter()
                            .map(|token| DeliveryOutcome::transient(token.clone(), None)),
                    );
                }
            }
        }

        GatewayMetrics::set_circuit_state(self.circuit_breaker.state());
        DeliveryMetrics::record_outcomes(
            report.delivered_count() as u64,
            report.count(DeliveryResult::TransientFailure) as u64,
            report.count(DeliveryResult::PermanentInvalid) as u64,
        );

        tracing::debug!(
            delivered = report.delivered_count(),
            failed = report.failure_count(),
            chunks = report.chunks_attempted,
            chunks_failed = report.chunks_failed,
            "Dispatch completed"
        );

        report
    }

    async fn send_chunk(
        &self,
        chunk: &[DeviceToken],
        payload: &PushPayload,
    ) -> Result<Vec<DeliveryOutcome>, ChunkError> {
        if !self.circuit_breaker.allow_request() {
            GatewayMetrics::record_circuit_open();
            return Err(ChunkError::Gateway(GatewayError::CircuitOpen));
        }

        let messages: Vec<PushMessage> = chunk
            .iter()
            .map(|token| PushMessage::new(token, payload))
            .collect();

        let start = Instant::now();
        let result = tokio::time::timeout(
            self.config.request_timeout,
            self.gateway.send_batch(&messages),
        )
        .await;
        let elapsed = start.elapsed().as_secs_f64();

        let tickets = match result {
            Ok(Ok(tickets)) => tickets,
            Ok(Err(e)) => {
                self.circuit_breaker.record_failure();
                GatewayMetrics::record_chunk("failed", elapsed);
                return Err(ChunkError::Gateway(e));
            }
            Err(_) => {
                self.circuit_breaker.record_failure();
                GatewayMetrics::record_chunk("timeout", elapsed);
                return Err(ChunkError::Gateway(GatewayError::Timeout(
                    self.config.request_timeout,
                )));
            }
        };

        // The gateway answered, so it is reachable even if the answer is wrong
        self.circuit_breaker.record_success();

        if tickets.len() != chunk.len() {
            GatewayMetrics::record_chunk("mismatch", elapsed);
            tracing::error!(
                expected = chunk.len(),
                received = tickets.len(),
                "Gateway ticket count does not match chunk size"
            );
            return Err(ChunkError::TicketMismatch {
                expected: chunk.len(),
                received: tickets.len(),
            });
        }

        GatewayMetrics::record_chunk("ok", elapsed);

        Ok(chunk
            .iter()
            .zip(tickets.iter())
            .map(|(token, ticket)| classify(token.clone(), ticket))
            .collect())
    }
}

#[derive(Debug, thiserror::Error)]
enum ChunkError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("expected {expected} tickets, received {received}")]
    TicketMismatch { expected: usize, received: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::PushTicket;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with `ok` for every message, except tokens listed in `dead`.
    struct ScriptedGateway {
        dead: Vec<String>,
        calls: Mutex<Vec<usize>>,
        fail_all: bool,
        short_reply: bool,
        delay: Option<Duration>,
    }

    impl ScriptedGateway {
        fn new() -> Self {
            Self {
                dead: vec![],
                calls: Mutex::new(vec![]),
                fail_all: false,
                short_reply: false,
                delay: None,
            }
        }
    }

    #[async_trait]
    impl PushGateway for ScriptedGateway {
        async fn send_batch(&self, messages: &[PushMessage]) -> Result<Vec<PushTicket>, GatewayError> {
            self.calls.lock().unwrap().push(messages.len());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_all {
                return Err(GatewayError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            let mut tickets: Vec<PushTicket> = messages
                .iter()
                .map(|m| {
                    if self.dead.contains(&m.to) {
                        PushTicket::error("DeviceNotRegistered")
                    } else {
                        PushTicket::ok()
                    }
                })
                .collect();
            if self.short_reply {
                tickets.pop();
            }
            Ok(tickets)
        }
    }

    fn tokens(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("ExponentPushToken[{}]", i)).collect()
    }

    fn payload() -> PushPayload {
        PushPayload {
            title: "t".to_string(),
            body: "b".to_string(),
            ..Default::default()
        }
    }

    fn dispatcher(gateway: Arc<ScriptedGateway>, chunk_size: usize) -> BatchDispatcher {
        BatchDispatcher::new(
            gateway,
            DispatcherConfig {
                chunk_size,
                request_timeout: Duration::from_millis(200),
            },
        )
    }

    #[tokio::test]
    async fn test_partitions_into_ceil_chunks_in_order() {
        let gateway = Arc::new(ScriptedGateway::new());
        let recipients = tokens(7);

        let report = dispatcher(gateway.clone(), 3).dispatch(&recipients, &payload()).await;

        assert_eq!(*gateway.calls.lock().unwrap(), vec![3, 3, 1]);
        assert_eq!(report.chunks_attempted, 3);
        let order: Vec<_> = report.outcomes.iter().map(|o| o.token.clone()).collect();
        assert_eq!(order, recipients);
        assert_eq!(report.delivered_count(), 7);
    }

    #[tokio::test]
    async fn test_empty_recipients_make_no_calls() {
        let gateway = Arc::new(ScriptedGateway::new());
        let report = dispatcher(gateway.clone(), 3).dispatch(&[], &payload()).await;

        assert!(gateway.calls.lock().unwrap().is_empty());
        assert!(!report.is_total_failure());
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_dead_token_classified_permanent() {
        let mut gateway = ScriptedGateway::new();
        gateway.dead = vec!["ExponentPushToken[1]".to_string()];
        let report = dispatcher(Arc::new(gateway), 10).dispatch(&tokens(3), &payload()).await;

        assert_eq!(report.delivered_count(), 2);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.invalid_token_signals().len(), 1);
        assert_eq!(report.invalid_token_signals()[0].token, "ExponentPushToken[1]");
    }

    #[tokio::test]
    async fn test_chunk_error_marks_all_transient() {
        let mut gateway = ScriptedGateway::new();
        gateway.fail_all = true;
        let report = dispatcher(Arc::new(gateway), 10).dispatch(&tokens(5), &payload()).await;

        assert!(report.is_total_failure());
        assert_eq!(report.count(DeliveryResult::TransientFailure), 5);
        assert!(report.invalid_token_signals().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_marks_chunk_transient() {
        let mut gateway = ScriptedGateway::new();
        gateway.delay = Some(Duration::from_millis(500));
        let report = dispatcher(Arc::new(gateway), 10).dispatch(&tokens(2), &payload()).await;

        assert_eq!(report.chunks_failed, 1);
        assert_eq!(report.count(DeliveryResult::TransientFailure), 2);
    }

    #[tokio::test]
    async fn test_ticket_mismatch_is_not_classified() {
        let mut gateway = ScriptedGateway::new();
        gateway.short_reply = true;
        gateway.dead = vec!["ExponentPushToken[0]".to_string()];
        let report = dispatcher(Arc::new(gateway), 10).dispatch(&tokens(3), &payload()).await;

        assert_eq!(report.chunks_failed, 1);
        assert_eq!(report.count(DeliveryResult::TransientFailure), 3);
        assert!(report.invalid_token_signals().is_empty());
    }

    #[tokio::test]
    async fn test_open_circuit_skips_gateway() {
        let gateway = Arc::new(ScriptedGateway::new());
        let d = dispatcher(gateway.clone(), 10);
        for _ in 0..5 {
            d.circuit_breaker().record_failure();
        }

        let report = d.dispatch(&tokens(2), &payload()).await;
        assert!(gateway.calls.lock().unwrap().is_empty());
        assert!(report.is_total_failure());
    }
}
