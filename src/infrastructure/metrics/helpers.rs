//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::infrastructure::resilience::CircuitState;

use super::{
    CHUNKS_TOTAL, CHUNK_LATENCY, GATEWAY_CIRCUIT_STATE, IDEMPOTENT_HITS_TOTAL,
    INVALID_TOKENS_TOTAL, LEDGER_ENTRIES_TOTAL, OUTCOMES_TOTAL, SCHEDULER_TICKS_TOTAL,
    SCHEDULER_TRANSITIONS_TOTAL, TOKENS_REJECTED_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording gateway metrics
pub struct GatewayMetrics;

impl GatewayMetrics {
    pub fn record_chunk(result: &str, elapsed_secs: f64) {
        CHUNKS_TOTAL.with_label_values(&[result]).inc();
        CHUNK_LATENCY.observe(elapsed_secs);
    }

    pub fn record_circuit_open() {
        CHUNKS_TOTAL.with_label_values(&["circuit_open"]).inc();
    }

    pub fn set_circuit_state(state: CircuitState) {
        GATEWAY_CIRCUIT_STATE.set(state as i64);
    }
}

/// Helper struct for recording per-token delivery metrics
pub struct DeliveryMetrics;

impl DeliveryMetrics {
    pub fn record_outcomes(delivered: u64, transient: u64, invalid: u64) {
        OUTCOMES_TOTAL.with_label_values(&["delivered"]).inc_by(delivered);
        OUTCOMES_TOTAL.with_label_values(&["transient_failure"]).inc_by(transient);
        OUTCOMES_TOTAL.with_label_values(&["permanent_invalid"]).inc_by(invalid);
    }

    pub fn record_invalid_token() {
        INVALID_TOKENS_TOTAL.inc();
    }

    pub fn record_rejected(count: u64) {
        TOKENS_REJECTED_TOTAL.inc_by(count);
    }
}

/// Helper struct for ledger metrics
pub struct LedgerMetrics;

impl LedgerMetrics {
    pub fn record_entry(status: &str) {
        LEDGER_ENTRIES_TOTAL.with_label_values(&[status]).inc();
    }

    pub fn record_idempotent_hit() {
        IDEMPOTENT_HITS_TOTAL.inc();
    }
}

/// Helper struct for scheduler metrics
pub struct SchedulerMetrics;

impl SchedulerMetrics {
    pub fn record_tick(ok: bool) {
        let result = if ok { "ok" } else { "error" };
        SCHEDULER_TICKS_TOTAL.with_label_values(&[result]).inc();
    }

    pub fn record_transitions(expired: u64, activated: u64) {
        SCHEDULER_TRANSITIONS_TOTAL
            .with_label_values(&["expired"])
            .inc_by(expired);
        SCHEDULER_TRANSITIONS_TOTAL
            .with_label_values(&["activated"])
            .inc_by(activated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_recorded_metrics() {
        GatewayMetrics::record_chunk("ok", 0.02);
        LedgerMetrics::record_entry("sent");
        SchedulerMetrics::record_transitions(1, 0);

        let output = encode_metrics().unwrap();
        assert!(output.contains("push_chunks_total"));
        assert!(output.contains("push_ledger_entries_total"));
        assert!(output.contains("push_scheduler_transitions_total"));
    }
}
