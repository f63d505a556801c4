//! Prometheus metrics for the push delivery service.
//!
//! - Gateway metrics (chunk calls, chunk latency, circuit state)
//! - Delivery outcome metrics (delivered, transient, invalid tokens)
//! - Ledger metrics (entries by status, idempotent hits)
//! - Scheduler metrics (ticks, status transitions)

mod helpers;

pub use helpers::{encode_metrics, DeliveryMetrics, GatewayMetrics, LedgerMetrics, SchedulerMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "push";

lazy_static! {
    // ============================================================================
    // Gateway Metrics
    // ============================================================================

    /// Batched send calls by result (ok, failed, timeout, circuit_open)
    pub static ref CHUNKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_chunks_total", METRIC_PREFIX),
        "Total batched send calls issued to the push gateway",
        &["result"]
    ).unwrap();

    /// Latency of a single batched send call
    pub static ref CHUNK_LATENCY: Histogram = register_histogram!(
        format!("{}_chunk_latency_seconds", METRIC_PREFIX),
        "Push gateway batched send latency in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Gateway circuit breaker state (0=closed, 1=open, 2=half-open)
    pub static ref GATEWAY_CIRCUIT_STATE: IntGauge = register_int_gauge!(
        format!("{}_gateway_circuit_state", METRIC_PREFIX),
        "Push gateway circuit breaker state (0=closed, 1=open, 2=half-open)"
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Per-token delivery outcomes
    pub static ref OUTCOMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_outcomes_total", METRIC_PREFIX),
        "Per-token delivery outcomes",
        &["result"]
    ).unwrap();

    /// Tokens signalled as permanently invalid
    pub static ref INVALID_TOKENS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_invalid_tokens_total", METRIC_PREFIX),
        "Total device tokens signalled as permanently invalid"
    ).unwrap();

    /// Tokens dropped by the format validator before dispatch
    pub static ref TOKENS_REJECTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_tokens_rejected_total", METRIC_PREFIX),
        "Total malformed device tokens dropped before dispatch"
    ).unwrap();

    // ============================================================================
    // Ledger Metrics
    // ============================================================================

    /// Finalized ledger entries by status
    pub static ref LEDGER_ENTRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_ledger_entries_total", METRIC_PREFIX),
        "Ledger entries written by final status",
        &["status"]
    ).unwrap();

    /// notify calls answered from an existing Sent entry
    pub static ref IDEMPOTENT_HITS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_idempotent_hits_total", METRIC_PREFIX),
        "Total notify calls short-circuited by an existing Sent entry"
    ).unwrap();

    // ============================================================================
    // Scheduler Metrics
    // ============================================================================

    /// Scheduler ticks by result
    pub static ref SCHEDULER_TICKS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_scheduler_ticks_total", METRIC_PREFIX),
        "Expiry scheduler ticks",
        &["result"]
    ).unwrap();

    /// Records moved between statuses by the scheduler
    pub static ref SCHEDULER_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_scheduler_transitions_total", METRIC_PREFIX),
        "Time-bounded records transitioned by the scheduler",
        &["transition"]
    ).unwrap();
}
