//! Failure isolation for outbound dependencies.
//!
//! The same breaker type guards the PostgreSQL pool, the Redis pool and the
//! push gateway; each owner gets its own named instance.

mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};

/// Get current time in milliseconds since epoch
pub(crate) fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
