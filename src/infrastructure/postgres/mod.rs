//! PostgreSQL persistence module.
//!
//! Provides connection pooling and health tracking for PostgreSQL backends.

pub mod pool;

pub use pool::{PostgresPool, PostgresPoolError};
