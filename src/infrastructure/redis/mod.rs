//! Redis access for coordination state (per-send guards).

pub mod pool;

pub use pool::{PoolError, RedisPool};
