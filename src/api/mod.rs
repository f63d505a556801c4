//! Operator HTTP surface.

mod health;
mod metrics;
mod notifications;
mod routes;
mod scheduler;

pub use health::{HealthResponse, StatsResponse};
pub use notifications::{LedgerResponse, NotifyRequest};
pub use routes::{api_routes, public_routes};
