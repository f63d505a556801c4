// Infrastructure layer (shared components)
pub mod infrastructure;

pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;
pub use infrastructure::postgres;
pub use infrastructure::redis;

// Domain layer
pub mod ledger;
pub mod notification;
pub mod push;
pub mod schedule;

// Application layer
pub mod api;
pub mod server;

// Supporting modules
pub mod telemetry;
