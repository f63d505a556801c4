mod settings;

pub use settings::{
    ApiConfig, DatabaseConfig, DirectoryConfig, GatewayConfig, GuardConfig, LedgerConfig,
    OtelConfig, RedisConfig, SchedulerConfig, ServerConfig, Settings,
};
