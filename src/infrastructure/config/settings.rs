use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// PostgreSQL connection; the device directory always needs it
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub key: Option<String>,
}

/// Push gateway connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Batched send endpoint
    #[serde(default = "default_gateway_url")]
    pub url: String,
    /// Optional bearer token for authenticated gateways
    #[serde(default)]
    pub access_token: Option<String>,
    /// Maximum messages per batched send call
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Per-chunk request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Consecutive chunk failures before the gateway circuit opens
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,
    /// Time before an open gateway circuit lets a probe through (ms)
    #[serde(default = "default_circuit_reset_timeout_ms")]
    pub circuit_reset_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// "memory" or "postgres"
    #[serde(default = "default_memory_backend")]
    pub backend: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
}

/// SQL used by the PostgreSQL device directory.
///
/// The tables behind these queries belong to the device-registration
/// service; this service only reads tokens and clears dead ones.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Must return a single boolean for `$1 = entity_id`
    #[serde(default = "default_entity_exists_query")]
    pub entity_exists_query: String,
    /// Must return one text column of device tokens for `$1 = entity_id`
    #[serde(default = "default_recipients_query")]
    pub recipients_query: String,
    /// Executed with `$1 = token`, `$2 = reason`
    #[serde(default = "default_invalidate_token_query")]
    pub invalidate_token_query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    /// "none", "local" or "redis"
    #[serde(default = "default_guard_backend")]
    pub backend: String,
    /// Lease lifetime; renewed while a send runs, so it only bounds a crashed holder
    #[serde(default = "default_guard_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_guard_prefix")]
    pub redis_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_scheduler_interval")]
    pub interval_seconds: u64,
    /// "memory" or "postgres"
    #[serde(default = "default_memory_backend")]
    pub backend: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
    /// Emit log lines as JSON instead of human-readable text
    #[serde(default)]
    pub json_logs: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_gateway_url() -> String {
    "https://exp.host/--/api/v2/push/send".to_string()
}

fn default_chunk_size() -> usize {
    100 // gateway documented maximum
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_circuit_failure_threshold() -> u32 {
    5
}

fn default_circuit_reset_timeout_ms() -> u64 {
    30_000
}

fn default_memory_backend() -> String {
    "memory".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_idle_timeout() -> u32 {
    300
}

fn default_entity_exists_query() -> String {
    "SELECT EXISTS(SELECT 1 FROM content_items WHERE id::text = $1)".to_string()
}

fn default_recipients_query() -> String {
    "SELECT push_token FROM devices WHERE push_token IS NOT NULL AND notifications_enabled"
        .to_string()
}

fn default_invalidate_token_query() -> String {
    "UPDATE devices SET push_token = NULL, push_token_error = $2 WHERE push_token = $1"
        .to_string()
}

fn default_guard_backend() -> String {
    "none".to_string()
}

fn default_guard_ttl() -> u64 {
    120
}

fn default_guard_prefix() -> String {
    "push:send-guard".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_true() -> bool {
    true
}

fn default_scheduler_interval() -> u64 {
    60
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "push-ledger-service".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8082)?
            .set_default("gateway.chunk_size", 100)?
            .set_default("scheduler.interval_seconds", 60)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // PUSH_SERVER__PORT, PUSH_GATEWAY__CHUNK_SIZE, PUSH_DATABASE__URL, ...
            .add_source(
                Environment::with_prefix("PUSH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that deserialize fine but cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.interval_seconds == 0 {
            return Err(ConfigError::Message(
                "scheduler.interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.guard.ttl_seconds == 0 {
            return Err(ConfigError::Message(
                "guard.ttl_seconds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            access_token: None,
            chunk_size: default_chunk_size(),
            request_timeout_ms: default_request_timeout_ms(),
            circuit_failure_threshold: default_circuit_failure_threshold(),
            circuit_reset_timeout_ms: default_circuit_reset_timeout_ms(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            entity_exists_query: default_entity_exists_query(),
            recipients_query: default_recipients_query(),
            invalidate_token_query: default_invalidate_token_query(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            backend: default_guard_backend(),
            ttl_seconds: default_guard_ttl(),
            redis_prefix: default_guard_prefix(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_scheduler_interval(),
            backend: default_memory_backend(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8082);

        let gateway = GatewayConfig::default();
        assert_eq!(gateway.chunk_size, 100);
        assert_eq!(gateway.request_timeout_ms, 10_000);

        let guard = GuardConfig::default();
        assert_eq!(guard.backend, "none");
    }

    #[test]
    fn test_deserialize_partial_config() {
        let settings: Settings = Config::builder()
            .set_override("gateway.chunk_size", 25)
            .unwrap()
            .set_override("ledger.backend", "postgres")
            .unwrap()
            .set_override("database.url", "postgres://localhost/push")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.gateway.chunk_size, 25);
        assert_eq!(settings.ledger.backend, "postgres");
        assert_eq!(settings.database.as_ref().unwrap().pool_size, 10);
        assert!(settings.scheduler.enabled);
        assert_eq!(settings.server_addr(), "0.0.0.0:8082");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_scheduler_interval_is_rejected() {
        let settings: Settings = Config::builder()
            .set_override("scheduler.interval_seconds", 0)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("scheduler.interval_seconds"));
    }
}
