//! Per-(entity, delivery type) send guard.
//!
//! The ledger check alone lets two concurrent calls both see "no Sent row"
//! and both dispatch. A guard serializes real sends for the same pair.
//!
//! - `LocalSendGuard`: single-process, DashMap of leases
//! - `RedisSendGuard`: cross-instance, `SET NX EX` with owner-checked release
//!
//! Leases expire after `ttl_seconds` so a crashed holder cannot block a pair
//! forever. A live holder keeps its lease with [`SendGuard::renew`] for as
//! long as the send runs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::config::GuardConfig;
use crate::redis::{PoolError, RedisPool};

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Send guard unavailable: {0}")]
    Unavailable(String),
}

impl From<PoolError> for GuardError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Redis(e) => GuardError::Redis(e),
            PoolError::CircuitOpen => {
                GuardError::Unavailable("Redis circuit breaker is open".to_string())
            }
        }
    }
}

/// Proof of holding the guard for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardLease {
    pub key: String,
    pub owner: Uuid,
}

impl GuardLease {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            owner: Uuid::new_v4(),
        }
    }
}

/// Guard key for a logical send.
///
/// The entity id is length-prefixed so ids containing `:` cannot collide,
/// e.g. `("a:b", "c")` and `("a", "b:c")`.
pub fn guard_key(entity_id: &str, delivery_type: &str) -> String {
    format!("{}:{}:{}", entity_id.len(), entity_id, delivery_type)
}

#[async_trait]
pub trait SendGuard: Send + Sync {
    fn backend_type(&self) -> &'static str;

    /// Returns `None` when another holder owns a live lease for `key`.
    async fn try_acquire(&self, key: &str) -> Result<Option<GuardLease>, GuardError>;

    /// Lease lifetime; holders renew well inside it.
    fn ttl(&self) -> Duration;

    /// Extend a held lease by a full TTL. Returns `false` if the lease was
    /// already lost to expiry.
    async fn renew(&self, lease: &GuardLease) -> Result<bool, GuardError>;

    /// Release a lease. Releasing an expired or stolen lease is a no-op.
    async fn release(&self, lease: &GuardLease) -> Result<(), GuardError>;
}

pub struct LocalSendGuard {
    leases: DashMap<String, (Uuid, Instant)>,
    ttl: Duration,
}

impl LocalSendGuard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            leases: DashMap::new(),
            ttl,
        }
    }

    pub fn held_count(&self) -> usize {
        self.leases.len()
    }
}

#[async_trait]
impl SendGuard for LocalSendGuard {
    fn backend_type(&self) -> &'static str {
        "local"
    }

    async fn try_acquire(&self, key: &str) -> Result<Option<GuardLease>, GuardError> {
        let now = Instant::now();
        let lease = GuardLease::new(key);

        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut held) => {
                if now.duration_since(held.get().1) < self.ttl {
                    return Ok(None);
                }
                tracing::warn!(key = %key, "Reclaiming expired send guard lease");
                held.insert((lease.owner, now));
            }
            Entry::Vacant(slot) => {
                slot.insert((lease.owner, now));
            }
        }

        Ok(Some(lease))
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn renew(&self, lease: &GuardLease) -> Result<bool, GuardError> {
        match self.leases.get_mut(&lease.key) {
            Some(mut held) if held.0 == lease.owner => {
                held.1 = Instant::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, lease: &GuardLease) -> Result<(), GuardError> {
        self.leases
            .remove_if(&lease.key, |_, (owner, _)| *owner == lease.owner);
        Ok(())
    }
}

/// Deletes the key only if it still holds our owner id.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Pushes the expiry out only if the key still holds our owner id.
const RENEW_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("EXPIRE", KEYS[1], ARGV[2])
end
return 0
"#;

/// Redis-backed guard shared by every instance.
///
/// Key structure: `{prefix}:{entity_id}:{delivery_type}` holding the owner id.
pub struct RedisSendGuard {
    pool: Arc<RedisPool>,
    prefix: String,
    ttl_seconds: u64,
}

impl RedisSendGuard {
    pub fn new(pool: Arc<RedisPool>, prefix: String, ttl_seconds: u64) -> Self {
        Self {
            pool,
            prefix,
            ttl_seconds: ttl_seconds.max(1),
        }
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl SendGuard for RedisSendGuard {
    fn backend_type(&self) -> &'static str {
        "redis"
    }

    async fn try_acquire(&self, key: &str) -> Result<Option<GuardLease>, GuardError> {
        let lease = GuardLease::new(key);
        let redis_key = self.redis_key(key);
        let owner = lease.owner.to_string();
        let ttl = self.ttl_seconds;

        let reply: Option<String> = self
            .pool
            .execute(|mut conn| async move {
                redis::cmd("SET")
                    .arg(&redis_key)
                    .arg(&owner)
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl)
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        Ok(reply.map(|_| lease))
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    async fn renew(&self, lease: &GuardLease) -> Result<bool, GuardError> {
        let redis_key = self.redis_key(&lease.key);
        let owner = lease.owner.to_string();
        let ttl = self.ttl_seconds;

        let renewed: i64 = self
            .pool
            .execute(|mut conn| async move {
                redis::Script::new(RENEW_SCRIPT)
                    .key(&redis_key)
                    .arg(&owner)
                    .arg(ttl)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        Ok(renewed == 1)
    }

    async fn release(&self, lease: &GuardLease) -> Result<(), GuardError> {
        let redis_key = self.redis_key(&lease.key);
        let owner = lease.owner.to_string();

        let deleted: i64 = self
            .pool
            .execute(|mut conn| async move {
                redis::Script::new(RELEASE_SCRIPT)
                    .key(&redis_key)
                    .arg(&owner)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;

        if deleted == 0 {
            tracing::warn!(key = %lease.key, "Send guard lease had already expired");
        }
        Ok(())
    }
}

/// Create the configured send guard.
///
/// - `"redis"`: `RedisSendGuard` if a Redis pool is available, else local
/// - `"local"`: `LocalSendGuard`
/// - anything else (default `"none"`): no guard
pub fn create_send_guard(
    config: &GuardConfig,
    redis: Option<Arc<RedisPool>>,
) -> Option<Arc<dyn SendGuard>> {
    let ttl = Duration::from_secs(config.ttl_seconds.max(1));

    match config.backend.as_str() {
        "redis" => match redis {
            Some(pool) => {
                tracing::info!(backend = "redis", "Creating Redis send guard");
                Some(Arc::new(RedisSendGuard::new(
                    pool,
                    config.redis_prefix.clone(),
                    config.ttl_seconds,
                )))
            }
            None => {
                tracing::warn!(
                    "Redis send guard requested but Redis is unavailable, falling back to local guard"
                );
                Some(Arc::new(LocalSendGuard::new(ttl)))
            }
        },
        "local" => {
            tracing::info!(backend = "local", "Creating local send guard");
            Some(Arc::new(LocalSendGuard::new(ttl)))
        }
        _ => None,
    }
}
