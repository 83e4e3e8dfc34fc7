//! Token-count memoization keyed by a digest of the outbound message list.
//!
//! Caching is strictly best-effort: every failure is logged and absorbed
//! here, and an absent or unreachable store behaves like "always compute,
//! never remember".

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::{redis::AsyncCommands, Config, Connection, Pool, PoolConfig, Runtime};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{CacheBackendKind, CacheConfig};
use crate::models::chat::Turn;
use crate::services::token_counter::TokenCounter;

/// Namespace so token counts never collide with other users of the store.
pub const KEY_PREFIX: &str = "token_count:";

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How often the in-process store drops expired entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache command failed: {0}")]
    Command(String),
}

/// Stable key for an ordered turn sequence.
///
/// Each field is length-prefixed, so distinct sequences never share a
/// canonical form.
pub fn derive_key(turns: &[Turn]) -> String {
    let mut hasher = Sha256::new();
    for turn in turns {
        for field in [turn.role().as_str(), turn.content()] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
    }
    format!("{}{}", KEY_PREFIX, hex::encode(hasher.finalize()))
}

/// Get/set contract of the backing store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// `Ok(None)` on a clean miss; `Err` only when the store itself fails.
    async fn get(&self, key: &str) -> Result<Option<u64>, CacheError>;

    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<(), CacheError>;
}

// ===== Redis =====

pub struct RedisCacheBackend {
    pool: Pool,
}

impl RedisCacheBackend {
    pub fn new(config: &CacheConfig) -> Result<Self, CacheError> {
        let mut cfg = Config::from_url(config.redis_url.clone());
        cfg.pool = Some(PoolConfig::new(config.pool_max.max(1)));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn connection(&self) -> Result<Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        deadpool_redis::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<u64>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<u64>>(key)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }

    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }
}

// ===== In-process =====

#[derive(Debug, Clone, Copy)]
struct MemoryEntry {
    value: u64,
    /// `None` when the TTL is too large to represent; such entries never expire.
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|at| Instant::now() >= at)
            .unwrap_or(false)
    }
}

/// Process-local store with per-entry expiry.
///
/// Keys change with every request, so expired entries are dropped by a
/// periodic sweep (see [`MemoryCacheBackend::spawn_sweeper`]) as well as
/// lazily on read.
#[derive(Clone, Default)]
pub struct MemoryCacheBackend {
    storage: Arc<DashMap<String, MemoryEntry>>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Returns number of entries removed
    pub fn cleanup_expired(&self) -> usize {
        let start_len = self.storage.len();
        self.storage.retain(|_, entry| !entry.is_expired());
        let count = start_len.saturating_sub(self.storage.len());

        if count > 0 {
            debug!("Cleaned up {} expired token counts", count);
        }
        count
    }

    /// Run `cleanup_expired` every `period` until the store is dropped.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let storage: Weak<DashMap<String, MemoryEntry>> = Arc::downgrade(&self.storage);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(storage) = storage.upgrade() else {
                    debug!("Token cache dropped, stopping sweeper");
                    break;
                };
                MemoryCacheBackend { storage }.cleanup_expired();
            }
        })
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<u64>, CacheError> {
        let Some(entry) = self.storage.get(key).map(|e| *e.value()) else {
            return Ok(None);
        };

        if entry.is_expired() {
            self.storage.remove(key);
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<(), CacheError> {
        self.storage.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }
}

// ===== Disabled =====

/// Stand-in when no store is configured: every lookup misses.
pub struct NoopCacheBackend;

#[async_trait]
impl CacheBackend for NoopCacheBackend {
    async fn get(&self, _key: &str) -> Result<Option<u64>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: u64, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }
}

// ===== Facade =====

#[derive(Clone)]
pub struct TokenCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl TokenCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopCacheBackend), DEFAULT_TTL)
    }

    /// Build the configured backend. An unreachable redis degrades to the
    /// no-op backend with a warning instead of failing startup.
    pub async fn connect(config: &CacheConfig) -> Self {
        let ttl = Duration::from_secs(config.ttl_seconds);

        match config.backend {
            CacheBackendKind::None => {
                info!("Token cache disabled");
                Self::disabled()
            }
            CacheBackendKind::Memory => {
                info!("Using in-process token cache");
                let memory = MemoryCacheBackend::new();
                let _ = memory.spawn_sweeper(SWEEP_INTERVAL);
                Self::new(Arc::new(memory), ttl)
            }
            CacheBackendKind::Redis => {
                let redis = match RedisCacheBackend::new(config) {
                    Ok(redis) => redis,
                    Err(e) => {
                        warn!("Failed to configure Redis, continuing without cache: {}", e);
                        return Self::disabled();
                    }
                };

                match redis.ping().await {
                    Ok(()) => {
                        info!("Connected to Redis token cache");
                        Self::new(Arc::new(redis), ttl)
                    }
                    Err(e) => {
                        warn!("Failed to connect to Redis, continuing without cache: {}", e);
                        Self::disabled()
                    }
                }
            }
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, key: &str) -> Result<Option<u64>, CacheError> {
        self.backend.get(key).await
    }

    pub async fn set(&self, key: &str, count: u64) -> Result<(), CacheError> {
        self.backend.set(key, count, self.ttl).await
    }

    /// Cached count when available, otherwise computed (and remembered when
    /// the store is healthy). Never fails.
    pub async fn resolve_count(&self, turns: &[Turn]) -> usize {
        let key = derive_key(turns);

        let cacheable = match self.get(&key).await {
            Ok(Some(count)) => {
                debug!(key = %key, count, "Token count cache hit");
                return count as usize;
            }
            Ok(None) => true,
            Err(e) => {
                warn!("Token cache lookup failed: {}", e);
                false
            }
        };

        let count = TokenCounter::count_turns(turns);

        if cacheable {
            if let Err(e) = self.set(&key, count as u64).await {
                warn!("Token cache write failed: {}", e);
            } else {
                debug!(key = %key, count, "Token count cached");
            }
        }

        count
    }

    /// Fire-and-forget accounting; the relay never awaits the handle.
    pub fn spawn_resolve(&self, turns: Vec<Turn>) -> JoinHandle<usize> {
        let cache = self.clone();
        tokio::spawn(async move {
            let count = cache.resolve_count(&turns).await;
            debug!(prompt_tokens = count, messages = turns.len(), "Prompt token count");
            count
        })
    }
}
