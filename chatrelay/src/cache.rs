// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Side-channel completion cache
//
// Completed replies can be written to Redis for other services to pick up.
// The relay never reads them back. Without a configured URL the cache is an
// inert no-op and sessions skip collecting the transcript.

use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

const KEY_PREFIX: &str = "chatrelay:completion:";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to create redis pool: {0}")]
    CreatePool(#[from] deadpool_redis::CreatePoolError),

    #[error("failed to get redis connection: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Where finished completions are recorded.
#[async_trait]
pub trait CompletionCache: Send + Sync {
    /// Whether `store` does anything. Sessions skip transcript collection
    /// when this is `false`.
    fn is_enabled(&self) -> bool {
        true
    }

    async fn store(&self, prompt: &str, completion: &str) -> Result<(), CacheError>;
}

/// Cache used when nothing is configured.
pub struct NoopCache;

#[async_trait]
impl CompletionCache for NoopCache {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn store(&self, _prompt: &str, _completion: &str) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Redis-backed cache with a per-entry TTL.
pub struct RedisCache {
    pool: Pool,
    ttl: Duration,
}

impl RedisCache {
    /// Build the pool. No connection is made until first use.
    pub fn new(url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let pool = PoolConfig::from_url(url).create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool, ttl })
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl CompletionCache for RedisCache {
    async fn store(&self, prompt: &str, completion: &str) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        conn.set_ex::<_, _, ()>(cache_key(prompt), completion, self.ttl.as_secs())
            .await?;
        Ok(())
    }
}

/// Key under which the completion for `prompt` is stored.
pub fn cache_key(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    format!("{KEY_PREFIX}{:x}", hasher.finalize())
}

/// Connect the configured cache, falling back to `NoopCache`.
///
/// A missing URL or an unreachable server is not fatal; the relay runs
/// without the side channel.
pub async fn connect_cache(url: Option<&str>, ttl: Duration) -> Arc<dyn CompletionCache> {
    let Some(url) = url else {
        tracing::info!("REDIS_URL not set, skipping redis connection");
        return Arc::new(NoopCache);
    };

    let cache = match RedisCache::new(url, ttl) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to configure redis, continuing without cache");
            return Arc::new(NoopCache);
        }
    };

    match cache.ping().await {
        Ok(()) => {
            tracing::info!(ttl_secs = ttl.as_secs(), "connected to redis");
            Arc::new(cache)
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to redis, continuing without cache");
            Arc::new(NoopCache)
        }
    }
}
