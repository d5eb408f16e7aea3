//! Redis-backed cache store

use async_trait::async_trait;
use deadpool_redis::{Config as DeadpoolConfig, Pool, Runtime};
use std::time::Duration;

use super::store::CacheStore;
use crate::config::RedisConfig;
use crate::error::{Error, Result};

/// Create a Redis connection pool, retrying with exponential backoff
///
/// The first attempt is immediate. Attempt `n` waits
/// `retry_delay_secs * 2^(n-1)` before connecting, up to `max_retries` retries.
pub async fn create_pool(config: &RedisConfig) -> Result<Pool> {
    let base_delay = Duration::from_secs(config.retry_delay_secs);
    let mut retries = 0_u32;

    let pool = loop {
        let error = match try_create_pool(config).await {
            Ok(pool) => break pool,
            Err(e) => e,
        };

        if retries >= config.max_retries {
            tracing::error!(
                attempts = retries + 1,
                error = %error,
                "Giving up on Redis cache store"
            );
            return Err(error);
        }

        let delay = base_delay * 2_u32.saturating_pow(retries);
        retries += 1;
        tracing::warn!(
            attempt = retries,
            error = %error,
            delay_secs = delay.as_secs(),
            "Redis cache store unavailable, retrying"
        );
        tokio::time::sleep(delay).await;
    };

    tracing::info!(
        max_connections = config.max_connections,
        attempts = retries + 1,
        "Redis cache store connected"
    );
    Ok(pool)
}

async fn try_create_pool(config: &RedisConfig) -> Result<Pool> {
    let pool = DeadpoolConfig::from_url(&config.url)
        .builder()
        .map_err(|e| Error::Cache(format!("Failed to build Redis pool: {}", e)))?
        .max_size(config.max_connections)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| Error::Cache(format!("Failed to create Redis pool: {}", e)))?;

    let conn = pool
        .get()
        .await
        .map_err(|e| Error::Cache(format!("Failed to get Redis connection: {}", e)))?;
    drop(conn);

    Ok(pool)
}

/// [`CacheStore`] over a deadpool Redis pool
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Wrap an existing pool
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Connect using `[redis]` configuration
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        Ok(Self::new(create_pool(config).await?))
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::Cache(format!("Failed to get Redis connection: {}", e)))
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("status", &self.pool.status())
            .finish()
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        use deadpool_redis::redis::AsyncCommands;

        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        use deadpool_redis::redis::AsyncCommands;

        let mut conn = self.connection().await?;
        match ttl {
            Some(ttl) => {
                conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                    .await?
            }
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        use deadpool_redis::redis::AsyncCommands;

        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_defaults() {
        let config: RedisConfig =
            serde_json::from_value(serde_json::json!({"url": "redis://localhost:6379"}))
                .expect("config");
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay_secs, 2);
    }
}
