//! ETag derivation backed by a cache store
//!
//! An object's ETag is `"<cache key>:<digest>"`. The digest is computed once
//! and stored; later requests reuse the stored value until the entry is
//! removed, typically when the object changes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::store::CacheStore;
use crate::config::CachingConfig;
use crate::error::Result;

/// Capability for values that can carry an ETag
pub trait Cacheable: Send + Sync {
    /// Type name used in cache keys
    fn type_name(&self) -> &str;

    /// Stable identifier used in cache keys
    fn identity(&self) -> String;

    /// Object-specific cache key, overriding the derived one
    fn object_cache_key(&self) -> Option<String> {
        None
    }

    /// Whether the object has not been persisted yet
    fn is_new(&self) -> bool {
        false
    }

    /// Content version the digest is computed over
    fn cache_key(&self) -> Option<String> {
        None
    }

    /// Default textual representation, digested when there is no `cache_key`
    fn inspect(&self) -> String {
        format!("#<{} {}>", self.type_name(), self.identity())
    }
}

/// Derive the store key for an object
///
/// Uses the object's own key when it has one, `<Type>/new` for new objects
/// and `<Type>/<identity>` otherwise.
pub fn cache_key_for(object: &dyn Cacheable) -> String {
    if let Some(key) = object.object_cache_key() {
        return key;
    }
    if object.is_new() {
        return format!("{}/new", object.type_name());
    }
    format!("{}/{}", object.type_name(), object.identity())
}

/// Content digest of an object (BLAKE3, hex)
pub fn digest(object: &dyn Cacheable) -> String {
    let content = object.cache_key().unwrap_or_else(|| object.inspect());
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Wrap a value in double quotes for use as an HTTP entity tag
pub fn normalise_etag(value: impl fmt::Display) -> String {
    format!("\"{}\"", value)
}

/// Stores and serves ETag digests
#[derive(Clone)]
pub struct ETagCache {
    store: Arc<dyn CacheStore>,
    key_prefix: String,
    ttl: Option<Duration>,
}

impl ETagCache {
    /// Create a cache over a store
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            key_prefix: String::new(),
            ttl: None,
        }
    }

    /// Create a cache using the configured key prefix
    pub fn from_config(store: Arc<dyn CacheStore>, config: &CachingConfig) -> Self {
        Self::new(store).with_key_prefix(config.key_prefix.clone())
    }

    /// Prefix every store key
    #[must_use]
    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    /// Expire stored digests
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn store_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Compute and store the digest for an object
    ///
    /// Stores under `key` when given, the derived cache key otherwise.
    /// Returns the digest.
    pub async fn record(&self, object: &dyn Cacheable, key: Option<&str>) -> Result<String> {
        let key = match key {
            Some(key) => key.to_string(),
            None => cache_key_for(object),
        };
        let digest = digest(object);
        self.store
            .set(&self.store_key(&key), digest.clone().into_bytes(), self.ttl)
            .await?;
        tracing::debug!(key = %key, "Recorded etag digest");
        Ok(digest)
    }

    /// The object's ETag, recording a digest when none is stored
    pub async fn etag_for(&self, object: &dyn Cacheable) -> Result<String> {
        let key = cache_key_for(object);
        let stored = self.store.get(&self.store_key(&key)).await?;
        let digest = match stored {
            Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            None => self.record(object, Some(&key)).await?,
        };
        Ok(format!("{}:{}", key, digest))
    }

    /// Forget the object's digest; a missing entry is not an error
    pub async fn remove(&self, object: &dyn Cacheable) -> Result<()> {
        let key = cache_key_for(object);
        self.store.delete(&self.store_key(&key)).await?;
        tracing::debug!(key = %key, "Removed etag digest");
        Ok(())
    }
}

impl fmt::Debug for ETagCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ETagCache")
            .field("key_prefix", &self.key_prefix)
            .field("ttl", &self.ttl)
            .finish()
    }
}
