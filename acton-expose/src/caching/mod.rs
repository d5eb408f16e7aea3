//! ETag caching and the store it writes through

mod etag;
#[cfg(feature = "cache")]
mod redis_store;
mod store;

pub use etag::{cache_key_for, digest, normalise_etag, Cacheable, ETagCache};
#[cfg(feature = "cache")]
pub use redis_store::{create_pool, RedisStore};
pub use store::{CacheStore, MemoryStore};
