//! Cache Tier Adapters
//!
//! Implements the `CacheStore` port twice: a Redis-backed primary tier
//! shared across processes and an in-process fallback tier that keeps
//! the service answering while Redis is away.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;
