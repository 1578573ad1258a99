//! Cache Store Port - Byte-level Key/Value Tier Interface
//!
//! A cache tier stores opaque payloads with a TTL. The tiered cache
//! serializes typed values into these payloads; no tier ever inspects
//! them. The primary tier is a separate network service (Redis) with its
//! own concurrency guarantees.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheError;

/// Trait for a single cache tier.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
  /// Tier name for logs and metrics.
  fn name(&self) -> &'static str;

  /// Read a payload. `Ok(None)` is a miss (absent or expired).
  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

  /// Write a payload expiring after `ttl`.
  async fn set(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

  /// Remove a key. Removing an absent key is not an error.
  async fn delete(&self, key: &str) -> Result<(), CacheError>;

  /// Whether an unexpired key exists.
  async fn exists(&self, key: &str) -> Result<bool, CacheError>;

  /// Remove every key owned by this service.
  async fn clear(&self) -> Result<(), CacheError>;

  /// Check if the tier is reachable.
  async fn is_healthy(&self) -> bool;
}
