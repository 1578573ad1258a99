//! Tiered Cache - Read-through Primary + Fallback Cache
//!
//! Reads try the primary tier (Redis) first, then the in-process
//! fallback tier, then compute. Computed values are written to both.
//! Primary failures are logged and counted, never surfaced: the
//! fallback keeps the service answering while Redis is away.
//!
//! No singleflight: concurrent misses on one key may each compute,
//! and the last writer wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::adapters::cache::MemoryStore;
use crate::adapters::metrics::MetricsRegistry;
use crate::error::CacheError;
use crate::ports::cache_store::CacheStore;

/// Two-tier read-through cache over serialized values.
pub struct TieredCache {
  /// Preferred shared tier. `None` runs on the fallback alone.
  primary: Option<Arc<dyn CacheStore>>,
  /// Always-present in-process tier.
  fallback: Arc<MemoryStore>,
  /// Optional hit/miss counters.
  metrics: Option<Arc<MetricsRegistry>>,
}

impl TieredCache {
  /// Create a cache over an optional primary and the in-process tier.
  pub fn new(primary: Option<Arc<dyn CacheStore>>, fallback: Arc<MemoryStore>) -> Self {
    Self {
      primary,
      fallback,
      metrics: None,
    }
  }

  /// Attach Prometheus counters.
  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  /// Probe the primary tier. `false` when none is configured.
  pub async fn primary_healthy(&self) -> bool {
    match &self.primary {
      Some(primary) => primary.is_healthy().await,
      None => false,
    }
  }

  /// Return the cached value for `key`, or compute, cache and return it.
  ///
  /// Errors from `compute` propagate unchanged and are never cached.
  /// Cache failures never surface here.
  pub async fn get_or_compute<T, E, F, Fut>(&self, key: &str, ttl: Duration, compute: F) -> Result<T, E>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    if let Some(value) = self.lookup(key).await {
      return Ok(value);
    }

    self.record_miss();
    debug!(key, "Cache miss, computing");
    let value = compute().await?;

    if let Err(e) = self.write(key, &value, ttl).await {
      warn!(key, error = %e, "Failed to cache computed value");
    }
    Ok(value)
  }

  /// Read a value from the first tier that holds it.
  ///
  /// # Errors
  /// [`CacheError::NotFound`] when neither tier holds the key.
  pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, CacheError> {
    self.lookup(key).await.ok_or_else(|| CacheError::NotFound {
      key: key.to_string(),
    })
  }

  /// Write a value to both tiers.
  ///
  /// # Errors
  /// Only serialization failures surface; a primary write failure is
  /// logged and the fallback still receives the value.
  pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
    self.write(key, value, ttl).await
  }

  /// Remove a key from both tiers.
  pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
    if let Some(primary) = &self.primary {
      if let Err(e) = primary.delete(key).await {
        self.primary_failed("delete", key, &e);
      }
    }
    self.fallback.delete(key).await
  }

  /// Whether either tier holds an unexpired value for `key`.
  pub async fn exists(&self, key: &str) -> bool {
    if let Some(primary) = &self.primary {
      match primary.exists(key).await {
        Ok(true) => return true,
        Ok(false) => {}
        Err(e) => self.primary_failed("exists", key, &e),
      }
    }
    self.fallback.exists(key).await.unwrap_or(false)
  }

  /// Remove every key from both tiers.
  pub async fn clear(&self) -> Result<(), CacheError> {
    if let Some(primary) = &self.primary {
      if let Err(e) = primary.clear().await {
        self.primary_failed("clear", "*", &e);
      }
    }
    self.fallback.clear().await
  }

  /// Try primary then fallback. Undecodable payloads count as misses.
  async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    if let Some(primary) = &self.primary {
      match primary.get(key).await {
        Ok(Some(payload)) => {
          if let Some(value) = decode(primary.name(), key, &payload) {
            self.record_hit(primary.name());
            return Some(value);
          }
        }
        Ok(None) => {}
        Err(e) => self.primary_failed("get", key, &e),
      }
    }

    match self.fallback.get(key).await {
      Ok(Some(payload)) => {
        let value = decode(self.fallback.name(), key, &payload)?;
        self.record_hit(self.fallback.name());
        Some(value)
      }
      Ok(None) => None,
      Err(e) => {
        warn!(key, error = %e, "Fallback cache read failed");
        None
      }
    }
  }

  async fn write<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError> {
    let payload = serde_json::to_vec(value)?;

    if let Some(primary) = &self.primary {
      if let Err(e) = primary.set(key, payload.clone(), ttl).await {
        self.primary_failed("set", key, &e);
      }
    }
    self.fallback.set(key, payload, ttl).await
  }

  fn primary_failed(&self, operation: &str, key: &str, error: &CacheError) {
    warn!(operation, key, error = %error, "Primary cache unavailable, using fallback");
    if let Some(metrics) = &self.metrics {
      metrics.cache_primary_errors.with_label_values(&[operation]).inc();
    }
  }

  fn record_hit(&self, tier: &str) {
    if let Some(metrics) = &self.metrics {
      metrics.cache_hits.with_label_values(&[tier]).inc();
    }
  }

  fn record_miss(&self) {
    if let Some(metrics) = &self.metrics {
      metrics.cache_misses.inc();
    }
  }
}

fn decode<T: DeserializeOwned>(tier: &str, key: &str, payload: &[u8]) -> Option<T> {
  match serde_json::from_slice(payload) {
    Ok(value) => Some(value),
    Err(e) => {
      warn!(tier, key, error = %e, "Discarding undecodable cache payload");
      None
    }
  }
}
