//! Redis Cache Tier - Shared Primary Store
//!
//! Wraps a `redis::aio::ConnectionManager`, which reconnects on its
//! own after a dropped connection. Every command runs under a short
//! timeout so a stalled Redis degrades to a fallback read instead of
//! stalling the caller. Keys are namespaced with a configurable prefix
//! and `clear` only touches that namespace.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, instrument};

use crate::error::CacheError;
use crate::ports::cache_store::CacheStore;

const STORE_NAME: &str = "redis";

/// Keys fetched per SCAN round trip during `clear`.
const SCAN_BATCH: usize = 500;

/// Redis-backed primary cache tier.
#[derive(Clone)]
pub struct RedisStore {
  conn: ConnectionManager,
  key_prefix: String,
  op_timeout: Duration,
}

impl RedisStore {
  /// Connect to Redis.
  ///
  /// # Errors
  /// Fails if the URL is invalid or the initial connection cannot be
  /// established within `op_timeout`.
  pub async fn connect(
    url: &str,
    key_prefix: impl Into<String>,
    op_timeout: Duration,
  ) -> Result<Self, CacheError> {
    let client = redis::Client::open(url).map_err(|e| CacheError::store(STORE_NAME, e))?;

    let conn = tokio::time::timeout(op_timeout, ConnectionManager::new(client))
      .await
      .map_err(|_| CacheError::Timeout {
        store: STORE_NAME,
        timeout: op_timeout,
      })?
      .map_err(|e| CacheError::store(STORE_NAME, e))?;

    let store = Self {
      conn,
      key_prefix: key_prefix.into(),
      op_timeout,
    };

    info!(prefix = %store.key_prefix, "Connected to Redis cache");
    Ok(store)
  }

  fn namespaced(&self, key: &str) -> String {
    format!("{}{}", self.key_prefix, key)
  }

  /// Run one Redis command under the operation timeout.
  async fn bounded<T, F>(&self, op: F) -> Result<T, CacheError>
  where
    F: Future<Output = redis::RedisResult<T>>,
  {
    match tokio::time::timeout(self.op_timeout, op).await {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(e)) => Err(CacheError::store(STORE_NAME, e)),
      Err(_) => Err(CacheError::Timeout {
        store: STORE_NAME,
        timeout: self.op_timeout,
      }),
    }
  }
}

#[async_trait]
impl CacheStore for RedisStore {
  fn name(&self) -> &'static str {
    STORE_NAME
  }

  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
    let mut conn = self.conn.clone();
    let key = self.namespaced(key);
    self.bounded(async move { conn.get::<_, Option<Vec<u8>>>(key).await }).await
  }

  async fn set(&self, key: &str, payload: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
    let mut conn = self.conn.clone();
    let key = self.namespaced(key);
    // SETEX rejects a zero expiry.
    let seconds = ttl.as_secs().max(1);
    self
      .bounded(async move { conn.set_ex::<_, _, ()>(key, payload, seconds).await })
      .await
  }

  async fn delete(&self, key: &str) -> Result<(), CacheError> {
    let mut conn = self.conn.clone();
    let key = self.namespaced(key);
    self.bounded(async move { conn.del::<_, ()>(key).await }).await
  }

  async fn exists(&self, key: &str) -> Result<bool, CacheError> {
    let mut conn = self.conn.clone();
    let key = self.namespaced(key);
    self.bounded(async move { conn.exists::<_, bool>(key).await }).await
  }

  #[instrument(skip(self), fields(prefix = %self.key_prefix))]
  async fn clear(&self) -> Result<(), CacheError> {
    let pattern = format!("{}*", self.key_prefix);
    let mut cursor: u64 = 0;
    let mut removed = 0usize;

    loop {
      let mut conn = self.conn.clone();
      let scan_pattern = pattern.clone();
      let (next, keys): (u64, Vec<String>) = self
        .bounded(async move {
          redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(scan_pattern)
            .arg("COUNT")
            .arg(SCAN_BATCH)
            .query_async(&mut conn)
            .await
        })
        .await?;

      if !keys.is_empty() {
        removed += keys.len();
        let mut conn = self.conn.clone();
        self.bounded(async move { conn.del::<_, ()>(keys).await }).await?;
      }

      if next == 0 {
        break;
      }
      cursor = next;
    }

    info!(removed, "Cleared Redis cache namespace");
    Ok(())
  }

  async fn is_healthy(&self) -> bool {
    let mut conn = self.conn.clone();
    let pong: Result<String, CacheError> = self
      .bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
      .await;
    pong.is_ok()
  }
}
