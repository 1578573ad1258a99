//! Provider Port - Upstream Market Data Interface
//!
//! Defines the capability set every upstream data source exposes.
//! Adapters implement only the capabilities their API offers; the rest
//! fall back to `ProviderError::Unsupported`, so the resolver and the
//! calculator never need to know which concrete provider they talk to.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::metric::{MarketSnapshot, MetricReading, NetworkStats};
use crate::error::ProviderError;

/// Trait for upstream market data providers.
///
/// Each adapter owns its transport, parsing and health check. Readings
/// default to a confidence of 1.0; reconciliation happens elsewhere.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + 'static {
  /// Provider name used in source labels and error reports.
  fn name(&self) -> &str;

  /// Fetch spot USD prices keyed by upper-case ticker.
  ///
  /// Tickers the provider does not know are omitted from the map rather
  /// than failing the whole call.
  async fn fetch_price(
    &self,
    symbols: &[String],
  ) -> Result<HashMap<String, MetricReading>, ProviderError> {
    let _ = symbols;
    Err(ProviderError::unsupported(self.name(), "price quotes"))
  }

  /// Fetch Bitcoin dominance in percent.
  async fn fetch_dominance(&self) -> Result<MetricReading, ProviderError> {
    Err(ProviderError::unsupported(self.name(), "dominance"))
  }

  /// Fetch a price / market cap / supply snapshot for one ticker.
  async fn fetch_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, ProviderError> {
    let _ = symbol;
    Err(ProviderError::unsupported(self.name(), "market snapshots"))
  }

  /// Fetch on-chain network statistics.
  async fn fetch_network_stats(&self) -> Result<NetworkStats, ProviderError> {
    Err(ProviderError::unsupported(self.name(), "network stats"))
  }

  /// Cheap reachability probe.
  async fn health_check(&self) -> Result<(), ProviderError>;
}
