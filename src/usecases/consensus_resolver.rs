//! Consensus Resolver - Multi-source Metric Reconciliation
//!
//! For one metric:
//! 1. Calls the primary and every secondary adapter concurrently
//! 2. Waits for all of them (each bounded by the provider timeout)
//! 3. Reconciles the outcomes (average when close, anchor when not)
//! 4. Records the outcome and archives the result
//!
//! Foreground callers use `resolve_cached`; refresh jobs use `refresh`
//! to overwrite the cached value.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{info, instrument, warn};

use super::tiered_cache::TieredCache;
use crate::adapters::metrics::MetricsRegistry;
use crate::domain::consensus::{self, ConsensusParams, DiffMode, SourceOutcome};
use crate::domain::metric::{ConsensusResult, Metric, MetricReading};
use crate::error::{ProviderError, ResolveError};
use crate::ports::provider::ProviderAdapter;
use crate::ports::repository::{ArchiveRecord, ArchiveRepository};

/// Resolves metrics across a primary and several secondary providers.
pub struct ConsensusResolver {
  /// Anchor provider for every metric.
  primary: Arc<dyn ProviderAdapter>,
  /// Secondaries consulted for dominance, in preference order.
  dominance_secondaries: Vec<Arc<dyn ProviderAdapter>>,
  /// Secondaries consulted for prices, in preference order.
  price_secondaries: Vec<Arc<dyn ProviderAdapter>>,
  /// Reconciliation constants for dominance.
  dominance_params: ConsensusParams,
  /// Reconciliation constants for prices.
  price_params: ConsensusParams,
  /// Per-call provider timeout.
  provider_timeout: Duration,
  /// Shared read-through cache.
  cache: Arc<TieredCache>,
  /// TTL of cached results.
  cache_ttl: Duration,
  /// Optional result archive.
  archive: Option<Arc<dyn ArchiveRepository>>,
  /// Optional Prometheus metrics.
  metrics: Option<Arc<MetricsRegistry>>,
}

impl ConsensusResolver {
  /// Create a resolver with default thresholds and no secondaries.
  pub fn new(primary: Arc<dyn ProviderAdapter>, cache: Arc<TieredCache>) -> Self {
    Self {
      primary,
      dominance_secondaries: Vec::new(),
      price_secondaries: Vec::new(),
      dominance_params: ConsensusParams::default(),
      price_params: ConsensusParams {
        threshold: 0.5,
        diff_mode: DiffMode::Relative,
        ..ConsensusParams::default()
      },
      provider_timeout: Duration::from_secs(30),
      cache,
      cache_ttl: Duration::from_secs(300),
      archive: None,
      metrics: None,
    }
  }

  #[must_use]
  pub fn with_dominance_secondaries(mut self, secondaries: Vec<Arc<dyn ProviderAdapter>>) -> Self {
    self.dominance_secondaries = secondaries;
    self
  }

  #[must_use]
  pub fn with_price_secondaries(mut self, secondaries: Vec<Arc<dyn ProviderAdapter>>) -> Self {
    self.price_secondaries = secondaries;
    self
  }

  #[must_use]
  pub fn with_params(mut self, dominance: ConsensusParams, price: ConsensusParams) -> Self {
    self.dominance_params = dominance;
    self.price_params = price;
    self
  }

  #[must_use]
  pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
    self.provider_timeout = timeout;
    self
  }

  #[must_use]
  pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
    self.cache_ttl = ttl;
    self
  }

  #[must_use]
  pub fn with_archive(mut self, archive: Arc<dyn ArchiveRepository>) -> Self {
    self.archive = Some(archive);
    self
  }

  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  fn secondaries_for(&self, metric: &Metric) -> &[Arc<dyn ProviderAdapter>] {
    match metric {
      Metric::BtcDominance => &self.dominance_secondaries,
      Metric::Price { .. } => &self.price_secondaries,
    }
  }

  fn params_for(&self, metric: &Metric) -> &ConsensusParams {
    match metric {
      Metric::BtcDominance => &self.dominance_params,
      Metric::Price { .. } => &self.price_params,
    }
  }

  /// Resolve a metric from the providers, bypassing the cache.
  ///
  /// # Errors
  /// [`ResolveError::AllSourcesFailed`] when no provider produced a
  /// usable reading.
  #[instrument(skip(self), fields(metric = %metric))]
  pub async fn resolve(&self, metric: &Metric) -> Result<ConsensusResult, ResolveError> {
    let secondaries = self.secondaries_for(metric);
    if secondaries.is_empty() {
      warn!("No secondary providers configured, consensus is single-source");
    }

    let (primary, secondaries) = tokio::join!(
      self.fetch(&self.primary, metric),
      join_all(secondaries.iter().map(|adapter| self.fetch(adapter, metric)))
    );

    let label = metric.to_string();
    let result = consensus::reconcile(
      &label,
      &primary,
      &secondaries,
      self.params_for(metric),
      Utc::now(),
    );

    match &result {
      Ok(resolved) => {
        let successes = std::iter::once(&primary)
          .chain(secondaries.iter())
          .filter(|o| o.result.as_ref().is_ok_and(|r| r.value.is_finite()))
          .count();
        let outcome = outcome_label(resolved, successes);
        info!(
          value = resolved.value,
          source = %resolved.source,
          confidence = resolved.confidence,
          outcome,
          "Metric resolved"
        );

        if let Some(metrics) = &self.metrics {
          metrics.resolutions.with_label_values(&[label.as_str(), outcome]).inc();
          metrics
            .consensus_confidence
            .with_label_values(&[label.as_str()])
            .set(resolved.confidence);
        }
        self.archive_result(metric, resolved).await;
      }
      Err(e) => {
        warn!(error = %e, "Metric resolution failed");
        if let Some(metrics) = &self.metrics {
          metrics.resolutions.with_label_values(&[label.as_str(), "failed"]).inc();
        }
      }
    }

    result
  }

  /// Resolve through the tiered cache.
  ///
  /// # Errors
  /// Same as [`Self::resolve`] on a cache miss. Failures are not cached.
  pub async fn resolve_cached(&self, metric: &Metric) -> Result<ConsensusResult, ResolveError> {
    self
      .cache
      .get_or_compute(&metric.cache_key(), self.cache_ttl, || self.resolve(metric))
      .await
  }

  /// Force a fresh resolution and overwrite the cached value.
  ///
  /// # Errors
  /// Same as [`Self::resolve`]; the previous cached value is kept.
  pub async fn refresh(&self, metric: &Metric) -> Result<ConsensusResult, ResolveError> {
    let resolved = self.resolve(metric).await?;
    if let Err(e) = self.cache.set(&metric.cache_key(), &resolved, self.cache_ttl).await {
      warn!(metric = %metric, error = %e, "Failed to cache refreshed value");
    }
    Ok(resolved)
  }

  /// Call one adapter for one metric under the provider timeout.
  async fn fetch(&self, adapter: &Arc<dyn ProviderAdapter>, metric: &Metric) -> SourceOutcome {
    let name = adapter.name().to_string();
    let call = async {
      match metric {
        Metric::BtcDominance => adapter.fetch_dominance().await,
        Metric::Price { symbol } => quote_for(adapter.as_ref(), symbol).await,
      }
    };

    match tokio::time::timeout(self.provider_timeout, call).await {
      Ok(Ok(reading)) => SourceOutcome::ok(MetricReading {
        source: name,
        ..reading
      }),
      Ok(Err(e)) => SourceOutcome::failed(name, reason(&e)),
      Err(_) => {
        let e = ProviderError::Timeout {
          provider: name.clone(),
          timeout: self.provider_timeout,
        };
        SourceOutcome::failed(name, reason(&e))
      }
    }
  }

  async fn archive_result(&self, metric: &Metric, result: &ConsensusResult) {
    let Some(archive) = &self.archive else {
      return;
    };
    let record = ArchiveRecord::Consensus {
      metric: metric.clone(),
      result: result.clone(),
    };
    if let Err(e) = archive.store(&record).await {
      warn!(metric = %metric, error = %e, "Failed to archive consensus result");
    }
  }
}

async fn quote_for(adapter: &dyn ProviderAdapter, symbol: &str) -> Result<MetricReading, ProviderError> {
  let mut quotes = adapter.fetch_price(&[symbol.to_string()]).await?;
  quotes
    .remove(symbol)
    .ok_or_else(|| ProviderError::malformed(adapter.name(), format!("no quote for {symbol}")))
}

/// Failure reason without the provider name, which the outcome carries.
fn reason(error: &ProviderError) -> String {
  match error {
    ProviderError::Request { message, .. } => format!("request failed: {message}"),
    ProviderError::Status { status, .. } => format!("HTTP {status}"),
    ProviderError::Timeout { timeout, .. } => format!("timed out after {timeout:?}"),
    ProviderError::Malformed { message, .. } => format!("malformed response: {message}"),
    ProviderError::Unsupported { capability, .. } => format!("does not support {capability}"),
  }
}

fn outcome_label(result: &ConsensusResult, successes: usize) -> &'static str {
  if successes <= 1 {
    "single"
  } else if result.source.ends_with("(averaged)") {
    "agreed"
  } else {
    "disagreed"
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::cache::MemoryStore;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Dominance-only adapter with a fixed answer.
  struct FixedDominance {
    name: &'static str,
    value: Option<f64>,
    delay: Duration,
    calls: AtomicUsize,
  }

  impl FixedDominance {
    fn new(name: &'static str, value: Option<f64>) -> Arc<Self> {
      Arc::new(Self {
        name,
        value,
        delay: Duration::ZERO,
        calls: AtomicUsize::new(0),
      })
    }
  }

  #[async_trait]
  impl ProviderAdapter for FixedDominance {
    fn name(&self) -> &str {
      self.name
    }

    async fn fetch_dominance(&self) -> Result<MetricReading, ProviderError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      tokio::time::sleep(self.delay).await;
      match self.value {
        Some(v) => Ok(MetricReading::new(v, self.name)),
        None => Err(ProviderError::Status {
          provider: self.name.to_string(),
          status: 503,
        }),
      }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
      Ok(())
    }
  }

  fn cache() -> Arc<TieredCache> {
    Arc::new(TieredCache::new(None, Arc::new(MemoryStore::new())))
  }

  fn resolver(primary: Arc<FixedDominance>, secondaries: Vec<Arc<FixedDominance>>) -> ConsensusResolver {
    let secondaries = secondaries
      .into_iter()
      .map(|s| s as Arc<dyn ProviderAdapter>)
      .collect();
    ConsensusResolver::new(primary, cache()).with_dominance_secondaries(secondaries)
  }

  #[tokio::test]
  async fn test_close_readings_averaged() {
    let r = resolver(
      FixedDominance::new("coingecko", Some(60.0)),
      vec![FixedDominance::new("coinmarketcap", Some(61.5))],
    );
    let result = r.resolve(&Metric::BtcDominance).await.unwrap();
    assert!((result.value - 60.75).abs() < 1e-9);
    assert_eq!(result.source, "coingecko + coinmarketcap (averaged)");
    assert_eq!(result.confidence, 0.95);
  }

  #[tokio::test]
  async fn test_far_readings_keep_primary() {
    let r = resolver(
      FixedDominance::new("coingecko", Some(60.0)),
      vec![FixedDominance::new("coinmarketcap", Some(70.0))],
    );
    let result = r.resolve(&Metric::BtcDominance).await.unwrap();
    assert_eq!(result.value, 60.0);
    assert_eq!(result.source, "coingecko");
    assert_eq!(result.confidence, 0.8);
  }

  #[tokio::test]
  async fn test_all_failed_names_every_provider() {
    let r = resolver(
      FixedDominance::new("coingecko", None),
      vec![FixedDominance::new("coinmarketcap", None)],
    );
    let err = r.resolve(&Metric::BtcDominance).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("coingecko: HTTP 503"));
    assert!(message.contains("coinmarketcap: HTTP 503"));
  }

  #[tokio::test]
  async fn test_unsupported_price_is_a_failure_not_a_value() {
    let r = resolver(FixedDominance::new("coingecko", Some(60.0)), vec![]);
    let err = r.resolve(&Metric::price("BTC")).await.unwrap_err();
    assert!(err.to_string().contains("does not support price quotes"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_slow_secondary_times_out() {
    let slow = Arc::new(FixedDominance {
      name: "coinmarketcap",
      value: Some(61.0),
      delay: Duration::from_secs(60),
      calls: AtomicUsize::new(0),
    });
    let r = resolver(FixedDominance::new("coingecko", Some(60.0)), vec![slow])
      .with_provider_timeout(Duration::from_secs(5));

    let result = r.resolve(&Metric::BtcDominance).await.unwrap();
    assert_eq!(result.source, "coingecko");
    assert_eq!(result.confidence, 0.9);
  }

  #[tokio::test]
  async fn test_repeated_resolution_keeps_zero_delta() {
    let primary = FixedDominance::new("coingecko", Some(60.0));
    let r = resolver(Arc::clone(&primary), vec![]);
    r.resolve(&Metric::BtcDominance).await.unwrap();

    let second = r.resolve(&Metric::BtcDominance).await.unwrap();
    assert_eq!(second.change_24h, 0.0);
    assert_eq!(second.change_percent_24h, 0.0);
    assert_eq!(second.previous_value, 60.0);
  }

  #[tokio::test]
  async fn test_non_finite_secondary_counts_as_single_source() {
    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let r = resolver(
      FixedDominance::new("coingecko", Some(60.0)),
      vec![FixedDominance::new("coinmarketcap", Some(f64::NAN))],
    )
    .with_metrics(Arc::clone(&metrics));

    let result = r.resolve(&Metric::BtcDominance).await.unwrap();
    assert_eq!(result.value, 60.0);

    let label = Metric::BtcDominance.to_string();
    let single = metrics.resolutions.with_label_values(&[label.as_str(), "single"]).get();
    let disagreed = metrics.resolutions.with_label_values(&[label.as_str(), "disagreed"]).get();
    assert_eq!(single, 1);
    assert_eq!(disagreed, 0);
  }

  #[tokio::test]
  async fn test_resolve_cached_hits_providers_once() {
    let primary = FixedDominance::new("coingecko", Some(60.0));
    let r = resolver(Arc::clone(&primary), vec![]);

    r.resolve_cached(&Metric::BtcDominance).await.unwrap();
    r.resolve_cached(&Metric::BtcDominance).await.unwrap();
    assert_eq!(primary.calls.load(Ordering::SeqCst), 1);

    r.refresh(&Metric::BtcDominance).await.unwrap();
    assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
  }
}
