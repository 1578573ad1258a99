//! Indicator Calculator - Valuation Score and Risk Classification
//!
//! Pulls a market snapshot through the tiered cache, synthesizes the
//! ratio series, standardizes the newest point and classifies it on
//! the risk ladder. Never fails: an upstream outage yields a clearly
//! flagged low-confidence placeholder instead of an error.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use super::tiered_cache::TieredCache;
use crate::adapters::metrics::MetricsRegistry;
use crate::domain::indicator::{self, HistoricalPoint, DEFAULT_SERIES_LENGTH, NEUTRAL_RATIO};
use crate::domain::metric::MarketSnapshot;
use crate::domain::risk::RiskAssessment;
use crate::error::ProviderError;
use crate::ports::provider::ProviderAdapter;
use crate::ports::repository::{ArchiveRecord, ArchiveRepository, RiskRecord};

/// Full output of one indicator computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorReport {
  /// Asset ticker.
  pub symbol: String,
  /// Z-score of the newest point.
  pub score: f64,
  /// Oldest → newest. Empty for a fallback report.
  pub series: Vec<HistoricalPoint>,
  /// Classification of `score`.
  pub risk: RiskAssessment,
  /// Trust in the report, in [0, 1].
  pub confidence: f64,
  /// Auxiliary data (`source`, `neutralized_ratios`, `fallback`, ...).
  pub metadata: BTreeMap<String, Value>,
  /// Computation time.
  pub computed_at: DateTime<Utc>,
}

impl IndicatorReport {
  /// Whether this report is an outage placeholder.
  pub fn is_fallback(&self) -> bool {
    self
      .metadata
      .get("fallback")
      .and_then(Value::as_bool)
      .unwrap_or(false)
  }

  /// Ratio of the newest point, neutral when the series is empty.
  pub fn latest_ratio(&self) -> f64 {
    self.series.last().map_or(NEUTRAL_RATIO, |p| p.ratio)
  }
}

/// Computes the valuation score for one asset.
pub struct IndicatorCalculator {
  /// Snapshot provider.
  provider: Arc<dyn ProviderAdapter>,
  /// Shared read-through cache.
  cache: Arc<TieredCache>,
  /// Asset ticker.
  symbol: String,
  /// Points in the synthetic series.
  series_length: usize,
  /// Confidence of a computed report.
  confidence: f64,
  /// Confidence of a fallback report.
  fallback_confidence: f64,
  /// Per-call provider timeout.
  provider_timeout: Duration,
  /// TTL of cached snapshots.
  snapshot_ttl: Duration,
  /// Optional result archive.
  archive: Option<Arc<dyn ArchiveRepository>>,
  /// Optional Prometheus metrics.
  metrics: Option<Arc<MetricsRegistry>>,
}

impl IndicatorCalculator {
  /// Create a calculator with default settings.
  pub fn new(provider: Arc<dyn ProviderAdapter>, cache: Arc<TieredCache>, symbol: impl Into<String>) -> Self {
    Self {
      provider,
      cache,
      symbol: symbol.into().to_uppercase(),
      series_length: DEFAULT_SERIES_LENGTH,
      confidence: 0.75,
      fallback_confidence: 0.3,
      provider_timeout: Duration::from_secs(30),
      snapshot_ttl: Duration::from_secs(600),
      archive: None,
      metrics: None,
    }
  }

  #[must_use]
  pub fn with_series_length(mut self, length: usize) -> Self {
    self.series_length = length;
    self
  }

  #[must_use]
  pub fn with_confidence(mut self, confidence: f64, fallback_confidence: f64) -> Self {
    self.confidence = confidence;
    self.fallback_confidence = fallback_confidence;
    self
  }

  #[must_use]
  pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
    self.provider_timeout = timeout;
    self
  }

  #[must_use]
  pub fn with_snapshot_ttl(mut self, ttl: Duration) -> Self {
    self.snapshot_ttl = ttl;
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

  /// Compute a report from a snapshot. Pure and deterministic.
  pub fn calculate(&self, snapshot: &MarketSnapshot, now: DateTime<Utc>) -> IndicatorReport {
    let outcome = indicator::compute(snapshot, now, self.series_length);
    let risk = RiskAssessment::classify(outcome.score);

    let metadata = BTreeMap::from([
      ("fallback".to_string(), json!(false)),
      ("source".to_string(), json!(self.provider.name())),
      ("neutralized_ratios".to_string(), json!(outcome.stats.neutralized)),
      ("samples".to_string(), json!(outcome.stats.samples)),
      ("ratio_mean".to_string(), json!(outcome.stats.mean)),
      ("ratio_std_dev".to_string(), json!(outcome.stats.std_dev)),
      ("snapshot_observed_at".to_string(), json!(snapshot.observed_at)),
    ]);

    IndicatorReport {
      symbol: snapshot.symbol.clone(),
      score: outcome.score,
      series: outcome.series,
      risk,
      confidence: self.confidence,
      metadata,
      computed_at: now,
    }
  }

  /// Fetch the current snapshot and compute a fresh report.
  ///
  /// Falls back to a flagged placeholder when the snapshot cannot be
  /// fetched. The resulting assessment is archived.
  #[instrument(skip(self), fields(symbol = %self.symbol))]
  pub async fn refresh(&self) -> IndicatorReport {
    let now = Utc::now();
    let report = match self.snapshot().await {
      Ok(snapshot) => self.calculate(&snapshot, now),
      Err(e) => {
        warn!(error = %e, "Snapshot unavailable, serving fallback indicator");
        self.fallback_report(&e.to_string(), now)
      }
    };

    info!(
      score = report.score,
      level = %report.risk.level,
      confidence = report.confidence,
      fallback = report.is_fallback(),
      "Indicator computed"
    );

    if let Some(metrics) = &self.metrics {
      if report.is_fallback() {
        metrics.indicator_fallbacks.inc();
      } else {
        metrics.indicator_score.set(report.score);
      }
    }
    self.archive_report(&report).await;
    report
  }

  async fn snapshot(&self) -> Result<MarketSnapshot, ProviderError> {
    let key = format!("snapshot:{}", self.symbol);
    let provider = Arc::clone(&self.provider);
    let symbol = self.symbol.clone();
    let timeout = self.provider_timeout;

    self
      .cache
      .get_or_compute(&key, self.snapshot_ttl, || async move {
        tokio::time::timeout(timeout, provider.fetch_snapshot(&symbol))
          .await
          .map_err(|_| ProviderError::Timeout {
            provider: provider.name().to_string(),
            timeout,
          })?
      })
      .await
  }

  fn fallback_report(&self, reason: &str, now: DateTime<Utc>) -> IndicatorReport {
    let metadata = BTreeMap::from([
      ("fallback".to_string(), json!(true)),
      ("source".to_string(), json!(self.provider.name())),
      ("reason".to_string(), json!(reason)),
      ("neutralized_ratios".to_string(), json!(0)),
    ]);

    IndicatorReport {
      symbol: self.symbol.clone(),
      score: 0.0,
      series: Vec::new(),
      risk: RiskAssessment::classify(0.0),
      confidence: self.fallback_confidence,
      metadata,
      computed_at: now,
    }
  }

  async fn archive_report(&self, report: &IndicatorReport) {
    let Some(archive) = &self.archive else {
      return;
    };
    let record = ArchiveRecord::Risk(RiskRecord {
      symbol: report.symbol.clone(),
      assessment: report.risk.clone(),
      ratio: report.latest_ratio(),
      confidence: report.confidence,
      fallback: report.is_fallback(),
      computed_at: report.computed_at,
    });
    if let Err(e) = archive.store(&record).await {
      warn!(symbol = %report.symbol, error = %e, "Failed to archive risk assessment");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::cache::MemoryStore;
  use crate::domain::risk::RiskLevel;
  use async_trait::async_trait;
  use chrono::TimeZone;

  struct SnapshotProvider {
    snapshot: Option<MarketSnapshot>,
  }

  #[async_trait]
  impl ProviderAdapter for SnapshotProvider {
    fn name(&self) -> &str {
      "coingecko"
    }

    async fn fetch_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, ProviderError> {
      self
        .snapshot
        .clone()
        .ok_or_else(|| ProviderError::malformed("coingecko", format!("no market data for {symbol}")))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
      Ok(())
    }
  }

  fn snapshot() -> MarketSnapshot {
    MarketSnapshot {
      symbol: "BTC".to_string(),
      price: 64_000.0,
      market_cap: 1_260_000_000_000.0,
      circulating_supply: 19_700_000.0,
      observed_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
    }
  }

  fn calculator(snapshot: Option<MarketSnapshot>) -> IndicatorCalculator {
    let cache = Arc::new(TieredCache::new(None, Arc::new(MemoryStore::new())));
    IndicatorCalculator::new(Arc::new(SnapshotProvider { snapshot }), cache, "btc")
  }

  #[test]
  fn test_calculate_is_deterministic() {
    let calc = calculator(None);
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let a = calc.calculate(&snapshot(), now);
    let b = calc.calculate(&snapshot(), now);
    assert_eq!(a, b);
    assert_eq!(a.series.len(), DEFAULT_SERIES_LENGTH);
    assert_eq!(a.risk, RiskAssessment::classify(a.score));
    assert!(!a.is_fallback());
  }

  #[tokio::test]
  async fn test_refresh_uses_snapshot() {
    let report = calculator(Some(snapshot())).refresh().await;
    assert!(!report.is_fallback());
    assert_eq!(report.symbol, "BTC");
    assert_eq!(report.confidence, 0.75);
    assert_eq!(report.metadata["source"], json!("coingecko"));
  }

  #[tokio::test]
  async fn test_outage_yields_flagged_fallback() {
    let report = calculator(None).refresh().await;
    assert!(report.is_fallback());
    assert_eq!(report.score, 0.0);
    assert!(report.series.is_empty());
    assert_eq!(report.confidence, 0.3);
    assert_eq!(report.risk.level, RiskLevel::Low);
    assert!(report.metadata.contains_key("reason"));
  }
}
