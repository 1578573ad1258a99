//! Refresh Jobs - Scheduled Work Units
//!
//! Each job wraps one refresh path of the service. The scheduler owns
//! timing, isolation and bookkeeping; a job only has to do its work and
//! report failure through its `Result`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use super::consensus_resolver::ConsensusResolver;
use super::indicator_calculator::IndicatorCalculator;
use super::refresh_scheduler::{Job, JobContext};
use super::tiered_cache::TieredCache;
use crate::adapters::metrics::HealthState;
use crate::domain::metric::Metric;
use crate::ports::provider::ProviderAdapter;

/// Cache key of the latest network stats.
pub const NETWORK_STATS_KEY: &str = "network:stats";

/// Re-resolves Bitcoin dominance and overwrites the cached value.
pub struct DominanceRefreshJob {
  resolver: Arc<ConsensusResolver>,
  schedule: String,
}

impl DominanceRefreshJob {
  pub fn new(resolver: Arc<ConsensusResolver>, schedule: impl Into<String>) -> Self {
    Self {
      resolver,
      schedule: schedule.into(),
    }
  }
}

#[async_trait]
impl Job for DominanceRefreshJob {
  fn id(&self) -> &str {
    "dominance_refresh"
  }

  fn name(&self) -> &str {
    "BTC dominance consensus refresh"
  }

  fn schedule(&self) -> &str {
    &self.schedule
  }

  async fn execute(&self, _ctx: &JobContext) -> anyhow::Result<()> {
    let result = self.resolver.refresh(&Metric::BtcDominance).await?;
    debug!(value = result.value, confidence = result.confidence, "Dominance refreshed");
    Ok(())
  }
}

/// Re-resolves spot prices for a list of tickers.
pub struct PriceRefreshJob {
  resolver: Arc<ConsensusResolver>,
  symbols: Vec<String>,
  schedule: String,
}

impl PriceRefreshJob {
  pub fn new(resolver: Arc<ConsensusResolver>, symbols: Vec<String>, schedule: impl Into<String>) -> Self {
    Self {
      resolver,
      symbols,
      schedule: schedule.into(),
    }
  }
}

#[async_trait]
impl Job for PriceRefreshJob {
  fn id(&self) -> &str {
    "price_refresh"
  }

  fn name(&self) -> &str {
    "Spot price consensus refresh"
  }

  fn schedule(&self) -> &str {
    &self.schedule
  }

  /// Every ticker is attempted; the run fails if any of them failed.
  async fn execute(&self, ctx: &JobContext) -> anyhow::Result<()> {
    let mut failed = Vec::new();
    for symbol in &self.symbols {
      if ctx.is_cancelled() {
        bail!("cancelled before refreshing {symbol}");
      }
      if let Err(e) = self.resolver.refresh(&Metric::price(symbol.as_str())).await {
        warn!(symbol = %symbol, error = %e, "Price refresh failed");
        failed.push(symbol.as_str());
      }
    }

    if failed.is_empty() {
      Ok(())
    } else {
      Err(anyhow!("price refresh failed for {}", failed.join(", ")))
    }
  }
}

/// Recomputes the valuation indicator.
pub struct IndicatorRefreshJob {
  calculator: Arc<IndicatorCalculator>,
  schedule: String,
}

impl IndicatorRefreshJob {
  pub fn new(calculator: Arc<IndicatorCalculator>, schedule: impl Into<String>) -> Self {
    Self {
      calculator,
      schedule: schedule.into(),
    }
  }
}

#[async_trait]
impl Job for IndicatorRefreshJob {
  fn id(&self) -> &str {
    "indicator_refresh"
  }

  fn name(&self) -> &str {
    "Valuation indicator refresh"
  }

  fn schedule(&self) -> &str {
    &self.schedule
  }

  /// A fallback report still counts as a failed run.
  async fn execute(&self, _ctx: &JobContext) -> anyhow::Result<()> {
    let report = self.calculator.refresh().await;
    if report.is_fallback() {
      let reason = report
        .metadata
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
      bail!("indicator for {} served as fallback: {reason}", report.symbol);
    }
    Ok(())
  }
}

/// Fetches network stats and caches them.
pub struct NetworkStatsRefreshJob {
  provider: Arc<dyn ProviderAdapter>,
  cache: Arc<TieredCache>,
  ttl: Duration,
  timeout: Duration,
  schedule: String,
}

impl NetworkStatsRefreshJob {
  pub fn new(
    provider: Arc<dyn ProviderAdapter>,
    cache: Arc<TieredCache>,
    ttl: Duration,
    timeout: Duration,
    schedule: impl Into<String>,
  ) -> Self {
    Self {
      provider,
      cache,
      ttl,
      timeout,
      schedule: schedule.into(),
    }
  }
}

#[async_trait]
impl Job for NetworkStatsRefreshJob {
  fn id(&self) -> &str {
    "network_stats_refresh"
  }

  fn name(&self) -> &str {
    "Network stats refresh"
  }

  fn schedule(&self) -> &str {
    &self.schedule
  }

  async fn execute(&self, _ctx: &JobContext) -> anyhow::Result<()> {
    let stats = tokio::time::timeout(self.timeout, self.provider.fetch_network_stats())
      .await
      .map_err(|_| anyhow!("{} timed out after {:?}", self.provider.name(), self.timeout))??;

    self
      .cache
      .set(NETWORK_STATS_KEY, &stats, self.ttl)
      .await
      .context("Failed to cache network stats")?;

    debug!(block_height = stats.block_height, "Network stats refreshed");
    Ok(())
  }
}

/// Probes every provider and the primary cache tier.
pub struct ProviderHealthJob {
  providers: Vec<Arc<dyn ProviderAdapter>>,
  cache: Arc<TieredCache>,
  health: Arc<HealthState>,
  timeout: Duration,
  schedule: String,
}

impl ProviderHealthJob {
  pub fn new(
    providers: Vec<Arc<dyn ProviderAdapter>>,
    cache: Arc<TieredCache>,
    health: Arc<HealthState>,
    timeout: Duration,
    schedule: impl Into<String>,
  ) -> Self {
    Self {
      providers,
      cache,
      health,
      timeout,
      schedule: schedule.into(),
    }
  }
}

#[async_trait]
impl Job for ProviderHealthJob {
  fn id(&self) -> &str {
    "provider_health"
  }

  fn name(&self) -> &str {
    "Provider and cache health probe"
  }

  fn schedule(&self) -> &str {
    &self.schedule
  }

  /// Fails when any provider is unhealthy. The primary cache state is
  /// reported to the health server only.
  async fn execute(&self, ctx: &JobContext) -> anyhow::Result<()> {
    let probes = join_all(self.providers.iter().map(|provider| async move {
      let healthy = matches!(
        tokio::time::timeout(self.timeout, provider.health_check()).await,
        Ok(Ok(()))
      );
      (provider.name().to_string(), healthy)
    }));

    let Some(results) = ctx.run_until_cancelled(probes).await else {
      bail!("health probe cancelled");
    };

    let cache_healthy = self.cache.primary_healthy().await;
    self.health.set_primary_cache_healthy(cache_healthy);

    let unhealthy: Vec<&str> = results
      .iter()
      .filter(|(_, healthy)| !healthy)
      .map(|(name, _)| name.as_str())
      .collect();

    info!(
      providers = results.len(),
      unhealthy = unhealthy.len(),
      primary_cache = cache_healthy,
      "Health probe complete"
    );

    if unhealthy.is_empty() {
      Ok(())
    } else {
      Err(anyhow!("unhealthy providers: {}", unhealthy.join(", ")))
    }
  }
}
