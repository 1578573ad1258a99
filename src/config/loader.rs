//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;
use crate::domain::schedule::Schedule;

/// Upper bound on `indicator.series_length` (ten years of daily points).
const MAX_SERIES_LENGTH: usize = 3650;

/// Load and validate configuration from a TOML file.
///
/// # Arguments
/// * `path` - Path to the config.toml file
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    service = %config.service.name,
    redis = config.cache.redis_url.is_some(),
    dominance_threshold = config.consensus.dominance_threshold,
    series_length = config.indicator.series_length,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
///
/// # Errors
/// Returns an error if parsing fails or validation rules are violated.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content)
    .with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Confidence constants inside [0, 1]
/// - Positive thresholds, TTLs and timeouts
/// - Well-formed job schedules (rejected here, not at first fire)
/// - Non-empty provider URLs
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.service.name.trim().is_empty(),
    "service.name must not be empty"
  );

  // Consensus validation
  let consensus = &config.consensus;
  anyhow::ensure!(
    consensus.dominance_threshold > 0.0,
    "consensus.dominance_threshold must be positive, got {}",
    consensus.dominance_threshold
  );
  anyhow::ensure!(
    consensus.price_threshold_pct > 0.0,
    "consensus.price_threshold_pct must be positive, got {}",
    consensus.price_threshold_pct
  );
  for (name, value) in [
    ("agreement_confidence", consensus.agreement_confidence),
    ("disagreement_confidence", consensus.disagreement_confidence),
    ("primary_only_confidence", consensus.primary_only_confidence),
    ("secondary_only_confidence", consensus.secondary_only_confidence),
  ] {
    anyhow::ensure!(
      (0.0..=1.0).contains(&value),
      "consensus.{name} must be in [0, 1], got {value}"
    );
  }

  // Indicator validation
  anyhow::ensure!(
    (2..=MAX_SERIES_LENGTH).contains(&config.indicator.series_length),
    "indicator.series_length must be between 2 and {MAX_SERIES_LENGTH}, got {}",
    config.indicator.series_length
  );
  anyhow::ensure!(
    (0.0..=1.0).contains(&config.indicator.fallback_confidence)
      && (0.0..=1.0).contains(&config.indicator.confidence),
    "indicator confidences must be in [0, 1]"
  );
  anyhow::ensure!(
    config.indicator.fallback_confidence < config.indicator.confidence,
    "indicator.fallback_confidence must be below indicator.confidence"
  );

  // Cache validation
  anyhow::ensure!(
    config.cache.operation_timeout_ms > 0,
    "cache.operation_timeout_ms must be positive"
  );
  anyhow::ensure!(
    config.cache.sweep_interval_seconds > 0,
    "cache.sweep_interval_seconds must be positive"
  );
  anyhow::ensure!(
    config.cache.consensus_ttl_seconds > 0 && config.cache.snapshot_ttl_seconds > 0,
    "cache TTLs must be positive"
  );

  // Provider validation
  anyhow::ensure!(
    config.providers.timeout_seconds > 0,
    "providers.timeout_seconds must be positive"
  );
  anyhow::ensure!(
    !config.providers.coingecko.base_url.is_empty(),
    "CoinGecko base URL must not be empty"
  );
  anyhow::ensure!(
    config
      .providers
      .coingecko
      .coin_ids
      .keys()
      .any(|symbol| symbol.eq_ignore_ascii_case(&config.indicator.symbol)),
    "indicator.symbol '{}' has no CoinGecko coin id",
    config.indicator.symbol
  );
  if config.providers.scraper.enabled {
    regex::Regex::new(&config.providers.scraper.pattern)
      .context("providers.scraper.pattern is not a valid regex")?;
  }

  // Scheduler validation
  anyhow::ensure!(
    config.scheduler.history_size > 0,
    "scheduler.history_size must be positive"
  );
  for (name, expr) in [
    ("dominance_schedule", &config.scheduler.dominance_schedule),
    ("price_schedule", &config.scheduler.price_schedule),
    ("indicator_schedule", &config.scheduler.indicator_schedule),
    ("network_stats_schedule", &config.scheduler.network_stats_schedule),
    ("health_schedule", &config.scheduler.health_schedule),
  ] {
    Schedule::parse(expr).with_context(|| format!("scheduler.{name} is invalid"))?;
  }

  Ok(())
}
