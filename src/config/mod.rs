//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Secrets (provider API keys) are read from environment variables
//! named in the config, never stored in the file itself.
//! Consensus thresholds and confidence constants are externalized
//! here - nothing is hardcoded in the resolver.

pub mod loader;

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::consensus::{ConsensusParams, DiffMode};

/// Top-level service configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any component is constructed.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  pub service: ServiceConfig,
  /// Tiered cache settings.
  #[serde(default)]
  pub cache: CacheConfig,
  /// Consensus reconciliation constants.
  #[serde(default)]
  pub consensus: ConsensusConfig,
  /// Indicator calculator settings.
  #[serde(default)]
  pub indicator: IndicatorConfig,
  /// Upstream provider endpoints.
  #[serde(default)]
  pub providers: ProvidersConfig,
  /// Refresh job schedules.
  #[serde(default)]
  pub scheduler: SchedulerConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Archive configuration.
  #[serde(default)]
  pub persistence: PersistenceConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Tiered cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Redis URL for the primary tier. Unset = in-process tier only.
  pub redis_url: Option<String>,
  /// Prefix for every key written to the primary tier.
  #[serde(default = "default_key_prefix")]
  pub key_prefix: String,
  /// Timeout for a single primary-tier operation (milliseconds).
  #[serde(default = "default_cache_op_timeout")]
  pub operation_timeout_ms: u64,
  /// In-process tier sweep interval (seconds).
  #[serde(default = "default_sweep_interval")]
  pub sweep_interval_seconds: u64,
  /// TTL for resolved consensus values (seconds).
  #[serde(default = "default_consensus_ttl")]
  pub consensus_ttl_seconds: u64,
  /// TTL for market snapshots (seconds).
  #[serde(default = "default_snapshot_ttl")]
  pub snapshot_ttl_seconds: u64,
  /// TTL for network stats (seconds).
  #[serde(default = "default_network_ttl")]
  pub network_stats_ttl_seconds: u64,
}

/// Consensus reconciliation constants.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusConfig {
  /// Dominance agreement threshold in percentage points.
  #[serde(default = "default_dominance_threshold")]
  pub dominance_threshold: f64,
  /// Price agreement threshold in percent of the anchor price.
  #[serde(default = "default_price_threshold_pct")]
  pub price_threshold_pct: f64,
  /// Confidence when sources agree (averaged).
  #[serde(default = "default_agreement_confidence")]
  pub agreement_confidence: f64,
  /// Confidence when sources disagree (primary wins).
  #[serde(default = "default_disagreement_confidence")]
  pub disagreement_confidence: f64,
  /// Confidence when only the primary answered.
  #[serde(default = "default_primary_only_confidence")]
  pub primary_only_confidence: f64,
  /// Confidence when only a secondary answered.
  #[serde(default = "default_secondary_only_confidence")]
  pub secondary_only_confidence: f64,
  /// Tickers refreshed by the price job.
  #[serde(default = "default_symbols")]
  pub price_symbols: Vec<String>,
}

/// Indicator calculator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorConfig {
  /// Asset ticker the score is computed for.
  #[serde(default = "default_indicator_symbol")]
  pub symbol: String,
  /// Number of daily points in the synthetic series.
  #[serde(default = "default_series_length")]
  pub series_length: usize,
  /// Confidence of a successful computation.
  #[serde(default = "default_indicator_confidence")]
  pub confidence: f64,
  /// Confidence of a flagged outage placeholder.
  #[serde(default = "default_fallback_confidence")]
  pub fallback_confidence: f64,
}

/// Upstream provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
  /// Per-call timeout for every provider (seconds).
  #[serde(default = "default_timeout")]
  pub timeout_seconds: u64,
  /// Retries on transient errors.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff, milliseconds).
  #[serde(default = "default_retry_delay")]
  pub retry_base_delay_ms: u64,
  /// CoinGecko (primary).
  #[serde(default)]
  pub coingecko: CoinGeckoConfig,
  /// CoinMarketCap (secondary).
  #[serde(default)]
  pub coinmarketcap: CoinMarketCapConfig,
  /// Blockchain.com stats (secondary price + network stats).
  #[serde(default)]
  pub blockchain: BlockchainConfig,
  /// Page scraper (last-resort dominance source).
  #[serde(default)]
  pub scraper: ScraperConfig,
}

/// CoinGecko endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinGeckoConfig {
  #[serde(default = "default_coingecko_url")]
  pub base_url: String,
  /// Env var holding an optional demo/pro API key.
  #[serde(default = "default_coingecko_key_env")]
  pub api_key_env: String,
  #[serde(default = "default_coingecko_rpm")]
  pub requests_per_minute: u32,
  /// Ticker → CoinGecko coin id.
  #[serde(default = "default_coingecko_ids")]
  pub coin_ids: HashMap<String, String>,
}

/// CoinMarketCap endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinMarketCapConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default = "default_cmc_url")]
  pub base_url: String,
  /// Env var holding the API key.
  #[serde(default = "default_cmc_key_env")]
  pub api_key_env: String,
  #[serde(default = "default_cmc_rpm")]
  pub requests_per_minute: u32,
}

/// Blockchain.com endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockchainConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default = "default_blockchain_url")]
  pub base_url: String,
  #[serde(default = "default_blockchain_rpm")]
  pub requests_per_minute: u32,
}

/// Page scraper configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
  /// Disabled unless explicitly turned on.
  #[serde(default)]
  pub enabled: bool,
  /// Page containing the dominance figure.
  #[serde(default = "default_scraper_url")]
  pub url: String,
  /// Regex with one capture group for the numeric value.
  #[serde(default = "default_scraper_pattern")]
  pub pattern: String,
  #[serde(default = "default_scraper_rpm")]
  pub requests_per_minute: u32,
}

/// Refresh scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
  /// Execution records kept per job.
  #[serde(default = "default_history_size")]
  pub history_size: usize,
  /// Dominance consensus refresh.
  #[serde(default = "default_dominance_schedule")]
  pub dominance_schedule: String,
  /// Price consensus refresh.
  #[serde(default = "default_price_schedule")]
  pub price_schedule: String,
  /// Indicator recomputation.
  #[serde(default = "default_indicator_schedule")]
  pub indicator_schedule: String,
  /// Network stats refresh.
  #[serde(default = "default_network_schedule")]
  pub network_stats_schedule: String,
  /// Provider health probes.
  #[serde(default = "default_health_schedule")]
  pub health_schedule: String,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

/// Archive configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Archive consensus results and risk assessments.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Directory for JSONL archive files.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
}

impl ConsensusConfig {
  /// Reconciliation parameters for dominance-style metrics.
  pub fn dominance_params(&self) -> ConsensusParams {
    self.params(self.dominance_threshold, DiffMode::Absolute)
  }

  /// Reconciliation parameters for prices.
  pub fn price_params(&self) -> ConsensusParams {
    self.params(self.price_threshold_pct, DiffMode::Relative)
  }

  fn params(&self, threshold: f64, diff_mode: DiffMode) -> ConsensusParams {
    ConsensusParams {
      threshold,
      diff_mode,
      agreement_confidence: self.agreement_confidence,
      disagreement_confidence: self.disagreement_confidence,
      primary_only_confidence: self.primary_only_confidence,
      secondary_only_confidence: self.secondary_only_confidence,
    }
  }
}

impl CacheConfig {
  pub fn operation_timeout(&self) -> Duration {
    Duration::from_millis(self.operation_timeout_ms)
  }

  pub fn consensus_ttl(&self) -> Duration {
    Duration::from_secs(self.consensus_ttl_seconds)
  }

  pub fn snapshot_ttl(&self) -> Duration {
    Duration::from_secs(self.snapshot_ttl_seconds)
  }

  pub fn network_stats_ttl(&self) -> Duration {
    Duration::from_secs(self.network_stats_ttl_seconds)
  }
}

impl ProvidersConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_seconds)
  }
}

// Defaults for whole sections when they are omitted from the file

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      redis_url: None,
      key_prefix: default_key_prefix(),
      operation_timeout_ms: default_cache_op_timeout(),
      sweep_interval_seconds: default_sweep_interval(),
      consensus_ttl_seconds: default_consensus_ttl(),
      snapshot_ttl_seconds: default_snapshot_ttl(),
      network_stats_ttl_seconds: default_network_ttl(),
    }
  }
}

impl Default for ConsensusConfig {
  fn default() -> Self {
    Self {
      dominance_threshold: default_dominance_threshold(),
      price_threshold_pct: default_price_threshold_pct(),
      agreement_confidence: default_agreement_confidence(),
      disagreement_confidence: default_disagreement_confidence(),
      primary_only_confidence: default_primary_only_confidence(),
      secondary_only_confidence: default_secondary_only_confidence(),
      price_symbols: default_symbols(),
    }
  }
}

impl Default for IndicatorConfig {
  fn default() -> Self {
    Self {
      symbol: default_indicator_symbol(),
      series_length: default_series_length(),
      confidence: default_indicator_confidence(),
      fallback_confidence: default_fallback_confidence(),
    }
  }
}

impl Default for ProvidersConfig {
  fn default() -> Self {
    Self {
      timeout_seconds: default_timeout(),
      max_retries: default_max_retries(),
      retry_base_delay_ms: default_retry_delay(),
      coingecko: CoinGeckoConfig::default(),
      coinmarketcap: CoinMarketCapConfig::default(),
      blockchain: BlockchainConfig::default(),
      scraper: ScraperConfig::default(),
    }
  }
}

impl Default for CoinGeckoConfig {
  fn default() -> Self {
    Self {
      base_url: default_coingecko_url(),
      api_key_env: default_coingecko_key_env(),
      requests_per_minute: default_coingecko_rpm(),
      coin_ids: default_coingecko_ids(),
    }
  }
}

impl Default for CoinMarketCapConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      base_url: default_cmc_url(),
      api_key_env: default_cmc_key_env(),
      requests_per_minute: default_cmc_rpm(),
    }
  }
}

impl Default for BlockchainConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      base_url: default_blockchain_url(),
      requests_per_minute: default_blockchain_rpm(),
    }
  }
}

impl Default for ScraperConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      url: default_scraper_url(),
      pattern: default_scraper_pattern(),
      requests_per_minute: default_scraper_rpm(),
    }
  }
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      history_size: default_history_size(),
      dominance_schedule: default_dominance_schedule(),
      price_schedule: default_price_schedule(),
      indicator_schedule: default_indicator_schedule(),
      network_stats_schedule: default_network_schedule(),
      health_schedule: default_health_schedule(),
    }
  }
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      data_dir: default_data_dir(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_key_prefix() -> String {
  "market-consensus:".to_string()
}

fn default_cache_op_timeout() -> u64 {
  500
}

fn default_sweep_interval() -> u64 {
  300
}

fn default_consensus_ttl() -> u64 {
  300
}

fn default_snapshot_ttl() -> u64 {
  600
}

fn default_network_ttl() -> u64 {
  900
}

fn default_dominance_threshold() -> f64 {
  2.0
}

fn default_price_threshold_pct() -> f64 {
  0.5
}

fn default_agreement_confidence() -> f64 {
  0.95
}

fn default_disagreement_confidence() -> f64 {
  0.8
}

fn default_primary_only_confidence() -> f64 {
  0.9
}

fn default_secondary_only_confidence() -> f64 {
  0.85
}

fn default_symbols() -> Vec<String> {
  vec!["BTC".to_string(), "ETH".to_string()]
}

fn default_indicator_symbol() -> String {
  "BTC".to_string()
}

fn default_series_length() -> usize {
  366
}

fn default_indicator_confidence() -> f64 {
  0.75
}

fn default_fallback_confidence() -> f64 {
  0.3
}

fn default_timeout() -> u64 {
  30
}

fn default_max_retries() -> u32 {
  2
}

fn default_retry_delay() -> u64 {
  250
}

fn default_coingecko_url() -> String {
  "https://api.coingecko.com/api/v3".to_string()
}

fn default_coingecko_key_env() -> String {
  "COINGECKO_API_KEY".to_string()
}

fn default_coingecko_rpm() -> u32 {
  30
}

fn default_coingecko_ids() -> HashMap<String, String> {
  HashMap::from([
    ("BTC".to_string(), "bitcoin".to_string()),
    ("ETH".to_string(), "ethereum".to_string()),
    ("SOL".to_string(), "solana".to_string()),
  ])
}

fn default_cmc_url() -> String {
  "https://pro-api.coinmarketcap.com".to_string()
}

fn default_cmc_key_env() -> String {
  "CMC_API_KEY".to_string()
}

fn default_cmc_rpm() -> u32 {
  30
}

fn default_blockchain_url() -> String {
  "https://api.blockchain.info".to_string()
}

fn default_blockchain_rpm() -> u32 {
  20
}

fn default_scraper_url() -> String {
  "https://www.tradingview.com/symbols/CRYPTOCAP-BTC.D/".to_string()
}

fn default_scraper_pattern() -> String {
  r#""last_price"\s*:\s*"?([0-9]+(?:\.[0-9]+)?)"#.to_string()
}

fn default_scraper_rpm() -> u32 {
  6
}

fn default_history_size() -> usize {
  100
}

fn default_dominance_schedule() -> String {
  "@every 5m".to_string()
}

fn default_price_schedule() -> String {
  "@every 1m".to_string()
}

fn default_indicator_schedule() -> String {
  "*/15 * * * *".to_string()
}

fn default_network_schedule() -> String {
  "@every 15m".to_string()
}

fn default_health_schedule() -> String {
  "@every 2m".to_string()
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}

fn default_data_dir() -> String {
  "data".to_string()
}
