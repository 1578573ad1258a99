//! Core market metric types.
//!
//! Defines the readings produced by provider adapters, the metrics the
//! resolver reconciles, and the snapshot shapes consumed by the indicator
//! calculator. These types are the foundation of the hexagonal
//! architecture's inner ring and are all serializable so the tiered cache
//! can store them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lightweight provider identifier used at the ports boundary.
pub type ProviderName = String;

// ────────────────────────────────────────────
// Metrics
// ────────────────────────────────────────────

/// A logical metric that can be resolved across several providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metric {
    /// Bitcoin share of total crypto market capitalization, in percent.
    BtcDominance,
    /// Spot USD price of an asset ticker (e.g. "BTC").
    Price { symbol: String },
}

impl Metric {
    /// Convenience constructor for a price metric.
    pub fn price(symbol: impl Into<String>) -> Self {
        Self::Price {
            symbol: symbol.into().to_uppercase(),
        }
    }

    /// Stable key used for the tiered cache and the resolver's memory.
    pub fn cache_key(&self) -> String {
        match self {
            Self::BtcDominance => "consensus:btc_dominance".to_string(),
            Self::Price { symbol } => format!("consensus:price:{symbol}"),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BtcDominance => write!(f, "btc_dominance"),
            Self::Price { symbol } => write!(f, "price:{symbol}"),
        }
    }
}

// ────────────────────────────────────────────
// Readings
// ────────────────────────────────────────────

/// A single value observed by one provider (or produced by the resolver).
///
/// Immutable once constructed. `confidence` is always present: adapters
/// default it to 1.0, the resolver recomputes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    /// Observed value.
    pub value: f64,
    /// Provider name that produced the value.
    pub source: ProviderName,
    /// When the value was observed.
    pub observed_at: DateTime<Utc>,
    /// Trust in the value, in [0, 1].
    pub confidence: f64,
    /// Absolute change over the last 24h, when the provider reports it.
    pub change_24h: Option<f64>,
    /// Percent change over the last 24h, when the provider reports it.
    pub change_percent_24h: Option<f64>,
}

impl MetricReading {
    /// Create a full-confidence reading observed now.
    pub fn new(value: f64, source: impl Into<String>) -> Self {
        Self {
            value,
            source: source.into(),
            observed_at: Utc::now(),
            confidence: 1.0,
            change_24h: None,
            change_percent_24h: None,
        }
    }

    /// Attach the provider's own 24h delta.
    ///
    /// Only the percent change is required; the absolute change is derived
    /// from it when missing.
    #[must_use]
    pub fn with_daily_change(mut self, change_24h: Option<f64>, change_percent_24h: f64) -> Self {
        let absolute = change_24h.or_else(|| {
            let previous = self.value / (1.0 + change_percent_24h / 100.0);
            previous.is_finite().then(|| self.value - previous)
        });
        self.change_24h = absolute;
        self.change_percent_24h = Some(change_percent_24h);
        self
    }

    /// Whether this reading carries its own 24h delta.
    pub fn has_daily_change(&self) -> bool {
        self.change_24h.is_some() && self.change_percent_24h.is_some()
    }
}

/// Reconciled value for one metric.
///
/// Created fresh on every resolution call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Reconciled value.
    pub value: f64,
    /// Value 24h earlier (or the last known value when no delta exists).
    pub previous_value: f64,
    /// Absolute 24h change.
    pub change_24h: f64,
    /// Percent 24h change.
    pub change_percent_24h: f64,
    /// Source label, possibly composite (e.g. "coingecko + coinmarketcap (averaged)").
    pub source: String,
    /// Trust in the value, in [0, 1].
    pub confidence: f64,
    /// When the resolution happened.
    pub observed_at: DateTime<Utc>,
}

// ────────────────────────────────────────────
// Snapshots
// ────────────────────────────────────────────

/// Point-in-time market snapshot for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Asset ticker.
    pub symbol: String,
    /// Spot USD price.
    pub price: f64,
    /// Market capitalization in USD.
    pub market_cap: f64,
    /// Circulating supply in coins.
    pub circulating_supply: f64,
    /// When the snapshot was observed.
    pub observed_at: DateTime<Utc>,
}

/// On-chain network statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Estimated network hash rate (GH/s).
    pub hash_rate: f64,
    /// Current mining difficulty.
    pub difficulty: f64,
    /// Latest block height.
    pub block_height: u64,
    /// Confirmed transactions in the last 24h.
    pub transactions_24h: u64,
    /// Provider name.
    pub source: ProviderName,
    /// When the stats were observed.
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_cache_keys_are_distinct() {
        assert_eq!(Metric::BtcDominance.cache_key(), "consensus:btc_dominance");
        assert_eq!(Metric::price("eth").cache_key(), "consensus:price:ETH");
        assert_eq!(Metric::price("btc").to_string(), "price:BTC");
    }

    #[test]
    fn test_daily_change_derived_from_percent() {
        let reading = MetricReading::new(110.0, "coingecko").with_daily_change(None, 10.0);
        assert!(reading.has_daily_change());
        let change = reading.change_24h.unwrap();
        assert!((change - 10.0).abs() < 1e-9, "expected 10.0, got {change}");
    }

    #[test]
    fn test_new_reading_defaults_to_full_confidence() {
        let reading = MetricReading::new(54.2, "coinmarketcap");
        assert_eq!(reading.confidence, 1.0);
        assert!(!reading.has_daily_change());
    }
}
