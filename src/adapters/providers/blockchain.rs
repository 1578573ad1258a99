//! Blockchain.com Adapter - Network Stats and BTC Price
//!
//! A single `/stats` call carries both the network figures and a USD
//! market price, so this adapter doubles as a BTC price secondary.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use super::http::HttpClient;
use crate::domain::metric::{MetricReading, NetworkStats};
use crate::error::ProviderError;
use crate::ports::provider::ProviderAdapter;

pub const PROVIDER_NAME: &str = "blockchain";

#[derive(Debug, Deserialize)]
struct StatsResponse {
    market_price_usd: Option<f64>,
    hash_rate: Option<f64>,
    difficulty: Option<f64>,
    n_blocks_total: Option<u64>,
    n_tx: Option<u64>,
}

/// Blockchain.com stats adapter.
pub struct BlockchainProvider {
    client: HttpClient,
}

impl BlockchainProvider {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    async fn stats(&self) -> Result<StatsResponse, ProviderError> {
        let body = self.client.get_text("/stats", &[]).await?;
        serde_json::from_str(&body).map_err(|e| ProviderError::malformed(PROVIDER_NAME, e))
    }
}

fn to_network_stats(stats: &StatsResponse) -> Result<NetworkStats, ProviderError> {
    let missing = |field: &str| ProviderError::malformed(PROVIDER_NAME, format!("missing {field}"));
    Ok(NetworkStats {
        hash_rate: stats.hash_rate.ok_or_else(|| missing("hash_rate"))?,
        difficulty: stats.difficulty.ok_or_else(|| missing("difficulty"))?,
        block_height: stats.n_blocks_total.ok_or_else(|| missing("n_blocks_total"))?,
        transactions_24h: stats.n_tx.unwrap_or(0),
        source: PROVIDER_NAME.to_string(),
        observed_at: Utc::now(),
    })
}

#[async_trait]
impl ProviderAdapter for BlockchainProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    /// Only BTC is quoted; other tickers are omitted.
    #[instrument(skip(self), fields(provider = PROVIDER_NAME))]
    async fn fetch_price(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, MetricReading>, ProviderError> {
        if !symbols.iter().any(|s| s.eq_ignore_ascii_case("BTC")) {
            return Ok(HashMap::new());
        }
        let stats = self.stats().await?;
        let price = stats
            .market_price_usd
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| ProviderError::malformed(PROVIDER_NAME, "missing market_price_usd"))?;
        Ok(HashMap::from([(
            "BTC".to_string(),
            MetricReading::new(price, PROVIDER_NAME),
        )]))
    }

    #[instrument(skip(self), fields(provider = PROVIDER_NAME))]
    async fn fetch_network_stats(&self) -> Result<NetworkStats, ProviderError> {
        let stats = self.stats().await?;
        to_network_stats(&stats)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.stats().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_stats_from_response() {
        let body = r#"{"market_price_usd":50050.0,"hash_rate":6.1e11,"difficulty":8.3e13,"n_blocks_total":840000,"n_tx":350000}"#;
        let stats: StatsResponse = serde_json::from_str(body).unwrap();
        let network = to_network_stats(&stats).unwrap();
        assert_eq!(network.block_height, 840_000);
        assert_eq!(network.transactions_24h, 350_000);
        assert_eq!(network.source, PROVIDER_NAME);
    }

    #[test]
    fn test_network_stats_missing_field() {
        let stats: StatsResponse = serde_json::from_str(r#"{"hash_rate":1.0}"#).unwrap();
        assert!(to_network_stats(&stats).is_err());
    }
}
