//! CoinGecko Adapter - Primary Market Data Provider
//!
//! Serves spot prices with their 24h change, Bitcoin dominance from the
//! global market endpoint, and market snapshots for the indicator.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::http::HttpClient;
use crate::domain::metric::{MarketSnapshot, MetricReading};
use crate::error::ProviderError;
use crate::ports::provider::ProviderAdapter;

pub const PROVIDER_NAME: &str = "coingecko";

/// Header carrying an optional demo API key.
pub const API_KEY_HEADER: &str = "x-cg-demo-api-key";

#[derive(Debug, Deserialize)]
struct SimplePriceEntry {
    usd: Option<f64>,
    usd_24h_change: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GlobalResponse {
    data: GlobalData,
}

#[derive(Debug, Deserialize)]
struct GlobalData {
    market_cap_percentage: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct MarketEntry {
    current_price: Option<f64>,
    market_cap: Option<f64>,
    circulating_supply: Option<f64>,
}

/// CoinGecko REST adapter.
pub struct CoinGeckoProvider {
    client: HttpClient,
    /// Ticker → CoinGecko coin id.
    coin_ids: HashMap<String, String>,
}

impl CoinGeckoProvider {
    pub fn new(client: HttpClient, coin_ids: HashMap<String, String>) -> Self {
        let coin_ids = coin_ids
            .into_iter()
            .map(|(symbol, id)| (symbol.to_uppercase(), id))
            .collect();
        Self { client, coin_ids }
    }

    fn coin_id(&self, symbol: &str) -> Option<&str> {
        self.coin_ids.get(&symbol.to_uppercase()).map(String::as_str)
    }
}

/// Map a `/simple/price` body back onto the requested tickers.
fn parse_simple_price(
    body: &str,
    wanted: &[(String, String)],
) -> Result<HashMap<String, MetricReading>, ProviderError> {
    let entries: HashMap<String, SimplePriceEntry> =
        serde_json::from_str(body).map_err(|e| ProviderError::malformed(PROVIDER_NAME, e))?;

    let mut readings = HashMap::new();
    for (symbol, id) in wanted {
        let Some(entry) = entries.get(id) else {
            continue;
        };
        let Some(price) = entry.usd.filter(|p| p.is_finite() && *p > 0.0) else {
            continue;
        };
        let mut reading = MetricReading::new(price, PROVIDER_NAME);
        if let Some(pct) = entry.usd_24h_change.filter(|p| p.is_finite()) {
            reading = reading.with_daily_change(None, pct);
        }
        readings.insert(symbol.clone(), reading);
    }
    Ok(readings)
}

fn parse_dominance(body: &str) -> Result<MetricReading, ProviderError> {
    let global: GlobalResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::malformed(PROVIDER_NAME, e))?;

    let btc = global
        .data
        .market_cap_percentage
        .get("btc")
        .copied()
        .filter(|v| v.is_finite() && (0.0..=100.0).contains(v))
        .ok_or_else(|| ProviderError::malformed(PROVIDER_NAME, "missing market_cap_percentage.btc"))?;

    Ok(MetricReading::new(btc, PROVIDER_NAME))
}

fn parse_snapshot(body: &str, symbol: &str) -> Result<MarketSnapshot, ProviderError> {
    let entries: Vec<MarketEntry> =
        serde_json::from_str(body).map_err(|e| ProviderError::malformed(PROVIDER_NAME, e))?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::malformed(PROVIDER_NAME, format!("no market data for {symbol}")))?;

    let price = entry
        .current_price
        .ok_or_else(|| ProviderError::malformed(PROVIDER_NAME, "missing current_price"))?;

    Ok(MarketSnapshot {
        symbol: symbol.to_uppercase(),
        price,
        market_cap: entry.market_cap.unwrap_or(0.0),
        circulating_supply: entry.circulating_supply.unwrap_or(0.0),
        observed_at: Utc::now(),
    })
}

#[async_trait]
impl ProviderAdapter for CoinGeckoProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    #[instrument(skip(self), fields(provider = PROVIDER_NAME))]
    async fn fetch_price(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, MetricReading>, ProviderError> {
        let wanted: Vec<(String, String)> = symbols
            .iter()
            .filter_map(|s| self.coin_id(s).map(|id| (s.to_uppercase(), id.to_string())))
            .collect();
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }

        let ids = wanted
            .iter()
            .map(|(_, id)| id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let body = self
            .client
            .get_text(
                "/simple/price",
                &[
                    ("ids", ids.as_str()),
                    ("vs_currencies", "usd"),
                    ("include_24hr_change", "true"),
                ],
            )
            .await?;

        let readings = parse_simple_price(&body, &wanted)?;
        debug!(count = readings.len(), "Fetched CoinGecko prices");
        Ok(readings)
    }

    #[instrument(skip(self), fields(provider = PROVIDER_NAME))]
    async fn fetch_dominance(&self) -> Result<MetricReading, ProviderError> {
        let body = self.client.get_text("/global", &[]).await?;
        parse_dominance(&body)
    }

    #[instrument(skip(self), fields(provider = PROVIDER_NAME))]
    async fn fetch_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, ProviderError> {
        let id = self.coin_id(symbol).ok_or_else(|| {
            ProviderError::malformed(PROVIDER_NAME, format!("no coin id configured for {symbol}"))
        })?;
        let body = self
            .client
            .get_text("/coins/markets", &[("vs_currency", "usd"), ("ids", id)])
            .await?;
        parse_snapshot(&body, symbol)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.client.get_text("/ping", &[]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_price_with_change() {
        let body = r#"{"bitcoin":{"usd":50000.0,"usd_24h_change":2.5},"ethereum":{"usd":3000.0}}"#;
        let wanted = vec![
            ("BTC".to_string(), "bitcoin".to_string()),
            ("ETH".to_string(), "ethereum".to_string()),
            ("SOL".to_string(), "solana".to_string()),
        ];
        let readings = parse_simple_price(body, &wanted).unwrap();

        assert_eq!(readings.len(), 2);
        let btc = &readings["BTC"];
        assert_eq!(btc.value, 50000.0);
        assert_eq!(btc.source, PROVIDER_NAME);
        assert_eq!(btc.change_percent_24h, Some(2.5));
        assert!(btc.has_daily_change());
        assert!(!readings["ETH"].has_daily_change());
    }

    #[test]
    fn test_parse_dominance() {
        let body = r#"{"data":{"market_cap_percentage":{"btc":54.2,"eth":17.1}}}"#;
        let reading = parse_dominance(body).unwrap();
        assert_eq!(reading.value, 54.2);
        assert_eq!(reading.confidence, 1.0);
    }

    #[test]
    fn test_parse_dominance_missing_btc() {
        let body = r#"{"data":{"market_cap_percentage":{"eth":17.1}}}"#;
        assert!(matches!(
            parse_dominance(body),
            Err(ProviderError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_snapshot() {
        let body = r#"[{"id":"bitcoin","current_price":50000.0,"market_cap":980000000000.0,"circulating_supply":19600000.0}]"#;
        let snapshot = parse_snapshot(body, "btc").unwrap();
        assert_eq!(snapshot.symbol, "BTC");
        assert_eq!(snapshot.price, 50000.0);
        assert_eq!(snapshot.circulating_supply, 19_600_000.0);
    }

    #[test]
    fn test_parse_snapshot_empty() {
        assert!(parse_snapshot("[]", "BTC").is_err());
    }
}
