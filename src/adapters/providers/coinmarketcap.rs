//! CoinMarketCap Adapter - Secondary Price and Dominance Provider
//!
//! Requires an API key, sent as `X-CMC_PRO_API_KEY` on every request.
//! The global metrics endpoint reports the dominance 24h change, which
//! the resolver prefers over deriving a delta itself.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

use super::http::HttpClient;
use crate::domain::metric::MetricReading;
use crate::error::ProviderError;
use crate::ports::provider::ProviderAdapter;

pub const PROVIDER_NAME: &str = "coinmarketcap";

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct GlobalMetrics {
    btc_dominance: Option<f64>,
    btc_dominance_24h_percentage_change: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct QuoteEntry {
    quote: HashMap<String, UsdQuote>,
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    price: Option<f64>,
    percent_change_24h: Option<f64>,
}

/// CoinMarketCap REST adapter.
pub struct CoinMarketCapProvider {
    client: HttpClient,
}

impl CoinMarketCapProvider {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

fn parse_dominance(body: &str) -> Result<MetricReading, ProviderError> {
    let envelope: Envelope<GlobalMetrics> =
        serde_json::from_str(body).map_err(|e| ProviderError::malformed(PROVIDER_NAME, e))?;

    let dominance = envelope
        .data
        .btc_dominance
        .filter(|v| v.is_finite() && (0.0..=100.0).contains(v))
        .ok_or_else(|| ProviderError::malformed(PROVIDER_NAME, "missing btc_dominance"))?;

    let reading = MetricReading::new(dominance, PROVIDER_NAME);
    Ok(match envelope.data.btc_dominance_24h_percentage_change {
        Some(pct) if pct.is_finite() => reading.with_daily_change(None, pct),
        _ => reading,
    })
}

fn parse_quotes(body: &str) -> Result<HashMap<String, MetricReading>, ProviderError> {
    let envelope: Envelope<HashMap<String, QuoteEntry>> =
        serde_json::from_str(body).map_err(|e| ProviderError::malformed(PROVIDER_NAME, e))?;

    Ok(envelope
        .data
        .into_iter()
        .filter_map(|(symbol, entry)| {
            let usd = entry.quote.get("USD")?;
            let price = usd.price.filter(|p| p.is_finite() && *p > 0.0)?;
            let reading = MetricReading::new(price, PROVIDER_NAME);
            let reading = match usd.percent_change_24h {
                Some(pct) if pct.is_finite() => reading.with_daily_change(None, pct),
                _ => reading,
            };
            Some((symbol.to_uppercase(), reading))
        })
        .collect())
}

#[async_trait]
impl ProviderAdapter for CoinMarketCapProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    #[instrument(skip(self), fields(provider = PROVIDER_NAME))]
    async fn fetch_price(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, MetricReading>, ProviderError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }
        let joined = symbols
            .iter()
            .map(|s| s.to_uppercase())
            .collect::<Vec<_>>()
            .join(",");
        let body = self
            .client
            .get_text(
                "/v1/cryptocurrency/quotes/latest",
                &[("symbol", joined.as_str()), ("convert", "USD")],
            )
            .await?;
        parse_quotes(&body)
    }

    #[instrument(skip(self), fields(provider = PROVIDER_NAME))]
    async fn fetch_dominance(&self) -> Result<MetricReading, ProviderError> {
        let body = self
            .client
            .get_text("/v1/global-metrics/quotes/latest", &[])
            .await?;
        parse_dominance(&body)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.client.get_text("/v1/key/info", &[]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dominance_with_daily_change() {
        let body = r#"{"status":{"error_code":0},"data":{"btc_dominance":55.0,"btc_dominance_24h_percentage_change":1.0}}"#;
        let reading = parse_dominance(body).unwrap();
        assert_eq!(reading.value, 55.0);
        assert_eq!(reading.change_percent_24h, Some(1.0));
        let change = reading.change_24h.unwrap();
        assert!((change - (55.0 - 55.0 / 1.01)).abs() < 1e-9);
    }

    #[test]
    fn test_parse_dominance_out_of_range() {
        let body = r#"{"data":{"btc_dominance":140.0}}"#;
        assert!(parse_dominance(body).is_err());
    }

    #[test]
    fn test_parse_quotes() {
        let body = r#"{"data":{"BTC":{"quote":{"USD":{"price":50100.0,"percent_change_24h":-1.2}}},"ETH":{"quote":{"USD":{"price":null}}}}}"#;
        let quotes = parse_quotes(body).unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes["BTC"].value, 50100.0);
        assert_eq!(quotes["BTC"].change_percent_24h, Some(-1.2));
    }
}
