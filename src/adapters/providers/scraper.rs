//! Page Scraper Adapter - Last-resort Dominance Source
//!
//! Extracts the dominance figure from an HTML page with a configured
//! regex. Pages change without notice, so this adapter is disabled by
//! default and only ever wired in as the final secondary.

use async_trait::async_trait;
use regex::Regex;
use tracing::instrument;

use super::http::HttpClient;
use crate::domain::metric::MetricReading;
use crate::error::ProviderError;
use crate::ports::provider::ProviderAdapter;

pub const PROVIDER_NAME: &str = "scraper";

/// Regex-driven page scraper.
pub struct ScraperProvider {
    client: HttpClient,
    pattern: Regex,
}

impl ScraperProvider {
    /// # Errors
    /// Fails if `pattern` is not a valid regex.
    pub fn new(client: HttpClient, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            pattern: Regex::new(pattern)?,
        })
    }

    fn extract(&self, page: &str) -> Result<f64, ProviderError> {
        let captured = self
            .pattern
            .captures(page)
            .and_then(|c| c.get(1))
            .ok_or_else(|| ProviderError::malformed(PROVIDER_NAME, "pattern did not match"))?;

        captured
            .as_str()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && (0.0..=100.0).contains(v))
            .ok_or_else(|| {
                ProviderError::malformed(PROVIDER_NAME, format!("not a dominance value: {}", captured.as_str()))
            })
    }
}

#[async_trait]
impl ProviderAdapter for ScraperProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    #[instrument(skip(self), fields(provider = PROVIDER_NAME))]
    async fn fetch_dominance(&self) -> Result<MetricReading, ProviderError> {
        let page = self.client.get_text("", &[]).await?;
        let value = self.extract(&page)?;
        Ok(MetricReading::new(value, PROVIDER_NAME))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.client.get_text("", &[]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::providers::http::HttpClientConfig;

    fn scraper(pattern: &str) -> ScraperProvider {
        let client = HttpClient::new(HttpClientConfig::new(PROVIDER_NAME, "http://localhost")).unwrap();
        ScraperProvider::new(client, pattern).unwrap()
    }

    #[test]
    fn test_extracts_first_capture() {
        let s = scraper(r#"data-dominance="([0-9.]+)""#);
        let page = r#"<div data-dominance="56.31">BTC.D</div>"#;
        assert_eq!(s.extract(page).unwrap(), 56.31);
    }

    #[test]
    fn test_no_match_is_malformed() {
        let s = scraper(r#"data-dominance="([0-9.]+)""#);
        assert!(matches!(
            s.extract("<html></html>"),
            Err(ProviderError::Malformed { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_value() {
        let s = scraper(r"value=([0-9.]+)");
        assert!(s.extract("value=250").is_err());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let client = HttpClient::new(HttpClientConfig::new(PROVIDER_NAME, "http://localhost")).unwrap();
        assert!(ScraperProvider::new(client, "(unclosed").is_err());
    }
}
