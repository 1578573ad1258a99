//! Provider Adapters - Upstream Market Data Sources
//!
//! Each adapter implements `ProviderAdapter` over the shared
//! rate-limited `HttpClient`. `ProviderSet::from_config` wires the
//! enabled adapters into primary / secondary roles per metric.

pub mod blockchain;
pub mod coingecko;
pub mod coinmarketcap;
pub mod http;
pub mod scraper;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

pub use blockchain::BlockchainProvider;
pub use coingecko::CoinGeckoProvider;
pub use coinmarketcap::CoinMarketCapProvider;
pub use http::{HttpClient, HttpClientConfig};
pub use scraper::ScraperProvider;

use crate::config::ProvidersConfig;
use crate::ports::provider::ProviderAdapter;

/// Enabled adapters grouped by the role they play.
pub struct ProviderSet {
  /// Primary for every metric.
  pub primary: Arc<dyn ProviderAdapter>,
  /// Secondaries for dominance, in preference order (scraper last).
  pub dominance_secondaries: Vec<Arc<dyn ProviderAdapter>>,
  /// Secondaries for prices, in preference order.
  pub price_secondaries: Vec<Arc<dyn ProviderAdapter>>,
  /// Network stats source, when enabled.
  pub network: Option<Arc<dyn ProviderAdapter>>,
}

impl ProviderSet {
  /// Build every enabled adapter from configuration.
  ///
  /// # Errors
  /// Fails if an HTTP client cannot be built or the scraper pattern is
  /// invalid.
  pub fn from_config(config: &ProvidersConfig) -> Result<Self> {
    let client_config = |name: &str, base_url: &str, rpm: u32| {
      let mut c = HttpClientConfig::new(name, base_url);
      c.timeout = config.timeout();
      c.requests_per_minute = rpm;
      c.max_retries = config.max_retries;
      c.retry_base_delay = Duration::from_millis(config.retry_base_delay_ms);
      c
    };

    let cg = &config.coingecko;
    let mut cg_client = client_config(coingecko::PROVIDER_NAME, &cg.base_url, cg.requests_per_minute);
    if let Ok(key) = std::env::var(&cg.api_key_env) {
      cg_client = cg_client.with_header(coingecko::API_KEY_HEADER, key);
    }
    let primary: Arc<dyn ProviderAdapter> = Arc::new(CoinGeckoProvider::new(
      HttpClient::new(cg_client).context("Failed to build CoinGecko client")?,
      cg.coin_ids.clone(),
    ));

    let mut dominance_secondaries: Vec<Arc<dyn ProviderAdapter>> = Vec::new();
    let mut price_secondaries: Vec<Arc<dyn ProviderAdapter>> = Vec::new();
    let mut network = None;

    let cmc = &config.coinmarketcap;
    if cmc.enabled {
      match std::env::var(&cmc.api_key_env) {
        Ok(key) => {
          let client = HttpClient::new(
            client_config(coinmarketcap::PROVIDER_NAME, &cmc.base_url, cmc.requests_per_minute)
              .with_header(coinmarketcap::API_KEY_HEADER, key),
          )
          .context("Failed to build CoinMarketCap client")?;
          let adapter: Arc<dyn ProviderAdapter> = Arc::new(CoinMarketCapProvider::new(client));
          dominance_secondaries.push(Arc::clone(&adapter));
          price_secondaries.push(adapter);
        }
        Err(_) => warn!(env = %cmc.api_key_env, "CoinMarketCap API key not set, adapter disabled"),
      }
    }

    let bc = &config.blockchain;
    if bc.enabled {
      let client = HttpClient::new(client_config(blockchain::PROVIDER_NAME, &bc.base_url, bc.requests_per_minute))
        .context("Failed to build Blockchain.com client")?;
      let adapter: Arc<dyn ProviderAdapter> = Arc::new(BlockchainProvider::new(client));
      price_secondaries.push(Arc::clone(&adapter));
      network = Some(adapter);
    }

    let scr = &config.scraper;
    if scr.enabled {
      let client = HttpClient::new(client_config(scraper::PROVIDER_NAME, &scr.url, scr.requests_per_minute))
        .context("Failed to build scraper client")?;
      let adapter = ScraperProvider::new(client, &scr.pattern).context("Invalid scraper pattern")?;
      dominance_secondaries.push(Arc::new(adapter));
    }

    info!(
      dominance_secondaries = dominance_secondaries.len(),
      price_secondaries = price_secondaries.len(),
      network = network.is_some(),
      "Provider adapters configured"
    );

    Ok(Self {
      primary,
      dominance_secondaries,
      price_secondaries,
      network,
    })
  }

  /// Every distinct adapter, for health probing.
  pub fn all(&self) -> Vec<Arc<dyn ProviderAdapter>> {
    let mut all = vec![Arc::clone(&self.primary)];
    for adapter in self
      .dominance_secondaries
      .iter()
      .chain(&self.price_secondaries)
      .chain(self.network.iter())
    {
      if !all.iter().any(|a| a.name() == adapter.name()) {
        all.push(Arc::clone(adapter));
      }
    }
    all
  }
}
