//! Provider HTTP Client - Rate-limited REST Client
//!
//! Wraps reqwest with client-side rate limiting, bounded concurrency
//! and retries for every upstream market data API. Failures are mapped
//! into `ProviderError` so the resolver can report them per provider.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, StatusCode};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::ProviderError;

/// Configuration for one provider's HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
  /// Provider name used in errors and logs.
  pub provider: String,
  /// Base URL for the API.
  pub base_url: String,
  /// Request timeout.
  pub timeout: Duration,
  /// Maximum concurrent requests.
  pub max_concurrent: usize,
  /// Client-side request budget.
  pub requests_per_minute: u32,
  /// Maximum retries on transient errors.
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  pub retry_base_delay: Duration,
  /// Static headers sent with every request (API keys).
  pub headers: Vec<(String, String)>,
}

impl HttpClientConfig {
  /// Config with defaults for everything but identity and endpoint.
  pub fn new(provider: impl Into<String>, base_url: impl Into<String>) -> Self {
    Self {
      provider: provider.into(),
      base_url: base_url.into(),
      timeout: Duration::from_secs(30),
      max_concurrent: 4,
      requests_per_minute: 30,
      max_retries: 2,
      retry_base_delay: Duration::from_millis(250),
      headers: Vec::new(),
    }
  }

  #[must_use]
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate-limited HTTP client shared by one provider adapter.
pub struct HttpClient {
  /// Underlying HTTP client.
  http: Client,
  /// Client configuration.
  config: HttpClientConfig,
  /// Concurrency limiter.
  semaphore: Arc<Semaphore>,
  /// Request budget limiter.
  limiter: DirectLimiter,
}

impl HttpClient {
  /// Create a new client.
  ///
  /// # Errors
  /// Returns an error if the underlying TLS client cannot be built.
  pub fn new(config: HttpClientConfig) -> Result<Self, ProviderError> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(4)
      .user_agent(concat!("market-consensus/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| ProviderError::request(&config.provider, e))?;

    let per_minute = NonZeroU32::new(config.requests_per_minute.max(1)).unwrap_or(NonZeroU32::MIN);
    let limiter = RateLimiter::direct(Quota::per_minute(per_minute));
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

    Ok(Self {
      http,
      config,
      semaphore,
      limiter,
    })
  }

  /// Provider name this client reports errors under.
  pub fn provider(&self) -> &str {
    &self.config.provider
  }

  /// GET a raw response body.
  pub async fn get_text(&self, path: &str, query: &[(&str, &str)]) -> Result<String, ProviderError> {
    let url = format!("{}{}", self.config.base_url, path);
    let mut request = self.http.get(&url).query(query);
    for (name, value) in &self.config.headers {
      request = request.header(name, value);
    }
    self.execute_with_retry(request, path).await
  }

  /// Execute request with rate limiting and retries.
  async fn execute_with_retry(&self, request: RequestBuilder, path: &str) -> Result<String, ProviderError> {
    let provider = self.provider();
    let _permit = self
      .semaphore
      .acquire()
      .await
      .map_err(|e| ProviderError::request(provider, e))?;

    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
        debug!(provider, attempt, delay_ms = delay.as_millis(), "Retrying request");
        sleep(delay).await;
      }

      self.limiter.until_ready().await;

      let req = request
        .try_clone()
        .ok_or_else(|| ProviderError::request(provider, "request body is not cloneable"))?;

      let err = match req.send().await {
        Ok(response) => match response.status() {
          status if status.is_success() => {
            return response
              .text()
              .await
              .map_err(|e| ProviderError::request(provider, e));
          }
          StatusCode::TOO_MANY_REQUESTS => {
            warn!(provider, path, "Rate limited upstream, backing off");
            ProviderError::Status {
              provider: provider.to_string(),
              status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
            }
          }
          status => ProviderError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
          },
        },
        Err(e) if e.is_timeout() => ProviderError::Timeout {
          provider: provider.to_string(),
          timeout: self.config.timeout,
        },
        Err(e) => ProviderError::request(provider, e),
      };

      if !err.is_retryable() {
        return Err(err);
      }
      warn!(provider, path, attempt, error = %err, "Request failed");
      last_error = Some(err);
    }

    Err(last_error.unwrap_or_else(|| ProviderError::request(provider, "max retries exceeded")))
  }
}
