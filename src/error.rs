//! Error taxonomy shared across layers.
//!
//! - `CacheError`: cache-tier failures, absorbed by the tiered cache
//! - `ProviderError`: an upstream call failed (retryable)
//! - `ResolveError`: every provider for a metric failed (terminal for the call)
//! - `SchedulerError`: registration / lifecycle misuse (fails fast)
//!
//! Non-finite ratios and z-scores are never errors; the indicator math
//! neutralizes them in place.

use std::time::Duration;

use thiserror::Error;

/// Failures of a single cache tier.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Key absent or expired. Internal miss, never a user-facing error.
    #[error("cache key '{key}' not found")]
    NotFound { key: String },

    #[error("{store} store error: {message}")]
    Store { store: &'static str, message: String },

    #[error("{store} store operation timed out after {timeout:?}")]
    Timeout { store: &'static str, timeout: Duration },

    #[error("cache payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub fn store(store: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Store {
            store,
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Upstream provider failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("{provider} returned HTTP {status}")]
    Status { provider: String, status: u16 },

    #[error("{provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("{provider} response malformed: {message}")]
    Malformed { provider: String, message: String },

    #[error("{provider} does not support {capability}")]
    Unsupported {
        provider: String,
        capability: &'static str,
    },
}

impl ProviderError {
    pub fn request(provider: &str, message: impl std::fmt::Display) -> Self {
        Self::Request {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }

    pub fn malformed(provider: &str, message: impl std::fmt::Display) -> Self {
        Self::Malformed {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }

    pub fn unsupported(provider: &str, capability: &'static str) -> Self {
        Self::Unsupported {
            provider: provider.to_string(),
            capability,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed { .. } | Self::Unsupported { .. } => false,
        }
    }
}

/// One provider's failure inside an aggregated resolution error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub provider: String,
    pub reason: String,
}

impl std::fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

/// Resolution failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("all sources failed for {metric}: {}", join_failures(.failures))]
    AllSourcesFailed {
        metric: String,
        failures: Vec<SourceFailure>,
    },
}

fn join_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Scheduler registration and lifecycle errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("invalid schedule '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("job '{0}' is already registered")]
    DuplicateJob(String),

    #[error("job '{0}' not found")]
    JobNotFound(String),

    #[error("scheduler is already running")]
    AlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_sources_failed_lists_every_provider() {
        let err = ResolveError::AllSourcesFailed {
            metric: "btc_dominance".to_string(),
            failures: vec![
                SourceFailure {
                    provider: "coingecko".to_string(),
                    reason: "HTTP 503".to_string(),
                },
                SourceFailure {
                    provider: "coinmarketcap".to_string(),
                    reason: "timed out".to_string(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "all sources failed for btc_dominance: coingecko: HTTP 503; coinmarketcap: timed out"
        );
    }

    #[test]
    fn test_retryable_classification() {
        let status = |status| ProviderError::Status {
            provider: "coingecko".to_string(),
            status,
        };
        assert!(status(429).is_retryable());
        assert!(status(502).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!ProviderError::malformed("coingecko", "missing field").is_retryable());
    }
}
