//! Threshold-gated consensus over disagreeing provider readings.
//!
//! Providers disagree because of sampling-time skew and methodology
//! differences. Close readings are averaged; far-apart readings are not,
//! the anchor (primary) source is trusted instead.
//!
//! This module is pure: the use case layer gathers the per-provider
//! outcomes and hands them here once every call has returned or failed.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::metric::{ConsensusResult, MetricReading};
use crate::error::{ResolveError, SourceFailure};

/// How the disagreement between two readings is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffMode {
    /// Absolute difference (percentage points for dominance-style metrics).
    Absolute,
    /// Difference relative to the anchor value, in percent (prices).
    Relative,
}

/// Tunable constants of the reconciliation.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusParams {
    /// Agreement threshold, interpreted according to `diff_mode`.
    pub threshold: f64,
    /// How the difference is measured.
    pub diff_mode: DiffMode,
    /// Confidence when readings agree and are averaged.
    pub agreement_confidence: f64,
    /// Confidence when readings disagree and the anchor wins.
    pub disagreement_confidence: f64,
    /// Confidence when only the primary answered.
    pub primary_only_confidence: f64,
    /// Confidence when only one secondary answered.
    pub secondary_only_confidence: f64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            diff_mode: DiffMode::Absolute,
            agreement_confidence: 0.95,
            disagreement_confidence: 0.8,
            primary_only_confidence: 0.9,
            secondary_only_confidence: 0.85,
        }
    }
}

impl ConsensusParams {
    /// Distance between two readings in the configured unit.
    pub fn difference(&self, anchor: f64, other: f64) -> f64 {
        let diff = (anchor - other).abs();
        match self.diff_mode {
            DiffMode::Absolute => diff,
            DiffMode::Relative if anchor.abs() > f64::EPSILON => diff / anchor.abs() * 100.0,
            DiffMode::Relative => f64::INFINITY,
        }
    }
}

/// Outcome of one provider call.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    /// Provider name.
    pub provider: String,
    /// Reading on success, failure reason otherwise.
    pub result: Result<MetricReading, String>,
}

impl SourceOutcome {
    pub fn ok(reading: MetricReading) -> Self {
        Self {
            provider: reading.source.clone(),
            result: Ok(reading),
        }
    }

    pub fn failed(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            result: Err(reason.into()),
        }
    }
}

/// Reconcile the primary and secondary outcomes for one metric.
///
/// The 24h delta is copied from the first successful reading that carries
/// one (primary first). Without such a reading it stays zero.
///
/// # Errors
/// Returns [`ResolveError::AllSourcesFailed`] listing every provider when
/// no outcome succeeded. A value is never fabricated.
pub fn reconcile(
    metric: &str,
    primary: &SourceOutcome,
    secondaries: &[SourceOutcome],
    params: &ConsensusParams,
    now: DateTime<Utc>,
) -> Result<ConsensusResult, ResolveError> {
    let successes: Vec<(bool, &MetricReading)> = std::iter::once((true, primary))
        .chain(secondaries.iter().map(|s| (false, s)))
        .filter_map(|(is_primary, outcome)| {
            outcome.result.as_ref().ok().map(|r| (is_primary, r))
        })
        .filter(|(_, r)| r.value.is_finite())
        .collect();

    if successes.is_empty() {
        let failures = std::iter::once(primary)
            .chain(secondaries.iter())
            .map(|o| SourceFailure {
                provider: o.provider.clone(),
                reason: match &o.result {
                    Err(reason) => reason.clone(),
                    Ok(r) => format!("non-finite value {}", r.value),
                },
            })
            .collect();
        return Err(ResolveError::AllSourcesFailed {
            metric: metric.to_string(),
            failures,
        });
    }

    // Anchor is the primary when it answered, otherwise the first secondary.
    let (anchor_is_primary, anchor) = successes[0];
    let others = &successes[1..];

    let (value, source, confidence) = if others.is_empty() {
        let confidence = if anchor_is_primary {
            params.primary_only_confidence
        } else {
            params.secondary_only_confidence
        };
        (anchor.value, anchor.source.clone(), confidence)
    } else {
        let closest = others
            .iter()
            .map(|(_, r)| params.difference(anchor.value, r.value))
            .fold(f64::INFINITY, f64::min);

        if closest < params.threshold {
            let agreeing: Vec<&MetricReading> = std::iter::once(anchor)
                .chain(
                    others
                        .iter()
                        .map(|(_, r)| *r)
                        .filter(|r| params.difference(anchor.value, r.value) < params.threshold),
                )
                .collect();
            let mean = agreeing.iter().map(|r| r.value).sum::<f64>() / agreeing.len() as f64;
            let names: Vec<&str> = agreeing.iter().map(|r| r.source.as_str()).collect();
            (
                mean,
                format!("{} (averaged)", names.join(" + ")),
                params.agreement_confidence,
            )
        } else {
            (
                anchor.value,
                anchor.source.clone(),
                params.disagreement_confidence,
            )
        }
    };

    let (change_24h, change_percent_24h) = daily_change(&successes);

    Ok(ConsensusResult {
        value,
        previous_value: value - change_24h,
        change_24h,
        change_percent_24h,
        source,
        confidence,
        observed_at: now,
    })
}

/// Pick the 24h delta from the richest source, primary first.
fn daily_change(successes: &[(bool, &MetricReading)]) -> (f64, f64) {
    successes
        .iter()
        .map(|(_, r)| *r)
        .find(|r| r.has_daily_change())
        .map_or((0.0, 0.0), |reading| {
            (
                reading.change_24h.unwrap_or_default(),
                reading.change_percent_24h.unwrap_or_default(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(source: &str, value: f64) -> SourceOutcome {
        SourceOutcome::ok(MetricReading::new(value, source))
    }

    fn resolve(
        primary: SourceOutcome,
        secondaries: Vec<SourceOutcome>,
    ) -> Result<ConsensusResult, ResolveError> {
        reconcile(
            "btc_dominance",
            &primary,
            &secondaries,
            &ConsensusParams::default(),
            Utc::now(),
        )
    }

    #[test]
    fn test_close_values_are_averaged() {
        let result = resolve(
            reading("coingecko", 60.0),
            vec![reading("coinmarketcap", 61.5)],
        )
        .unwrap();
        assert!((result.value - 60.75).abs() < 1e-9);
        assert_eq!(result.source, "coingecko + coinmarketcap (averaged)");
        assert_eq!(result.confidence, 0.95);
    }

    #[test]
    fn test_far_values_prefer_primary() {
        let result = resolve(
            reading("coingecko", 60.0),
            vec![reading("coinmarketcap", 70.0)],
        )
        .unwrap();
        assert_eq!(result.value, 60.0);
        assert_eq!(result.source, "coingecko");
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let result = resolve(
            reading("coingecko", 60.0),
            vec![reading("coinmarketcap", 62.0)],
        )
        .unwrap();
        assert_eq!(result.value, 60.0);
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn test_primary_only_success() {
        let result = resolve(
            reading("coingecko", 58.3),
            vec![SourceOutcome::failed("coinmarketcap", "HTTP 500")],
        )
        .unwrap();
        assert_eq!(result.value, 58.3);
        assert_eq!(result.source, "coingecko");
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_secondary_only_success_has_lower_confidence() {
        let result = resolve(
            SourceOutcome::failed("coingecko", "timeout"),
            vec![reading("coinmarketcap", 58.3)],
        )
        .unwrap();
        assert_eq!(result.source, "coinmarketcap");
        assert_eq!(result.confidence, 0.85);
    }

    #[test]
    fn test_all_failed_names_every_provider() {
        let err = resolve(
            SourceOutcome::failed("coingecko", "timeout after 30s"),
            vec![
                SourceOutcome::failed("coinmarketcap", "HTTP 401"),
                SourceOutcome::failed("scraper", "pattern not found"),
            ],
        )
        .unwrap_err();
        let message = err.to_string();
        for name in ["coingecko", "coinmarketcap", "scraper"] {
            assert!(message.contains(name), "{name} missing from: {message}");
        }
        assert!(message.contains("HTTP 401"));
    }

    #[test]
    fn test_only_agreeing_secondaries_are_averaged() {
        let result = resolve(
            reading("coingecko", 60.0),
            vec![reading("coinmarketcap", 61.0), reading("scraper", 75.0)],
        )
        .unwrap();
        assert!((result.value - 60.5).abs() < 1e-9);
        assert_eq!(result.source, "coingecko + coinmarketcap (averaged)");
    }

    #[test]
    fn test_secondary_daily_change_is_propagated() {
        let secondary = MetricReading::new(61.0, "coinmarketcap").with_daily_change(Some(0.5), 0.83);
        let result = resolve(reading("coingecko", 60.0), vec![SourceOutcome::ok(secondary)]).unwrap();
        assert_eq!(result.change_24h, 0.5);
        assert_eq!(result.change_percent_24h, 0.83);
        assert!((result.previous_value - (result.value - 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_change_stays_zero_without_source_delta() {
        let result = resolve(
            reading("coingecko", 55.0),
            vec![reading("coinmarketcap", 55.4)],
        )
        .unwrap();
        assert_eq!(result.change_24h, 0.0);
        assert_eq!(result.change_percent_24h, 0.0);
        assert_eq!(result.previous_value, result.value);
    }

    #[test]
    fn test_relative_mode_for_prices() {
        let params = ConsensusParams {
            threshold: 0.5,
            diff_mode: DiffMode::Relative,
            ..ConsensusParams::default()
        };
        let result = reconcile(
            "price:BTC",
            &reading("coingecko", 100_000.0),
            &[reading("blockchain", 100_200.0)],
            &params,
            Utc::now(),
        )
        .unwrap();
        assert!((result.value - 100_100.0).abs() < 1e-6);
        assert_eq!(result.confidence, 0.95);
    }
}
