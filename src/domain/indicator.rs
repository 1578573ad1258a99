//! Valuation ratio series and standardized score.
//!
//! True historical on-chain data is not available from the providers, so
//! a daily series is synthesized backwards from one live snapshot using
//! smooth periodic perturbations. The perturbations are phase-shifted by
//! the snapshot itself so the score moves with the market, and they vanish
//! at day offset zero so the newest point always equals the live data.
//!
//! Every ratio is guarded: invalid denominators or non-finite results are
//! replaced by a neutral 1.0 and the result is clamped to
//! [`RATIO_FLOOR`, `RATIO_CEILING`].

use std::f64::consts::PI;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::metric::MarketSnapshot;

/// Default number of daily points (one year plus today).
pub const DEFAULT_SERIES_LENGTH: usize = 366;
/// Lowest ratio ever emitted.
pub const RATIO_FLOOR: f64 = 0.1;
/// Highest ratio ever emitted.
pub const RATIO_CEILING: f64 = 10.0;
/// Substitute for an invalid ratio.
pub const NEUTRAL_RATIO: f64 = 1.0;

/// Reference value as a fraction of market value at the series midpoint.
const REFERENCE_BASE: f64 = 0.6;
/// Yearly supply growth approximation, per day.
const DAILY_SUPPLY_GROWTH: f64 = 0.000_05;

/// One synthetic daily point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub date: NaiveDate,
    pub price: f64,
    /// Market value (capitalization) on that day.
    pub market_value: f64,
    /// Reference (realized-style) value on that day.
    pub reference_value: f64,
    /// `market_value / reference_value`, guarded and clamped.
    pub ratio: f64,
    pub z_score: f64,
    pub circulating_supply: f64,
}

/// Summary statistics over the ratio population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub mean: f64,
    /// Bessel-corrected sample standard deviation.
    pub std_dev: f64,
    /// Number of ratios in the population.
    pub samples: usize,
    /// Ratios that had to be replaced by [`NEUTRAL_RATIO`].
    pub neutralized: usize,
}

/// Output of one indicator computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorOutcome {
    /// Z-score of the newest point.
    pub score: f64,
    /// Oldest → newest.
    pub series: Vec<HistoricalPoint>,
    pub stats: SeriesStats,
}

/// Compute the series and score for a snapshot as of `now`.
///
/// Deterministic: identical `snapshot` and `now` always yield identical
/// output. A `length` of zero is treated as one point.
pub fn compute(snapshot: &MarketSnapshot, now: DateTime<Utc>, length: usize) -> IndicatorOutcome {
    let length = length.max(1);
    let today = now.date_naive();
    let phase = snapshot_phase(snapshot.price);
    let base_cap = base_market_cap(snapshot);

    let mut neutralized = 0;
    let mut series: Vec<HistoricalPoint> = (0..length)
        .map(|index| {
            let offset = (length - 1 - index) as f64;
            let mut point = synthesize_point(snapshot, base_cap, phase, offset);
            point.date = today - Duration::days(offset as i64);
            point
        })
        .collect();

    // The newest point carries the live snapshot, not synthetic values.
    if let Some(latest) = series.last_mut() {
        if snapshot.price.is_finite() && snapshot.price > 0.0 {
            latest.price = snapshot.price;
        }
        if snapshot.market_cap.is_finite() && snapshot.market_cap > 0.0 {
            latest.market_value = snapshot.market_cap;
        }
    }

    for point in &mut series {
        let (ratio, replaced) = guarded_ratio(point.market_value, point.reference_value);
        point.ratio = ratio;
        if replaced {
            neutralized += 1;
        }
    }

    let ratios: Vec<f64> = series.iter().map(|p| p.ratio).collect();
    let (mean, std_dev) = sample_stats(&ratios);

    for point in &mut series {
        point.z_score = z_score(point.ratio, mean, std_dev);
    }

    let score = series.last().map_or(0.0, |p| p.z_score);

    IndicatorOutcome {
        score,
        series,
        stats: SeriesStats {
            mean,
            std_dev,
            samples: ratios.len(),
            neutralized,
        },
    }
}

/// Guard a ratio, returning the value and whether it was neutralized.
///
/// Non-positive or non-finite denominators, non-finite numerators, and
/// non-finite or non-positive results become [`NEUTRAL_RATIO`]. Valid
/// results are clamped to [`RATIO_FLOOR`, `RATIO_CEILING`].
pub fn guarded_ratio(numerator: f64, denominator: f64) -> (f64, bool) {
    if !numerator.is_finite() || !denominator.is_finite() || denominator <= 0.0 {
        return (NEUTRAL_RATIO, true);
    }
    let ratio = numerator / denominator;
    if !ratio.is_finite() || ratio <= 0.0 {
        return (NEUTRAL_RATIO, true);
    }
    (ratio.clamp(RATIO_FLOOR, RATIO_CEILING), false)
}

/// Sample mean and Bessel-corrected standard deviation.
///
/// Non-finite values are ignored. Fewer than two samples yields a zero
/// standard deviation.
pub fn sample_stats(values: &[f64]) -> (f64, f64) {
    let valid: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if valid.is_empty() {
        return (0.0, 0.0);
    }
    let n = valid.len() as f64;
    let mean = valid.iter().sum::<f64>() / n;
    if valid.len() < 2 {
        return (mean, 0.0);
    }
    let variance = valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

/// Standardize `value`; a zero spread or non-finite result is neutral (0).
pub fn z_score(value: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev <= 0.0 || !std_dev.is_finite() {
        return 0.0;
    }
    let z = (value - mean) / std_dev;
    if z.is_finite() { z } else { 0.0 }
}

fn synthesize_point(
    snapshot: &MarketSnapshot,
    base_cap: f64,
    phase: f64,
    offset: f64,
) -> HistoricalPoint {
    let price_factor = price_factor(offset, phase);
    let supply_factor = (1.0 - DAILY_SUPPLY_GROWTH * offset).max(0.0);

    HistoricalPoint {
        date: NaiveDate::MIN,
        price: snapshot.price * price_factor,
        market_value: base_cap * price_factor * supply_factor,
        reference_value: base_cap * reference_factor(offset, phase),
        ratio: NEUTRAL_RATIO,
        z_score: 0.0,
        circulating_supply: snapshot.circulating_supply * supply_factor,
    }
}

/// Multiplier applied to the live price `offset` days ago. Equals 1 at 0.
fn price_factor(offset: f64, phase: f64) -> f64 {
    let yearly = -0.35 * (PI * offset / 365.0).sin();
    let monthly = 0.08 * ((2.0 * PI * offset / 45.0 + phase).sin() - phase.sin());
    1.0 + yearly + monthly
}

/// Reference value as a fraction of the base market value.
fn reference_factor(offset: f64, phase: f64) -> f64 {
    let yearly = -0.12 * (PI * offset / 365.0).sin();
    let quarterly = 0.05 * (2.0 * PI * offset / 120.0 + phase).cos();
    REFERENCE_BASE * (1.0 + yearly + quarterly)
}

/// Deterministic phase in [0, 2π) derived from the price magnitude.
fn snapshot_phase(price: f64) -> f64 {
    if !price.is_finite() || price <= 0.0 {
        return 0.0;
    }
    price.ln().rem_euclid(1.0) * 2.0 * PI
}

/// Market cap to scale the series by, falling back to price × supply.
fn base_market_cap(snapshot: &MarketSnapshot) -> f64 {
    if snapshot.market_cap.is_finite() && snapshot.market_cap > 0.0 {
        return snapshot.market_cap;
    }
    let derived = snapshot.price * snapshot.circulating_supply;
    if derived.is_finite() && derived > 0.0 {
        derived
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            symbol: "BTC".to_string(),
            price: 97_250.0,
            market_cap: 1_925_000_000_000.0,
            circulating_supply: 19_790_000.0,
            observed_at: Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_series_is_ordered_and_fixed_length() {
        let outcome = compute(&snapshot(), now(), DEFAULT_SERIES_LENGTH);
        assert_eq!(outcome.series.len(), 366);
        assert!(outcome.series.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(outcome.series.last().unwrap().date, now().date_naive());
    }

    #[test]
    fn test_latest_point_is_live_snapshot() {
        let snap = snapshot();
        let outcome = compute(&snap, now(), DEFAULT_SERIES_LENGTH);
        let latest = outcome.series.last().unwrap();
        assert_eq!(latest.price, snap.price);
        assert_eq!(latest.market_value, snap.market_cap);
        assert_eq!(outcome.score, latest.z_score);
    }

    #[test]
    fn test_deterministic_for_same_inputs() {
        let a = compute(&snapshot(), now(), DEFAULT_SERIES_LENGTH);
        let b = compute(&snapshot(), now(), DEFAULT_SERIES_LENGTH);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ratios_clamped_and_z_scores_finite() {
        let outcome = compute(&snapshot(), now(), DEFAULT_SERIES_LENGTH);
        for point in &outcome.series {
            assert!((RATIO_FLOOR..=RATIO_CEILING).contains(&point.ratio));
            assert!(point.z_score.is_finite());
        }
        assert_eq!(outcome.stats.neutralized, 0);
    }

    #[test]
    fn test_z_scores_are_centered() {
        let outcome = compute(&snapshot(), now(), DEFAULT_SERIES_LENGTH);
        let mean_z = outcome.series.iter().map(|p| p.z_score).sum::<f64>()
            / outcome.series.len() as f64;
        assert!(mean_z.abs() < 0.1, "mean z-score was {mean_z}");
    }

    #[test]
    fn test_zero_market_data_is_neutralized() {
        let snap = MarketSnapshot {
            price: 0.0,
            market_cap: 0.0,
            circulating_supply: 0.0,
            ..snapshot()
        };
        let outcome = compute(&snap, now(), 30);
        assert_eq!(outcome.stats.neutralized, 30);
        assert!(outcome.series.iter().all(|p| p.ratio == NEUTRAL_RATIO));
        assert_eq!(outcome.score, 0.0);
    }

    #[test]
    fn test_guarded_ratio() {
        assert_eq!(guarded_ratio(5.0, 0.0), (NEUTRAL_RATIO, true));
        assert_eq!(guarded_ratio(5.0, -2.0), (NEUTRAL_RATIO, true));
        assert_eq!(guarded_ratio(f64::NAN, 2.0), (NEUTRAL_RATIO, true));
        assert_eq!(guarded_ratio(1e9, 1.0), (RATIO_CEILING, false));
        assert_eq!(guarded_ratio(1.0, 1e9), (RATIO_FLOOR, false));
        assert_eq!(guarded_ratio(3.0, 2.0), (1.5, false));
    }

    #[test]
    fn test_sample_stats_uses_bessel_correction() {
        let (mean, std) = sample_stats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-12);
        // Population std is 2.0; sample std is sqrt(32 / 7).
        assert!((std - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_z_score_neutral_on_zero_spread() {
        assert_eq!(z_score(3.0, 3.0, 0.0), 0.0);
        assert_eq!(z_score(3.0, 1.0, f64::NAN), 0.0);
        assert_eq!(z_score(3.0, 1.0, 2.0), 1.0);
    }

    #[test]
    fn test_single_point_series() {
        let outcome = compute(&snapshot(), now(), 0);
        assert_eq!(outcome.series.len(), 1);
        assert_eq!(outcome.score, 0.0);
    }
}
