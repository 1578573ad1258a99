//! Indicator and Consensus Benchmarks - Refresh Path Performance
//!
//! Benchmarks the pure domain functions that run on every refresh.
//!
//! Run with: cargo bench --bench indicator_bench

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use market_consensus::domain::consensus::{reconcile, ConsensusParams, SourceOutcome};
use market_consensus::domain::indicator::{compute, DEFAULT_SERIES_LENGTH};
use market_consensus::domain::metric::{MarketSnapshot, MetricReading};
use market_consensus::domain::risk::RiskAssessment;

fn snapshot() -> MarketSnapshot {
    MarketSnapshot {
        symbol: "BTC".to_string(),
        price: 64_000.0,
        market_cap: 1_260_000_000_000.0,
        circulating_supply: 19_700_000.0,
        observed_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
    }
}

/// Benchmark a full-year series synthesis and score.
fn bench_indicator_compute(c: &mut Criterion) {
    let snapshot = snapshot();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

    c.bench_function("indicator_compute_366", |b| {
        b.iter(|| {
            let _outcome = compute(black_box(&snapshot), black_box(now), DEFAULT_SERIES_LENGTH);
        });
    });
}

/// Benchmark risk ladder classification.
fn bench_risk_classify(c: &mut Criterion) {
    c.bench_function("risk_classify", |b| {
        b.iter(|| {
            let _risk = RiskAssessment::classify(black_box(1.7));
        });
    });
}

/// Benchmark reconciliation with three agreeing secondaries.
fn bench_reconcile(c: &mut Criterion) {
    let params = ConsensusParams::default();
    let primary = SourceOutcome::ok(MetricReading::new(54.2, "coingecko").with_daily_change(Some(0.4), 0.74));
    let secondaries = vec![
        SourceOutcome::ok(MetricReading::new(54.6, "coinmarketcap")),
        SourceOutcome::ok(MetricReading::new(53.9, "scraper")),
        SourceOutcome::failed("blockchain", "does not support dominance"),
    ];
    let now = Utc::now();

    c.bench_function("reconcile_dominance", |b| {
        b.iter(|| {
            let _result = reconcile(
                "BTC dominance",
                black_box(&primary),
                black_box(&secondaries),
                &params,
                now,
            );
        });
    });
}

criterion_group!(
    benches,
    bench_indicator_compute,
    bench_risk_classify,
    bench_reconcile,
);
criterion_main!(benches);
