//! Prometheus Metrics Registry - Consensus Service Observability
//!
//! Registers and exposes Prometheus metrics on :9090 for Grafana
//! dashboards. Covers cache tier effectiveness, resolution outcomes,
//! indicator output and refresh job health.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

/// Centralized Prometheus metrics for the consensus service.
///
/// All metrics follow the naming convention `market_consensus_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Cache hits by tier (`redis`, `memory`).
    pub cache_hits: IntCounterVec,
    /// Cache misses that fell through to compute.
    pub cache_misses: IntCounter,
    /// Primary tier failures absorbed by the fallback.
    pub cache_primary_errors: IntCounterVec,
    /// Resolutions by metric and outcome (`agreed`, `disagreed`, `single`, `failed`).
    pub resolutions: IntCounterVec,
    /// Confidence of the latest resolution per metric.
    pub consensus_confidence: GaugeVec,
    /// Latest indicator score.
    pub indicator_score: Gauge,
    /// Indicator reports served as outage placeholders.
    pub indicator_fallbacks: IntCounter,
    /// Job runs by job and status (`success`, `error`, `skipped`).
    pub job_runs: IntCounterVec,
    /// Job run duration in seconds.
    pub job_duration_seconds: HistogramVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cache_hits = IntCounterVec::new(
            Opts::new("market_consensus_cache_hits_total", "Cache hits by tier"),
            &["tier"],
        )?;

        let cache_misses = IntCounter::new(
            "market_consensus_cache_misses_total",
            "Cache misses that triggered a compute",
        )?;

        let cache_primary_errors = IntCounterVec::new(
            Opts::new(
                "market_consensus_cache_primary_errors_total",
                "Primary cache tier failures absorbed by the fallback",
            ),
            &["operation"],
        )?;

        let resolutions = IntCounterVec::new(
            Opts::new(
                "market_consensus_resolutions_total",
                "Consensus resolutions by outcome",
            ),
            &["metric", "outcome"],
        )?;

        let consensus_confidence = GaugeVec::new(
            Opts::new(
                "market_consensus_confidence",
                "Confidence of the latest resolution",
            ),
            &["metric"],
        )?;

        let indicator_score = Gauge::new(
            "market_consensus_indicator_score",
            "Latest indicator z-score",
        )?;

        let indicator_fallbacks = IntCounter::new(
            "market_consensus_indicator_fallbacks_total",
            "Indicator reports served as outage placeholders",
        )?;

        let job_runs = IntCounterVec::new(
            Opts::new("market_consensus_job_runs_total", "Refresh job runs by status"),
            &["job", "status"],
        )?;

        let job_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "market_consensus_job_duration_seconds",
                "Refresh job run duration in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["job"],
        )?;

        // Register all metrics
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(cache_primary_errors.clone()))?;
        registry.register(Box::new(resolutions.clone()))?;
        registry.register(Box::new(consensus_confidence.clone()))?;
        registry.register(Box::new(indicator_score.clone()))?;
        registry.register(Box::new(indicator_fallbacks.clone()))?;
        registry.register(Box::new(job_runs.clone()))?;
        registry.register(Box::new(job_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            cache_hits,
            cache_misses,
            cache_primary_errors,
            resolutions,
            consensus_confidence,
            indicator_score,
            indicator_fallbacks,
            job_runs,
            job_duration_seconds,
        })
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move { metrics.render() }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_metrics() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.cache_hits.with_label_values(&["memory"]).inc();
        metrics
            .resolutions
            .with_label_values(&["btc_dominance", "agreed"])
            .inc();

        let text = metrics.render();
        assert!(text.contains("market_consensus_cache_hits_total{tier=\"memory\"} 1"));
        assert!(text.contains("market_consensus_resolutions_total"));
    }
}
