//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7 for Docker
//! health checks and monitoring. Readiness follows the refresh
//! scheduler; a degraded primary cache is reported but never makes the
//! service unready.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Shared health state polled by readiness probes.
#[derive(Debug, Clone)]
pub struct HealthState {
    /// Whether the refresh scheduler is running.
    pub scheduler_running: Arc<AtomicBool>,
    /// Whether the primary cache tier answered its last probe.
    pub primary_cache_healthy: Arc<AtomicBool>,
}

/// Body of the readiness probe.
#[derive(Debug, Serialize)]
struct ReadinessReport {
    ready: bool,
    scheduler_running: bool,
    primary_cache_healthy: bool,
}

impl HealthState {
    /// Create a new health state: not ready until the scheduler starts.
    pub fn new() -> Self {
        Self {
            scheduler_running: Arc::new(AtomicBool::new(false)),
            primary_cache_healthy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_scheduler_running(&self, running: bool) {
        self.scheduler_running.store(running, Ordering::Relaxed);
    }

    pub fn set_primary_cache_healthy(&self, healthy: bool) {
        self.primary_cache_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Last probed state of the primary cache tier.
    pub fn primary_cache_healthy(&self) -> bool {
        self.primary_cache_healthy.load(Ordering::Relaxed)
    }

    /// Check if the service is ready to serve traffic.
    pub fn is_ready(&self) -> bool {
        self.scheduler_running.load(Ordering::Relaxed)
    }

    fn report(&self) -> ReadinessReport {
        ReadinessReport {
            ready: self.is_ready(),
            scheduler_running: self.scheduler_running.load(Ordering::Relaxed),
            primary_cache_healthy: self.primary_cache_healthy(),
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Axum-based health check HTTP server.
///
/// Serves liveness (/live) and readiness (/ready) endpoints for
/// Docker health checks and orchestrator probes.
pub struct HealthServer {
    /// Health state shared with all components.
    state: Arc<HealthState>,
    /// Bind port (default 8080 from config).
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(Arc::clone(&self.state))
    }

    /// Start the health check server in the background.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(
        self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let app = self.router();

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: returns 200 only while the scheduler runs.
    async fn readiness(
        State(state): State<Arc<HealthState>>,
    ) -> impl IntoResponse {
        let report = state.report();
        let status = if report.ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status, Json(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_follows_scheduler_only() {
        let state = HealthState::new();
        assert!(!state.is_ready());

        state.set_scheduler_running(true);
        state.set_primary_cache_healthy(false);
        assert!(state.is_ready());

        state.set_scheduler_running(false);
        assert!(!state.is_ready());
    }
}
