//! Market Consensus Service - Entry Point
//!
//! Initializes configuration, logging, cache tiers and provider
//! adapters, then runs the refresh scheduler until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config (CONFIG_PATH or config.toml) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create Prometheus registry
//! 4. Connect Redis primary tier (optional, degrades to memory only)
//! 5. Create memory fallback tier + spawn expiry sweeper
//! 6. Build provider adapters (CoinGecko primary, secondaries per metric)
//! 7. Create ConsensusResolver + IndicatorCalculator
//! 8. Register refresh jobs and start the scheduler
//! 9. Spawn health server (/live + /ready) and metrics server (/metrics)
//! 10. Wait for SIGINT → graceful shutdown (stop scheduler→drain→exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use market_consensus::adapters::cache::{MemoryStore, RedisStore};
use market_consensus::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use market_consensus::adapters::persistence::archive::JsonlArchive;
use market_consensus::adapters::providers::ProviderSet;
use market_consensus::config::{self, AppConfig};
use market_consensus::ports::cache_store::CacheStore;
use market_consensus::ports::repository::ArchiveRepository;
use market_consensus::usecases::jobs::{
    DominanceRefreshJob, IndicatorRefreshJob, NetworkStatsRefreshJob, PriceRefreshJob,
    ProviderHealthJob,
};
use market_consensus::usecases::{
    ConsensusResolver, IndicatorCalculator, RefreshScheduler, TieredCache,
};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.service.log_level)
                }),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        redis = config.cache.redis_url.is_some(),
        price_symbols = config.consensus.price_symbols.len(),
        "Starting market consensus service"
    );

    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 3. Metrics registry ─────────────────────────────────
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);

    // ── 4-5. Cache tiers ────────────────────────────────────
    let cache = Arc::new(build_cache(&config, Arc::clone(&metrics), &shutdown_tx).await);

    // ── 6. Provider adapters ────────────────────────────────
    let providers = ProviderSet::from_config(&config.providers)
        .context("Failed to build provider adapters")?;

    let archive: Option<Arc<dyn ArchiveRepository>> = if config.persistence.enabled {
        let archive = JsonlArchive::new(&config.persistence.data_dir)
            .await
            .context("Failed to open result archive")?;
        Some(Arc::new(archive))
    } else {
        None
    };

    // ── 7. Use cases ────────────────────────────────────────
    let mut resolver = ConsensusResolver::new(Arc::clone(&providers.primary), Arc::clone(&cache))
        .with_dominance_secondaries(providers.dominance_secondaries.clone())
        .with_price_secondaries(providers.price_secondaries.clone())
        .with_params(
            config.consensus.dominance_params(),
            config.consensus.price_params(),
        )
        .with_provider_timeout(config.providers.timeout())
        .with_cache_ttl(config.cache.consensus_ttl())
        .with_metrics(Arc::clone(&metrics));

    let mut calculator = IndicatorCalculator::new(
        Arc::clone(&providers.primary),
        Arc::clone(&cache),
        config.indicator.symbol.clone(),
    )
    .with_series_length(config.indicator.series_length)
    .with_confidence(
        config.indicator.confidence,
        config.indicator.fallback_confidence,
    )
    .with_provider_timeout(config.providers.timeout())
    .with_snapshot_ttl(config.cache.snapshot_ttl())
    .with_metrics(Arc::clone(&metrics));

    if let Some(archive) = &archive {
        resolver = resolver.with_archive(Arc::clone(archive));
        calculator = calculator.with_archive(Arc::clone(archive));
    }
    let resolver = Arc::new(resolver);
    let calculator = Arc::new(calculator);

    // ── 8. Scheduler + jobs ─────────────────────────────────
    let health = Arc::new(HealthState::new());
    health.set_primary_cache_healthy(cache.primary_healthy().await);

    let scheduler =
        RefreshScheduler::with_metrics(config.scheduler.history_size, Arc::clone(&metrics));
    let sched = &config.scheduler;

    scheduler
        .add_job(Arc::new(DominanceRefreshJob::new(
            Arc::clone(&resolver),
            sched.dominance_schedule.clone(),
        )))
        .await?;
    scheduler
        .add_job(Arc::new(PriceRefreshJob::new(
            Arc::clone(&resolver),
            config.consensus.price_symbols.clone(),
            sched.price_schedule.clone(),
        )))
        .await?;
    scheduler
        .add_job(Arc::new(IndicatorRefreshJob::new(
            Arc::clone(&calculator),
            sched.indicator_schedule.clone(),
        )))
        .await?;
    if let Some(network) = &providers.network {
        scheduler
            .add_job(Arc::new(NetworkStatsRefreshJob::new(
                Arc::clone(network),
                Arc::clone(&cache),
                config.cache.network_stats_ttl(),
                config.providers.timeout(),
                sched.network_stats_schedule.clone(),
            )))
            .await?;
    } else {
        warn!("No network stats provider enabled, skipping network stats refresh");
    }
    scheduler
        .add_job(Arc::new(ProviderHealthJob::new(
            providers.all(),
            Arc::clone(&cache),
            Arc::clone(&health),
            config.providers.timeout(),
            sched.health_schedule.clone(),
        )))
        .await?;

    scheduler.start().await?;
    health.set_scheduler_running(true);

    // ── 9. Health + metrics servers ─────────────────────────
    let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
    let health_shutdown = shutdown_tx.subscribe();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    let metrics_handle = if config.metrics.enabled {
        let metrics_shutdown = shutdown_tx.subscribe();
        let bind = config.metrics.bind_address.clone();
        let metrics_ref = Arc::clone(&metrics);
        Some(tokio::spawn(async move {
            if let Err(e) = metrics_ref.serve(bind, metrics_shutdown).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    info!(jobs = scheduler.list_jobs().await.len(), "Service is running");

    // ── 10. Wait for SIGINT ─────────────────────────────────
    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("SIGINT received, initiating graceful shutdown");

    // 1. Readiness probe → 503
    health.set_scheduler_running(false);

    // 2. Stop scheduling and drain in-flight runs
    scheduler.stop().await;

    // 3. Stop servers and the cache sweeper
    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Build the tiered cache. A Redis outage at startup is not fatal: the
/// service runs on the memory tier alone.
async fn build_cache(
    config: &AppConfig,
    metrics: Arc<MetricsRegistry>,
    shutdown_tx: &broadcast::Sender<()>,
) -> TieredCache {
    let cache_cfg = &config.cache;

    let primary: Option<Arc<dyn CacheStore>> = match &cache_cfg.redis_url {
        Some(url) => match RedisStore::connect(
            url,
            cache_cfg.key_prefix.clone(),
            cache_cfg.operation_timeout(),
        )
        .await
        {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!(error = %e, "Redis unavailable, running on memory cache only");
                None
            }
        },
        None => {
            info!("No Redis URL configured, running on memory cache only");
            None
        }
    };

    let fallback = Arc::new(MemoryStore::new());
    Arc::clone(&fallback).spawn_sweeper(
        Duration::from_secs(cache_cfg.sweep_interval_seconds),
        shutdown_tx.subscribe(),
    );

    TieredCache::new(primary, fallback).with_metrics(metrics)
}
