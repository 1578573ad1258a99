//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP clients, Redis, file I/O). Each
//! sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `cache`: Redis primary tier and in-process fallback tier
//! - `providers`: CoinGecko, CoinMarketCap, Blockchain.com and page scraping
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: JSONL result archive

pub mod cache;
pub mod metrics;
pub mod persistence;
pub mod providers;
