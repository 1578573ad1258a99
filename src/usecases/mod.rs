//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces to implement
//! the service's core workflows. Each use case is a self-contained
//! business operation.
//!
//! Use cases:
//! - `TieredCache`: Read-through primary + fallback cache
//! - `ConsensusResolver`: Multi-provider metric reconciliation
//! - `IndicatorCalculator`: Valuation score and risk classification
//! - `RefreshScheduler`: Recurring refresh jobs with health tracking
//! - `jobs`: The concrete refresh jobs

pub mod consensus_resolver;
pub mod indicator_calculator;
pub mod jobs;
pub mod refresh_scheduler;
pub mod tiered_cache;

pub use consensus_resolver::ConsensusResolver;
pub use indicator_calculator::{IndicatorCalculator, IndicatorReport};
pub use refresh_scheduler::{Job, JobContext, JobStats, RefreshScheduler};
pub use tiered_cache::TieredCache;
