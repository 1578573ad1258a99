//! Domain layer - Core metric models and pure reconciliation math.
//!
//! This module contains the pure logic of the consensus service: metric
//! types, threshold-gated consensus, the valuation ratio series, risk
//! bands and schedule parsing. No I/O happens here (hexagonal architecture
//! inner ring), so everything is testable in isolation.

pub mod consensus;
pub mod indicator;
pub mod metric;
pub mod risk;
pub mod schedule;

// Re-export core types for convenience
pub use consensus::{ConsensusParams, DiffMode, SourceOutcome};
pub use indicator::{HistoricalPoint, IndicatorOutcome, SeriesStats};
pub use metric::{ConsensusResult, MarketSnapshot, Metric, MetricReading, NetworkStats};
pub use risk::{RiskAssessment, RiskBand, RiskLevel};
pub use schedule::Schedule;
