//! Repository Port - Archival Persistence Interface
//!
//! The core hands finished consensus results and risk assessments to an
//! archive for historical tracking. Archival is never required for the
//! correctness of the current response: callers log a failed `store` and
//! carry on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::metric::{ConsensusResult, Metric};
use crate::domain::risk::RiskAssessment;

/// Archived indicator outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRecord {
  /// Asset ticker the score was computed for.
  pub symbol: String,
  /// Classified score.
  pub assessment: RiskAssessment,
  /// Latest valuation ratio.
  pub ratio: f64,
  /// Confidence of the report (low for flagged fallbacks).
  pub confidence: f64,
  /// Whether the report is an outage placeholder.
  pub fallback: bool,
  /// Computation time.
  pub computed_at: DateTime<Utc>,
}

/// A record accepted by the archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArchiveRecord {
  /// A resolved metric value.
  Consensus {
    metric: Metric,
    result: ConsensusResult,
  },
  /// An indicator risk assessment.
  Risk(RiskRecord),
}

impl ArchiveRecord {
  /// Short kind label for logs and file partitioning.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Consensus { .. } => "consensus",
      Self::Risk(_) => "risk",
    }
  }

  /// Timestamp the record is filed under.
  pub fn timestamp(&self) -> DateTime<Utc> {
    match self {
      Self::Consensus { result, .. } => result.observed_at,
      Self::Risk(record) => record.computed_at,
    }
  }
}

/// Trait for archive providers.
#[async_trait]
pub trait ArchiveRepository: Send + Sync + 'static {
  /// Persist one record.
  async fn store(&self, record: &ArchiveRecord) -> anyhow::Result<()>;

  /// Check if the archive is healthy (disk space, permissions).
  async fn is_healthy(&self) -> bool;
}
