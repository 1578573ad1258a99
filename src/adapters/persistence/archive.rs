//! Result Archive - Append-only JSONL Records
//!
//! Persists consensus results and risk assessments to daily JSONL
//! files in the format `archive/<kind>/YYYY-MM-DD.jsonl`. Each line is
//! a self-contained JSON record for easy parsing and streaming.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{instrument, warn};

use crate::ports::repository::{ArchiveRecord, ArchiveRepository};

/// Append-only JSONL archive with daily file rotation.
///
/// Files are partitioned by record kind, then by the record's own
/// timestamp, so a late write still lands in the right day.
pub struct JsonlArchive {
    /// Base directory for archive files.
    archive_dir: PathBuf,
}

impl JsonlArchive {
    /// Create a new archive in the given data directory.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let archive_dir = Path::new(data_dir).join("archive");

        fs::create_dir_all(&archive_dir)
            .await
            .context("Failed to create archive directory")?;

        Ok(Self { archive_dir })
    }

    fn path_for(&self, record: &ArchiveRecord) -> PathBuf {
        let date = record.timestamp().format("%Y-%m-%d");
        self.archive_dir
            .join(record.kind())
            .join(format!("{date}.jsonl"))
    }

    /// Load every record of one kind, oldest file first.
    #[instrument(skip(self))]
    pub async fn load_kind(&self, kind: &str) -> Result<Vec<ArchiveRecord>> {
        let dir = self.archive_dir.join(kind);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut records = Vec::new();
        for path in paths {
            let content = fs::read_to_string(&path).await?;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<ArchiveRecord>(line) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(
                            file = %path.display(),
                            error = %e,
                            "Skipping malformed archive record"
                        );
                    }
                }
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl ArchiveRepository for JsonlArchive {
    #[instrument(skip(self, record), fields(kind = record.kind()))]
    async fn store(&self, record: &ArchiveRecord) -> Result<()> {
        let path = self.path_for(record);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create archive partition")?;
        }

        let mut json = serde_json::to_string(record)
            .context("Failed to serialize archive record")?;
        json.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context("Failed to open archive file")?;

        file.write_all(json.as_bytes())
            .await
            .context("Failed to write archive record")?;

        file.flush().await.context("Failed to flush archive")?;

        Ok(())
    }

    /// Check if the archive directory is writable.
    async fn is_healthy(&self) -> bool {
        let test_path = self.archive_dir.join(".health_check");
        let result = fs::write(&test_path, b"ok").await;
        let _ = fs::remove_file(&test_path).await;
        result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric::{ConsensusResult, Metric};
    use crate::domain::risk::RiskAssessment;
    use crate::ports::repository::RiskRecord;
    use chrono::{TimeZone, Utc};

    fn consensus_record() -> ArchiveRecord {
        ArchiveRecord::Consensus {
            metric: Metric::BtcDominance,
            result: ConsensusResult {
                value: 60.75,
                previous_value: 60.0,
                change_24h: 0.75,
                change_percent_24h: 1.25,
                source: "coingecko + coinmarketcap (averaged)".to_string(),
                confidence: 0.95,
                observed_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            },
        }
    }

    #[tokio::test]
    async fn test_store_partitions_by_kind_and_day() {
        let dir = tempfile::tempdir().unwrap();
        let archive = JsonlArchive::new(dir.path().to_str().unwrap()).await.unwrap();

        archive.store(&consensus_record()).await.unwrap();
        archive.store(&consensus_record()).await.unwrap();

        let file = dir.path().join("archive/consensus/2024-03-01.jsonl");
        let content = tokio::fs::read_to_string(file).await.unwrap();
        assert_eq!(content.lines().count(), 2);

        let loaded = archive.load_kind("consensus").await.unwrap();
        assert_eq!(loaded, vec![consensus_record(), consensus_record()]);
    }

    #[tokio::test]
    async fn test_risk_records_kept_apart() {
        let dir = tempfile::tempdir().unwrap();
        let archive = JsonlArchive::new(dir.path().to_str().unwrap()).await.unwrap();

        let risk = ArchiveRecord::Risk(RiskRecord {
            symbol: "BTC".to_string(),
            assessment: RiskAssessment::classify(1.7),
            ratio: 2.4,
            confidence: 0.75,
            fallback: false,
            computed_at: Utc::now(),
        });
        archive.store(&risk).await.unwrap();

        assert_eq!(archive.load_kind("risk").await.unwrap().len(), 1);
        assert!(archive.load_kind("consensus").await.unwrap().is_empty());
        assert!(archive.is_healthy().await);
    }
}
