//! Run records: one per trigger, durable, immutable once an outcome is set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::agents::{CuratedItem, Draft, VerificationReport};
use crate::error::{ErrorKind, StoreError};
use crate::ingest::types::NewsItem;
use crate::store::{read_json, write_json_atomic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Published,
    SentToReview,
    SkippedNoNews,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Published => "published",
            Outcome::SentToReview => "sent_to_review",
            Outcome::SkippedNoNews => "skipped_no_news",
            Outcome::Failed => "failed",
        }
    }

    /// Whether the seen index is committed for runs ending here.
    pub fn commits_index(&self) -> bool {
        !matches!(self, Outcome::Failed)
    }
}

/// Last state the run entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStage {
    Fetching,
    Deduplicating,
    Curating,
    Writing,
    Verifying,
    Gating,
    Publishing,
    Reviewing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: ErrorKind,
    pub stage: RunStage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub stage: RunStage,
    #[serde(default)]
    pub fetched_items: Vec<NewsItem>,
    #[serde(default)]
    pub failed_sources: Vec<String>,
    /// Ids that survived dedup; these are what the run considered.
    #[serde(default)]
    pub considered_ids: Vec<String>,
    #[serde(default)]
    pub dropped_count: usize,
    #[serde(default)]
    pub curated_items: Vec<CuratedItem>,
    #[serde(default)]
    pub draft: Option<Draft>,
    #[serde(default)]
    pub verification: Option<VerificationReport>,
    #[serde(default)]
    pub revisions: u32,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub published_url: Option<String>,
    #[serde(default)]
    pub error: Option<RunError>,
}

impl RunRecord {
    pub fn start(run_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: now,
            finished_at: None,
            stage: RunStage::Fetching,
            fetched_items: Vec::new(),
            failed_sources: Vec::new(),
            considered_ids: Vec::new(),
            dropped_count: 0,
            curated_items: Vec::new(),
            draft: None,
            verification: None,
            revisions: 0,
            outcome: None,
            published_url: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn finish(&mut self, outcome: Outcome, now: DateTime<Utc>) {
        self.outcome = Some(outcome);
        self.stage = RunStage::Done;
        self.finished_at = Some(now);
    }

    /// Attach an error without changing the outcome (e.g. a publish failure
    /// that still ends in review).
    pub fn record_error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.error = Some(RunError {
            kind,
            stage: self.stage,
            message: message.into(),
        });
    }
}

/// Run ids double as file names.
pub fn is_valid_run_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError>;
    /// Insert or update. Fails with [`StoreError::Immutable`] if the stored
    /// record already has an outcome.
    async fn save(&self, record: &RunRecord) -> Result<(), StoreError>;
    /// Most recently started first.
    async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError>;
}

/// One JSON file per run under `dir`.
pub struct JsonRunStore {
    dir: PathBuf,
}

impl JsonRunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, run_id: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_run_id(run_id) {
            return Err(StoreError::Io {
                path: self.dir.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("invalid run id {run_id:?}"),
                ),
            });
        }
        Ok(self.dir.join(format!("{run_id}.json")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl RunStore for JsonRunStore {
    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        if !is_valid_run_id(run_id) {
            return Ok(None);
        }
        read_json(&self.path_for(run_id)?).await
    }

    async fn save(&self, record: &RunRecord) -> Result<(), StoreError> {
        let path = self.path_for(&record.run_id)?;
        if let Some(existing) = read_json::<RunRecord>(&path).await? {
            if existing.is_terminal() {
                return Err(StoreError::Immutable {
                    run_id: record.run_id.clone(),
                });
            }
        }
        write_json_atomic(&path, record).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut rd = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };
        let mut out = Vec::new();
        while let Some(entry) = rd.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<RunRecord>(&path).await {
                Ok(Some(r)) => out.push(r),
                Ok(None) => {}
                Err(e) => tracing::warn!(target: "pipeline", error = %e, "skipping unreadable run record"),
            }
        }
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        out.truncate(limit);
        Ok(out)
    }
}

#[derive(Default)]
pub struct MemoryRunStore {
    inner: Mutex<HashMap<String, RunRecord>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        Ok(self.inner.lock().await.get(run_id).cloned())
    }

    async fn save(&self, record: &RunRecord) -> Result<(), StoreError> {
        let mut map = self.inner.lock().await;
        if map.get(&record.run_id).is_some_and(RunRecord::is_terminal) {
            return Err(StoreError::Immutable {
                run_id: record.run_id.clone(),
            });
        }
        map.insert(record.run_id.clone(), record.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        let mut out: Vec<RunRecord> = self.inner.lock().await.values().cloned().collect();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        out.truncate(limit);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_charset() {
        assert!(is_valid_run_id("3f0c-ab_12"));
        assert!(!is_valid_run_id("../etc/passwd"));
        assert!(!is_valid_run_id(""));
    }

    #[tokio::test]
    async fn terminal_records_are_immutable() {
        let store = MemoryRunStore::new();
        let mut r = RunRecord::start("r1", Utc::now());
        store.save(&r).await.unwrap();
        r.stage = RunStage::Curating;
        store.save(&r).await.unwrap();
        r.finish(Outcome::SkippedNoNews, Utc::now());
        store.save(&r).await.unwrap();

        r.published_url = Some("x".into());
        let err = store.save(&r).await.unwrap_err();
        assert!(matches!(err, StoreError::Immutable { .. }));
        assert!(store.get("r1").await.unwrap().unwrap().published_url.is_none());
    }
}
