//! # Deduplicator
//! Rolling-window suppression of items already seen by earlier runs.
//!
//! The [`SeenItemIndex`] maps item id → last-seen time and is pruned to the
//! window on every commit. It lives in a durable [`SeenIndexStore`] so the
//! window survives restarts. Filtering never mutates the index; only
//! [`Deduplicator::commit`] does, and the orchestrator calls it once a run
//! reaches a committing outcome.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::ingest::types::NewsItem;
use crate::store::{read_json, write_json_atomic};

pub const DEFAULT_WINDOW_DAYS: i64 = 14;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenItemIndex {
    entries: HashMap<String, DateTime<Utc>>,
}

impl SeenItemIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_seen(&self, id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(id).copied()
    }

    /// Fresh iff never seen, or last seen before `now - window`.
    pub fn is_fresh(&self, id: &str, now: DateTime<Utc>, window: Duration) -> bool {
        match self.entries.get(id) {
            None => true,
            Some(ts) => *ts < now - window,
        }
    }

    pub fn record<'a, I>(&mut self, ids: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for id in ids {
            self.entries.insert(id.to_string(), now);
        }
    }

    /// Drop entries that fell out of the window. Returns how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff = now - window;
        let before = self.entries.len();
        self.entries.retain(|_, ts| *ts >= cutoff);
        before - self.entries.len()
    }
}

#[async_trait]
pub trait SeenIndexStore: Send + Sync {
    async fn load(&self) -> Result<SeenItemIndex, StoreError>;
    async fn save(&self, index: &SeenItemIndex) -> Result<(), StoreError>;
}

/// Index persisted as one JSON file.
pub struct JsonSeenIndexStore {
    path: PathBuf,
}

impl JsonSeenIndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SeenIndexStore for JsonSeenIndexStore {
    async fn load(&self) -> Result<SeenItemIndex, StoreError> {
        Ok(read_json(&self.path).await?.unwrap_or_default())
    }

    async fn save(&self, index: &SeenItemIndex) -> Result<(), StoreError> {
        write_json_atomic(&self.path, index).await
    }
}

/// Process-local store for tests and dry runs.
#[derive(Default)]
pub struct MemorySeenIndexStore {
    inner: Mutex<SeenItemIndex>,
}

impl MemorySeenIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> SeenItemIndex {
        self.inner.lock().await.clone()
    }
}

#[async_trait]
impl SeenIndexStore for MemorySeenIndexStore {
    async fn load(&self) -> Result<SeenItemIndex, StoreError> {
        Ok(self.inner.lock().await.clone())
    }

    async fn save(&self, index: &SeenItemIndex) -> Result<(), StoreError> {
        *self.inner.lock().await = index.clone();
        Ok(())
    }
}

pub struct Deduplicator {
    store: std::sync::Arc<dyn SeenIndexStore>,
    window: Duration,
}

impl Deduplicator {
    pub fn new(store: std::sync::Arc<dyn SeenIndexStore>, window_days: i64) -> Self {
        Self {
            store,
            window: Duration::days(window_days.max(1)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Split `items` into fresh ones and a count of dropped ones. Repeats of
    /// an id within the batch also count as dropped.
    pub async fn filter(
        &self,
        items: Vec<NewsItem>,
        now: DateTime<Utc>,
    ) -> Result<(Vec<NewsItem>, usize), StoreError> {
        let index = self.store.load().await?;
        let mut batch_ids = HashSet::with_capacity(items.len());
        let mut fresh = Vec::with_capacity(items.len());
        let mut dropped = 0usize;

        for it in items {
            if index.is_fresh(&it.id, now, self.window) && batch_ids.insert(it.id.clone()) {
                fresh.push(it);
            } else {
                dropped += 1;
            }
        }

        counter!("dedup_dropped_total").increment(dropped as u64);
        tracing::debug!(target: "dedup", fresh = fresh.len(), dropped, "dedup filter");
        Ok((fresh, dropped))
    }

    /// Record `ids` as seen at `now`, prune, persist. Returns the index size.
    pub async fn commit<'a, I>(&self, ids: I, now: DateTime<Utc>) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = &'a str> + Send,
        I::IntoIter: Send,
    {
        let mut index = self.store.load().await?;
        index.record(ids, now);
        let pruned = index.prune(now, self.window);
        self.store.save(&index).await?;

        gauge!("dedup_index_size").set(index.len() as f64);
        tracing::info!(target: "dedup", size = index.len(), pruned, "seen index committed");
        Ok(index.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn item(n: u32) -> NewsItem {
        NewsItem::new(
            format!("t{n}"),
            "",
            format!("https://news.example/{n}"),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            "S",
        )
    }

    #[test]
    fn freshness_boundary_is_inside_window() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap();
        let w = Duration::days(14);
        let mut idx = SeenItemIndex::default();
        idx.record(["a"], now - w);
        idx.record(["b"], now - w - Duration::seconds(1));
        assert!(!idx.is_fresh("a", now, w));
        assert!(idx.is_fresh("b", now, w));
        assert!(idx.is_fresh("c", now, w));
    }

    #[test]
    fn prune_drops_only_expired() {
        let now = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap();
        let w = Duration::days(14);
        let mut idx = SeenItemIndex::default();
        idx.record(["old"], now - Duration::days(20));
        idx.record(["new"], now - Duration::days(2));
        assert_eq!(idx.prune(now, w), 1);
        assert!(idx.last_seen("new").is_some());
        assert!(idx.last_seen("old").is_none());
    }

    #[tokio::test]
    async fn filter_does_not_mutate_until_commit() {
        let store = Arc::new(MemorySeenIndexStore::new());
        let d = Deduplicator::new(store.clone(), 14);
        let now = Utc::now();

        let (fresh, dropped) = d.filter(vec![item(1), item(2), item(1)], now).await.unwrap();
        assert_eq!(fresh.len(), 2);
        assert_eq!(dropped, 1);
        assert!(store.snapshot().await.is_empty());

        let ids: Vec<String> = fresh.iter().map(|i| i.id.clone()).collect();
        d.commit(ids.iter().map(String::as_str), now).await.unwrap();

        let (fresh2, dropped2) = d.filter(vec![item(1), item(3)], now).await.unwrap();
        assert_eq!(fresh2.len(), 1);
        assert_eq!(fresh2[0].title, "t3");
        assert_eq!(dropped2, 1);
    }
}
