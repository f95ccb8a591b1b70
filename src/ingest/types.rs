// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::ingest::item_id;

/// One normalized article. `id` is derived from the canonical URL so the same
/// article fetched twice (or from two feeds) collapses to one id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub source_name: String,
}

impl NewsItem {
    pub fn new(
        title: impl Into<String>,
        summary: impl Into<String>,
        url: impl Into<String>,
        published_at: DateTime<Utc>,
        source_name: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self {
            id: item_id(&url),
            title: title.into(),
            summary: summary.into(),
            url,
            published_at,
            source_name: source_name.into(),
        }
    }
}

/// Feed-style (RSS/Atom) vs query-API-style source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Feed,
    Query,
}

#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Items published at or after `since`.
    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<NewsItem>, FetchError>;
    fn name(&self) -> &str;
    fn kind(&self) -> SourceKind;
}

/// Merged output of one fetch across all sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FetchReport {
    /// Newest first, one entry per id.
    pub items: Vec<NewsItem>,
    /// Names of sources that failed or timed out this fetch.
    pub failed_sources: Vec<String>,
}
