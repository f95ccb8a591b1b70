// src/ingest/providers/fixed.rs
//! In-memory provider returning a fixed batch, an error, or a stall.
//! Used by tests and by offline runs that replay a captured batch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::ingest::types::{NewsItem, SourceKind, SourceProvider};

enum Behaviour {
    Items(Vec<NewsItem>),
    Fail(String),
    Stall(Duration),
}

pub struct FixedProvider {
    name: String,
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl FixedProvider {
    pub fn items(name: impl Into<String>, items: Vec<NewsItem>) -> Self {
        Self::with(name, Behaviour::Items(items))
    }

    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with(name, Behaviour::Fail(message.into()))
    }

    /// Sleeps for `d` before returning nothing; exercises per-source timeouts.
    pub fn stalling(name: impl Into<String>, d: Duration) -> Self {
        Self::with(name, Behaviour::Stall(d))
    }

    fn with(name: impl Into<String>, behaviour: Behaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceProvider for FixedProvider {
    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<NewsItem>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Items(v) => Ok(v
                .iter()
                .filter(|it| it.published_at >= since)
                .cloned()
                .collect()),
            Behaviour::Fail(msg) => Err(FetchError::Unreachable {
                source_name: self.name.clone(),
                message: msg.clone(),
            }),
            Behaviour::Stall(d) => {
                tokio::time::sleep(*d).await;
                Ok(Vec::new())
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Feed
    }
}
