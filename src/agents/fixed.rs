// src/agents/fixed.rs
//! Scripted capabilities for tests and offline runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::agents::{
    CuratedItem, Curator, CurationResult, Draft, VerificationReport, Verifier, Writer,
};
use crate::error::{CapabilityError, CapabilityStage};
use crate::ingest::types::NewsItem;

enum CuratorMode {
    FirstN(usize),
    Verbatim(Vec<CuratedItem>),
    Fail(String),
    Stall(Duration),
}

pub struct FixedCurator {
    mode: CuratorMode,
    calls: AtomicUsize,
}

impl FixedCurator {
    /// Picks the first `n` inputs in order.
    pub fn first(n: usize) -> Self {
        Self::with(CuratorMode::FirstN(n))
    }

    pub fn nothing() -> Self {
        Self::first(0)
    }

    /// Returns `items` regardless of input, so it can break the contract.
    pub fn verbatim(items: Vec<NewsItem>) -> Self {
        Self::with(CuratorMode::Verbatim(
            items
                .into_iter()
                .map(|item| CuratedItem::new(item, "scripted"))
                .collect(),
        ))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with(CuratorMode::Fail(message.into()))
    }

    pub fn stalling(d: Duration) -> Self {
        Self::with(CuratorMode::Stall(d))
    }

    fn with(mode: CuratorMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Curator for FixedCurator {
    async fn select(&self, items: &[NewsItem]) -> Result<CurationResult, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            CuratorMode::FirstN(n) => Ok(CurationResult {
                items: items
                    .iter()
                    .take(*n)
                    .map(|it| CuratedItem::new(it.clone(), format!("{} is new", it.title)))
                    .collect(),
            }),
            CuratorMode::Verbatim(v) => Ok(CurationResult { items: v.clone() }),
            CuratorMode::Fail(m) => Err(CapabilityError::failed(CapabilityStage::Curation, m.clone())),
            CuratorMode::Stall(d) => {
                tokio::time::sleep(*d).await;
                Ok(CurationResult::empty())
            }
        }
    }
}

/// Writes one line per curated item and cites exactly the curated urls,
/// plus any extra urls it was told to add.
#[derive(Default)]
pub struct CitingWriter {
    extra_citations: Vec<String>,
    revises: bool,
    fail: Option<String>,
    draft_calls: AtomicUsize,
    revise_calls: AtomicUsize,
}

impl CitingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extra_citation(mut self, url: impl Into<String>) -> Self {
        self.extra_citations.push(url.into());
        self
    }

    /// Revisions drop the extra citations and mark the body.
    pub fn revising(mut self) -> Self {
        self.revises = true;
        self
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn draft_calls(&self) -> usize {
        self.draft_calls.load(Ordering::SeqCst)
    }

    pub fn revise_calls(&self) -> usize {
        self.revise_calls.load(Ordering::SeqCst)
    }

    fn compose(curation: &CurationResult) -> String {
        curation
            .items
            .iter()
            .map(|c| format!("{}: {}", c.item.title, c.item.summary))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Writer for CitingWriter {
    async fn draft(&self, curation: &CurationResult) -> Result<Draft, CapabilityError> {
        self.draft_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(m) = &self.fail {
            return Err(CapabilityError::failed(CapabilityStage::Writing, m.clone()));
        }
        let citations = curation
            .urls()
            .into_iter()
            .map(str::to_string)
            .chain(self.extra_citations.iter().cloned());
        Ok(Draft::new(Self::compose(curation), citations))
    }

    async fn revise(
        &self,
        draft: &Draft,
        _report: &VerificationReport,
        curation: &CurationResult,
    ) -> Result<Option<Draft>, CapabilityError> {
        if !self.revises {
            return Ok(None);
        }
        self.revise_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Draft::new(
            format!("{}\n(revised)", draft.body),
            curation.urls(),
        )))
    }
}

/// Replays reports in order; the last one repeats once the script runs out.
pub struct FixedVerifier {
    script: Mutex<Vec<VerificationReport>>,
    fail: Option<String>,
    stall: Option<Duration>,
    calls: AtomicUsize,
}

impl FixedVerifier {
    pub fn returning(report: VerificationReport) -> Self {
        Self::script(vec![report])
    }

    pub fn script(reports: Vec<VerificationReport>) -> Self {
        let mut reports = reports;
        reports.reverse();
        Self {
            script: Mutex::new(reports),
            fail: None,
            stall: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail: Some(message.into()),
            ..Self::script(Vec::new())
        }
    }

    pub fn stalling(d: Duration) -> Self {
        Self {
            stall: Some(d),
            ..Self::returning(VerificationReport::passed(100))
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_report(&self) -> VerificationReport {
        let mut script = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if script.len() > 1 {
            script.pop().unwrap_or_else(|| VerificationReport::passed(100))
        } else {
            script
                .last()
                .cloned()
                .unwrap_or_else(|| VerificationReport::passed(100))
        }
    }
}

#[async_trait]
impl Verifier for FixedVerifier {
    async fn verify(
        &self,
        _draft: &Draft,
        _sources: &CurationResult,
    ) -> Result<VerificationReport, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.stall {
            tokio::time::sleep(d).await;
        }
        if let Some(m) = &self.fail {
            return Err(CapabilityError::failed(CapabilityStage::Verification, m.clone()));
        }
        Ok(self.next_report())
    }
}
