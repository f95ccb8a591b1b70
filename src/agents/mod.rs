// src/agents/mod.rs
//! External capability contracts: Curator, Writer, Verifier.
//!
//! The pipeline only relies on the I/O contracts below. Any implementation
//! (model-backed, rule-based, a human behind a queue) is substitutable. The
//! contract checks at the bottom are what the orchestrator can enforce
//! without trusting the implementation.

pub mod fixed;
pub mod llm;
pub mod prompts;

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CapabilityError, CapabilityStage};
use crate::ingest::{item_id, short_sha256};
use crate::ingest::types::NewsItem;

/// Upper bound on curated items per run.
pub const MAX_CURATED: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratedItem {
    pub item: NewsItem,
    /// Why this item is newsworthy; passed on to the writer.
    pub justification: String,
    /// Page text when it could be fetched; the summary stands in otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
}

impl CuratedItem {
    pub fn new(item: NewsItem, justification: impl Into<String>) -> Self {
        Self {
            item,
            justification: justification.into(),
            full_text: None,
        }
    }
}

/// Ordered selection. Empty means "nothing newsworthy today".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurationResult {
    pub items: Vec<CuratedItem>,
}

impl CurationResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn urls(&self) -> Vec<&str> {
        self.items.iter().map(|c| c.item.url.as_str()).collect()
    }

    pub fn ids(&self) -> HashSet<&str> {
        self.items.iter().map(|c| c.item.id.as_str()).collect()
    }

    /// Whether `url` names a curated item, compared by canonical id.
    pub fn cites(&self, url: &str) -> bool {
        let id = item_id(url);
        self.items.iter().any(|c| c.item.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub body: String,
    pub citations: BTreeSet<String>,
}

impl Draft {
    pub fn new<I, S>(body: impl Into<String>, citations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            body: body.into(),
            citations: citations.into_iter().map(Into::into).collect(),
        }
    }

    /// Short content fingerprint for logs (the body itself is not logged).
    pub fn fingerprint(&self) -> String {
        content_fingerprint(&self.body)
    }
}

/// First 16 hex chars of SHA-256 over the exact body bytes.
pub fn content_fingerprint(body: &str) -> String {
    short_sha256(body.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub verified: bool,
    /// 0–100; advisory when `verified` is false.
    pub confidence: u8,
    pub issues: Vec<String>,
}

impl VerificationReport {
    /// Builds a report that upholds the invariants: confidence capped at 100,
    /// and `verified` only when there are no issues.
    pub fn new(verified: bool, confidence: u8, issues: Vec<String>) -> Self {
        Self {
            verified: verified && issues.is_empty(),
            confidence: confidence.min(100),
            issues,
        }
    }

    pub fn passed(confidence: u8) -> Self {
        Self::new(true, confidence, Vec::new())
    }

    pub fn failed(confidence: u8, issues: Vec<String>) -> Self {
        Self::new(false, confidence, issues)
    }

    /// Re-apply the invariants to a report from an untrusted verifier.
    pub fn normalized(self) -> Self {
        Self::new(self.verified, self.confidence, self.issues)
    }
}

#[async_trait]
pub trait Curator: Send + Sync {
    /// Pick 0..=5 items from `items`, in presentation order.
    async fn select(&self, items: &[NewsItem]) -> Result<CurationResult, CapabilityError>;
}

#[async_trait]
pub trait Writer: Send + Sync {
    /// Draft content citing only urls from `curation`.
    async fn draft(&self, curation: &CurationResult) -> Result<Draft, CapabilityError>;

    /// Rewrite `draft` keeping only material the report did not flag.
    /// `Ok(None)` means this writer does not revise.
    async fn revise(
        &self,
        _draft: &Draft,
        _report: &VerificationReport,
        _curation: &CurationResult,
    ) -> Result<Option<Draft>, CapabilityError> {
        Ok(None)
    }
}

#[async_trait]
pub trait Verifier: Send + Sync {
    /// Score `draft` against `sources`; unsupported claims become issues.
    async fn verify(
        &self,
        draft: &Draft,
        sources: &CurationResult,
    ) -> Result<VerificationReport, CapabilityError>;
}

/// Curator output must be a subset of its input and at most [`MAX_CURATED`] long.
pub fn check_curation(input: &[NewsItem], result: &CurationResult) -> Result<(), CapabilityError> {
    if result.len() > MAX_CURATED {
        return Err(CapabilityError::breach(
            CapabilityStage::Curation,
            format!("selected {} items, at most {MAX_CURATED} allowed", result.len()),
        ));
    }
    let known: HashSet<&str> = input.iter().map(|i| i.id.as_str()).collect();
    let mut picked = HashSet::with_capacity(result.len());
    for c in &result.items {
        if !known.contains(c.item.id.as_str()) {
            return Err(CapabilityError::breach(
                CapabilityStage::Curation,
                format!("selected unknown item {}", c.item.url),
            ));
        }
        if !picked.insert(c.item.id.as_str()) {
            return Err(CapabilityError::breach(
                CapabilityStage::Curation,
                format!("selected {} twice", c.item.url),
            ));
        }
    }
    Ok(())
}

/// Safety net for writer contract breaches: every citation outside the
/// curation becomes an issue and forces `verified` to false.
pub fn enforce_citations(
    draft: &Draft,
    curation: &CurationResult,
    report: VerificationReport,
) -> VerificationReport {
    let mut issues = report.issues;
    for url in &draft.citations {
        if !curation.cites(url) {
            issues.push(format!("citation not among curated sources: {url}"));
        }
    }
    VerificationReport::new(report.verified, report.confidence, issues)
}
