//! # PipelineOrchestrator
//! Sequences one run: fetch → dedup → curate → write → verify → gate →
//! publish | review, and owns the run's record.
//!
//! A run holds the orchestrator's lock from start to terminal state, so the
//! seen index and the credential only ever have one writer. The record is
//! persisted at fixed checkpoints (start, after dedup, before publish, at
//! the end); the seen index is committed once, after the terminal record.
//! Cancellation stops the run at the next suspension point and leaves the
//! outcome unset.

use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge};
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::Instrument;

use crate::agents::{
    check_curation, enforce_citations, Curator, CurationResult, Draft, VerificationReport,
    Verifier, Writer,
};
use crate::dedup::Deduplicator;
use crate::error::{CapabilityError, CapabilityStage, ErrorKind, PipelineError, PublishError};
use crate::gate::{GateDecision, QualityGate};
use crate::ingest::article::{attach_full_text, ArticleFetcher};
use crate::ingest::SourceFetcher;
use crate::publish::Publisher;
use crate::review::ReviewSink;
use crate::runs::{Outcome, RunRecord, RunStage, RunStore};

pub const DEFAULT_HOURS_BACK: i64 = 48;
pub const DEFAULT_CAPABILITY_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(60);

/// The three external capabilities a run calls, in order.
#[derive(Clone)]
pub struct Capabilities {
    pub curator: Arc<dyn Curator>,
    pub writer: Arc<dyn Writer>,
    pub verifier: Arc<dyn Verifier>,
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub hours_back: i64,
    pub capability_timeout: Duration,
    pub publish_timeout: Duration,
    /// Rewrite-and-reverify rounds after a gate rejection.
    pub max_revisions: u32,
    pub gate: QualityGate,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            hours_back: DEFAULT_HOURS_BACK,
            capability_timeout: DEFAULT_CAPABILITY_TIMEOUT,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            max_revisions: 0,
            gate: QualityGate::default(),
        }
    }
}

/// Proof of holding the run lock. Dropping it ends the run's exclusivity.
pub struct RunPermit {
    _guard: OwnedMutexGuard<()>,
    cancel: watch::Receiver<bool>,
}

/// A run whose initial record is already persisted.
pub struct StartedRun {
    permit: RunPermit,
    record: RunRecord,
}

impl StartedRun {
    pub fn run_id(&self) -> &str {
        &self.record.run_id
    }
}

pub enum Begun {
    Fresh(StartedRun),
    /// The id already reached a terminal outcome; nothing was re-executed.
    Replayed(RunRecord),
}

pub struct Orchestrator {
    fetcher: Arc<SourceFetcher>,
    articles: Option<Arc<dyn ArticleFetcher>>,
    dedup: Deduplicator,
    caps: Capabilities,
    publisher: Arc<Publisher>,
    review: ReviewSink,
    runs: Arc<dyn RunStore>,
    settings: RunSettings,
    lock: Arc<Mutex<()>>,
    cancel_tx: StdMutex<Option<watch::Sender<bool>>>,
}

/// Resolves once cancellation is requested; never if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|c| *c).await.map(|_| ()).is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

async fn publish_within<F>(limit: Duration, fut: F) -> Result<String, PublishError>
where
    F: Future<Output = Result<String, PublishError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(r) => r,
        Err(_) => Err(PublishError::Timeout {
            secs: limit.as_secs(),
        }),
    }
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<SourceFetcher>,
        dedup: Deduplicator,
        caps: Capabilities,
        publisher: Arc<Publisher>,
        review: ReviewSink,
        runs: Arc<dyn RunStore>,
        settings: RunSettings,
    ) -> Self {
        Self {
            fetcher,
            articles: None,
            dedup,
            caps,
            publisher,
            review,
            runs,
            settings,
            lock: Arc::new(Mutex::new(())),
            cancel_tx: StdMutex::new(None),
        }
    }

    /// Attach page text to curated items before writing. Each page gets the
    /// fetcher's per-source timeout.
    pub fn with_article_fetcher(mut self, articles: Arc<dyn ArticleFetcher>) -> Self {
        self.articles = Some(articles);
        self
    }

    pub fn fetcher(&self) -> &Arc<SourceFetcher> {
        &self.fetcher
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    pub fn runs(&self) -> &Arc<dyn RunStore> {
        &self.runs
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Take the run lock without waiting.
    pub fn try_begin(&self) -> Result<RunPermit, PipelineError> {
        let guard = self.lock.clone().try_lock_owned().map_err(|_| {
            counter!("pipeline_busy_total").increment(1);
            PipelineError::Busy
        })?;
        let (tx, rx) = watch::channel(false);
        *self
            .cancel_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(tx);
        Ok(RunPermit {
            _guard: guard,
            cancel: rx,
        })
    }

    /// Ask the in-flight run to stop. Returns false when nothing is running.
    pub fn cancel_current(&self) -> bool {
        let slot = self
            .cancel_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match slot.as_ref() {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        }
    }

    /// Lock, resolve the run id, and persist the initial record.
    ///
    /// A stored terminal record for `run_id` is returned as is; a stored
    /// record without an outcome is a crashed run and is refused.
    pub async fn begin(&self, run_id: Option<String>) -> Result<Begun, PipelineError> {
        let permit = self.try_begin()?;
        let run_id = run_id.unwrap_or_else(new_run_id);

        if let Some(existing) = self.runs.get(&run_id).await? {
            if existing.is_terminal() {
                tracing::info!(target: "pipeline", run_id = %run_id, outcome = ?existing.outcome, "run already terminal; returning stored record");
                return Ok(Begun::Replayed(existing));
            }
            tracing::warn!(target: "pipeline", run_id = %run_id, stage = ?existing.stage, "refusing to resume incomplete run");
            return Err(PipelineError::IncompleteRun { run_id });
        }

        let record = RunRecord::start(run_id, Utc::now());
        self.runs.save(&record).await?;
        tracing::info!(target: "pipeline", run_id = %record.run_id, "run started");
        Ok(Begun::Fresh(StartedRun { permit, record }))
    }

    /// Publish `content` outside a run. Holds the run lock and stops on
    /// [`cancel_current`](Self::cancel_current) like a run does.
    pub async fn publish_content(
        &self,
        content: &str,
    ) -> Result<Result<String, PublishError>, PipelineError> {
        let permit = self.try_begin()?;
        let mut cancel = permit.cancel.clone();
        let attempt = publish_within(
            self.settings.publish_timeout,
            self.publisher.publish_content(content),
        );
        let out = self.guarded(&mut cancel, "direct-publish", attempt).await;
        if out.is_err() {
            tracing::warn!(target: "publish", "direct publish cancelled");
        }
        drop(permit);
        out
    }

    /// One full run with a fresh id.
    pub async fn trigger(&self) -> Result<RunRecord, PipelineError> {
        self.run(None).await
    }

    pub async fn run(&self, run_id: Option<String>) -> Result<RunRecord, PipelineError> {
        match self.begin(run_id).await? {
            Begun::Replayed(r) => Ok(r),
            Begun::Fresh(started) => self.execute(started).await,
        }
    }

    /// Drive a started run to its terminal state.
    pub async fn execute(&self, started: StartedRun) -> Result<RunRecord, PipelineError> {
        let StartedRun { permit, record } = started;
        let span = tracing::info_span!("run", run_id = %record.run_id);
        let mut cancel = permit.cancel.clone();
        let out = self.drive(record, &mut cancel).instrument(span).await;
        if let Err(PipelineError::Cancelled { run_id }) = &out {
            counter!("pipeline_runs_total", "outcome" => "cancelled").increment(1);
            tracing::warn!(target: "pipeline", run_id = %run_id, "run cancelled; outcome left unset");
        }
        drop(permit);
        out
    }

    async fn guarded<F, T>(
        &self,
        cancel: &mut watch::Receiver<bool>,
        run_id: &str,
        fut: F,
    ) -> Result<T, PipelineError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = cancelled(cancel) => Err(PipelineError::Cancelled { run_id: run_id.to_string() }),
            out = fut => Ok(out),
        }
    }

    async fn capability<F, T>(
        &self,
        cancel: &mut watch::Receiver<bool>,
        run_id: &str,
        stage: CapabilityStage,
        fut: F,
    ) -> Result<Result<T, CapabilityError>, PipelineError>
    where
        F: Future<Output = Result<T, CapabilityError>>,
    {
        let limit = self.settings.capability_timeout;
        let timed = async {
            match tokio::time::timeout(limit, fut).await {
                Ok(r) => r,
                Err(_) => Err(CapabilityError::Timeout {
                    stage,
                    secs: limit.as_secs(),
                }),
            }
        };
        self.guarded(cancel, run_id, timed).await
    }

    async fn drive(
        &self,
        mut record: RunRecord,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<RunRecord, PipelineError> {
        let run_id = record.run_id.clone();

        // Fetching
        record.stage = RunStage::Fetching;
        let since = Utc::now() - chrono::Duration::hours(self.settings.hours_back);
        let report = match self.guarded(cancel, &run_id, self.fetcher.fetch(since)).await? {
            Ok(r) => r,
            Err(e) => return self.fail(record, ErrorKind::Fetch, e.to_string()).await,
        };
        record.failed_sources = report.failed_sources;
        record.fetched_items = report.items;

        // Deduplicating
        record.stage = RunStage::Deduplicating;
        let (fresh, dropped) = match self
            .guarded(cancel, &run_id, self.dedup.filter(record.fetched_items.clone(), Utc::now()))
            .await?
        {
            Ok(v) => v,
            Err(e) => return self.fail(record, ErrorKind::Dedup, e.to_string()).await,
        };
        record.considered_ids = fresh.iter().map(|i| i.id.clone()).collect();
        record.dropped_count = dropped;
        self.runs.save(&record).await?;

        if fresh.is_empty() {
            tracing::info!(target: "pipeline", fetched = record.fetched_items.len(), dropped, "nothing fresh to curate");
            return self.conclude(record, Outcome::SkippedNoNews).await;
        }

        // Curating
        record.stage = RunStage::Curating;
        let mut curation = match self
            .capability(cancel, &run_id, CapabilityStage::Curation, self.caps.curator.select(&fresh))
            .await?
            .and_then(|c| check_curation(&fresh, &c).map(|_| c))
        {
            Ok(c) => c,
            Err(e) => return self.fail(record, e.kind(), e.to_string()).await,
        };
        if curation.is_empty() {
            tracing::info!(target: "pipeline", considered = fresh.len(), "curator found nothing newsworthy");
            return self.conclude(record, Outcome::SkippedNoNews).await;
        }
        if let Some(articles) = &self.articles {
            let timeout = self.fetcher.source_timeout();
            let filled = self
                .guarded(cancel, &run_id, attach_full_text(articles.as_ref(), &mut curation.items, timeout))
                .await?;
            tracing::info!(target: "pipeline", filled, curated = curation.len(), "article text attached");
        }
        record.curated_items = curation.items.clone();

        // Writing
        record.stage = RunStage::Writing;
        let draft = match self
            .capability(cancel, &run_id, CapabilityStage::Writing, self.caps.writer.draft(&curation))
            .await?
        {
            Ok(d) => d,
            Err(e) => return self.fail(record, e.kind(), e.to_string()).await,
        };
        tracing::info!(target: "pipeline", fingerprint = %draft.fingerprint(), citations = draft.citations.len(), "draft written");

        // Verifying
        record.stage = RunStage::Verifying;
        let verification = match self.verify(cancel, &run_id, &draft, &curation).await? {
            Ok(v) => v,
            Err(e) => {
                record.draft = Some(draft);
                return self.fail(record, e.kind(), e.to_string()).await;
            }
        };

        // Gating (with optional revisions)
        record.stage = RunStage::Gating;
        let (draft, verification, decision) = self
            .gate_with_revisions(cancel, &mut record, draft, verification, &curation)
            .await?;
        record.draft = Some(draft);
        record.verification = Some(verification);

        if decision == GateDecision::Reject {
            record.stage = RunStage::Reviewing;
            return self.conclude(record, Outcome::SentToReview).await;
        }

        // Publishing
        record.stage = RunStage::Publishing;
        self.runs.save(&record).await?;
        self.publish_once(cancel, record).await
    }

    async fn verify(
        &self,
        cancel: &mut watch::Receiver<bool>,
        run_id: &str,
        draft: &Draft,
        curation: &CurationResult,
    ) -> Result<Result<VerificationReport, CapabilityError>, PipelineError> {
        let out = self
            .capability(
                cancel,
                run_id,
                CapabilityStage::Verification,
                self.caps.verifier.verify(draft, curation),
            )
            .await?;
        Ok(out.map(|r| enforce_citations(draft, curation, r.normalized())))
    }

    /// Apply the gate; on rejection let the writer revise up to
    /// `max_revisions` times. A failed revision ends the loop with the last
    /// verified draft.
    async fn gate_with_revisions(
        &self,
        cancel: &mut watch::Receiver<bool>,
        record: &mut RunRecord,
        mut draft: Draft,
        mut report: VerificationReport,
        curation: &CurationResult,
    ) -> Result<(Draft, VerificationReport, GateDecision), PipelineError> {
        let run_id = record.run_id.clone();
        let mut decision = self.settings.gate.decide(&report);
        tracing::info!(target: "pipeline", verified = report.verified, confidence = report.confidence, issues = report.issues.len(), ?decision, "gate decided");

        while decision == GateDecision::Reject && record.revisions < self.settings.max_revisions {
            let revised = self
                .capability(
                    cancel,
                    &run_id,
                    CapabilityStage::Writing,
                    self.caps.writer.revise(&draft, &report, curation),
                )
                .await?;
            let candidate = match revised {
                Ok(Some(d)) => d,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(target: "pipeline", error = %e, "revision failed; keeping previous draft");
                    break;
                }
            };
            record.revisions += 1;
            match self.verify(cancel, &run_id, &candidate, curation).await? {
                Ok(r) => {
                    draft = candidate;
                    report = r;
                    decision = self.settings.gate.decide(&report);
                    tracing::info!(target: "pipeline", revision = record.revisions, confidence = report.confidence, ?decision, "revised draft gated");
                }
                Err(e) => {
                    tracing::warn!(target: "pipeline", error = %e, "re-verification failed; keeping previous draft");
                    break;
                }
            }
        }
        Ok((draft, report, decision))
    }

    async fn publish_once(
        &self,
        cancel: &mut watch::Receiver<bool>,
        mut record: RunRecord,
    ) -> Result<RunRecord, PipelineError> {
        let run_id = record.run_id.clone();

        // Never post twice for one run id.
        if let Some(stored) = self.runs.get(&run_id).await? {
            if stored.outcome == Some(Outcome::Published) {
                tracing::info!(target: "pipeline", "already published; reusing stored url");
                return Ok(stored);
            }
        }

        let Some(draft) = record.draft.clone() else {
            return self
                .fail(record, ErrorKind::Writing, "no draft to publish".to_string())
                .await;
        };
        let attempt = publish_within(self.settings.publish_timeout, self.publisher.publish(&draft));

        match self.guarded(cancel, &run_id, attempt).await? {
            Ok(url) => {
                record.published_url = Some(url);
                self.conclude(record, Outcome::Published).await
            }
            Err(e) => {
                tracing::warn!(target: "pipeline", error = %e, kind = ?e.kind(), "publish failed; routing to review");
                record.record_error(e.kind(), e.to_string());
                record.stage = RunStage::Reviewing;
                self.conclude(record, Outcome::SentToReview).await
            }
        }
    }

    async fn fail(
        &self,
        mut record: RunRecord,
        kind: ErrorKind,
        message: String,
    ) -> Result<RunRecord, PipelineError> {
        tracing::warn!(target: "pipeline", stage = ?record.stage, ?kind, error = %message, "run failed");
        record.record_error(kind, message);
        self.conclude(record, Outcome::Failed).await
    }

    /// Persist the terminal record, then commit the seen index if the
    /// outcome allows it. Every fetched id is stamped, including the ones
    /// dropped as already seen, so the index holds last-seen times.
    async fn conclude(
        &self,
        mut record: RunRecord,
        outcome: Outcome,
    ) -> Result<RunRecord, PipelineError> {
        let now = Utc::now();
        record.finish(outcome, now);

        match outcome {
            Outcome::SentToReview => self.review.record(&record).await?,
            _ => self.runs.save(&record).await?,
        }

        if outcome.commits_index() {
            let ids = record.fetched_items.iter().map(|i| i.id.as_str());
            if let Err(e) = self.dedup.commit(ids, now).await {
                tracing::error!(target: "dedup", error = %e, "seen index commit failed; items may resurface");
            }
        }

        counter!("pipeline_runs_total", "outcome" => outcome.as_str()).increment(1);
        gauge!("pipeline_last_run_ts").set(now.timestamp() as f64);
        tracing::info!(target: "pipeline", outcome = outcome.as_str(), url = record.published_url.as_deref().unwrap_or(""), "run finished");
        Ok(record)
    }
}
