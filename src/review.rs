//! ReviewSink: durable hand-off of drafts that did not get published.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;

use crate::error::StoreError;
use crate::notify::{NotifierMux, ReviewNotice};
use crate::runs::{RunRecord, RunStore};

/// Upper bound on fanning one notice out to every transport. The run lock
/// is held while notifying.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ReviewSink {
    runs: Arc<dyn RunStore>,
    notifier: NotifierMux,
    notify_timeout: Duration,
}

impl ReviewSink {
    pub fn new(runs: Arc<dyn RunStore>, notifier: NotifierMux) -> Self {
        Self {
            runs,
            notifier,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Persist `run` first, then notify. Transport failures and timeouts are
    /// logged and counted; only a failed write is returned, since then the
    /// draft would exist nowhere.
    pub async fn record(&self, run: &RunRecord) -> Result<(), StoreError> {
        self.runs.save(run).await?;
        tracing::info!(target: "review", run_id = %run.run_id, issues = run.verification.as_ref().map_or(0, |v| v.issues.len()), "draft sent to review");

        if self.notifier.is_empty() {
            tracing::debug!(target: "review", "no review transport configured");
            return Ok(());
        }
        let notice = ReviewNotice::from_record(run);
        match tokio::time::timeout(self.notify_timeout, self.notifier.send_all(&notice)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                counter!("review_notify_errors_total").increment(1);
                tracing::warn!(target: "review", run_id = %run.run_id, error = %e, "review notification failed; record is persisted");
            }
            Err(_) => {
                counter!("review_notify_errors_total").increment(1);
                tracing::warn!(target: "review", run_id = %run.run_id, secs = self.notify_timeout.as_secs(), "review notification timed out; record is persisted");
            }
        }
        Ok(())
    }
}
