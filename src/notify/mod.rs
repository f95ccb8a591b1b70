pub mod discord;
pub mod email;
pub mod slack;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::runs::RunRecord;

/// What a reviewer needs to act on a run without opening the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewNotice {
    pub run_id: String,
    pub body: String,
    pub issues: Vec<String>,
    /// Publish failure that sent a verified draft here, if any.
    pub error: Option<String>,
    pub ts: DateTime<Utc>,
}

impl ReviewNotice {
    pub fn from_record(run: &RunRecord) -> Self {
        Self {
            run_id: run.run_id.clone(),
            body: run.draft.as_ref().map(|d| d.body.clone()).unwrap_or_default(),
            issues: run
                .verification
                .as_ref()
                .map(|v| v.issues.clone())
                .unwrap_or_default(),
            error: run.error.as_ref().map(|e| format!("{:?}: {}", e.kind, e.message)),
            ts: run.finished_at.unwrap_or_else(Utc::now),
        }
    }

    pub fn headline(&self) -> String {
        match (&self.error, self.issues.len()) {
            (Some(e), _) => format!("Draft {} needs manual publishing ({e})", self.run_id),
            (None, 0) => format!("Draft {} needs review", self.run_id),
            (None, n) => format!("Draft {} needs review: {n} issue(s)", self.run_id),
        }
    }

    pub fn issues_text(&self) -> String {
        if self.issues.is_empty() {
            "none".to_string()
        } else {
            self.issues
                .iter()
                .map(|i| format!("- {i}"))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notice: &ReviewNotice) -> Result<()>;
    fn name(&self) -> &str;
}

/// Fan-out to every configured transport.
#[derive(Default, Clone)]
pub struct NotifierMux {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(sinks: Vec<Arc<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    pub fn from_env() -> Self {
        let mut sinks: Vec<Arc<dyn Notifier>> = Vec::new();
        if let Some(s) = slack::SlackNotifier::from_env() {
            sinks.push(Arc::new(s));
        }
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                sinks.push(Arc::new(discord::DiscordNotifier::new(url.trim().to_string())));
            }
        }
        match email::EmailSender::from_env() {
            Ok(Some(e)) => sinks.push(Arc::new(e)),
            Ok(None) => {}
            Err(e) => tracing::warn!(target: "review", error = %e, "email notifier disabled"),
        }
        tracing::info!(target: "review", transports = sinks.len(), "review notifiers configured");
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Try every transport; fails if any of them failed.
    pub async fn send_all(&self, notice: &ReviewNotice) -> Result<()> {
        let mut failed = Vec::new();
        for s in &self.sinks {
            if let Err(e) = s.send(notice).await {
                tracing::warn!(target: "review", transport = s.name(), run_id = %notice.run_id, error = %e, "review notification failed");
                failed.push(s.name().to_string());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("notification failed via {}", failed.join(", ")))
        }
    }
}

/// Keeps every notice in memory; optionally fails or stalls after recording.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<ReviewNotice>>,
    fail: bool,
    stall: Option<Duration>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn stalling(d: Duration) -> Self {
        Self {
            stall: Some(d),
            ..Self::default()
        }
    }

    pub fn notices(&self) -> Vec<ReviewNotice> {
        self.seen.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notice: &ReviewNotice) -> Result<()> {
        if let Ok(mut v) = self.seen.lock() {
            v.push(notice.clone());
        }
        if let Some(d) = self.stall {
            tokio::time::sleep(d).await;
        }
        if self.fail {
            return Err(anyhow!("transport down"));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mux_tries_all_and_reports_failure() {
        let ok = Arc::new(RecordingNotifier::new());
        let bad = Arc::new(RecordingNotifier::failing());
        let mux = NotifierMux::new(vec![bad.clone(), ok.clone()]);
        let n = ReviewNotice {
            run_id: "r".into(),
            body: "b".into(),
            issues: vec!["claim X unsupported".into()],
            error: None,
            ts: Utc::now(),
        };
        assert!(mux.send_all(&n).await.is_err());
        assert_eq!(ok.notices().len(), 1);
        assert_eq!(bad.notices().len(), 1);
        assert_eq!(n.headline(), "Draft r needs review: 1 issue(s)");
    }
}
