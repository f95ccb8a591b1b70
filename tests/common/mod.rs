// tests/common/mod.rs
//
// Shared harness: an orchestrator wired to in-memory stores and scripted
// capabilities, with handles kept so tests can inspect every collaborator.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use news_autoposter::agents::fixed::{CitingWriter, FixedCurator, FixedVerifier};
use news_autoposter::agents::VerificationReport;
use news_autoposter::dedup::{Deduplicator, MemorySeenIndexStore, SeenIndexStore};
use news_autoposter::ingest::article::ArticleFetcher;
use news_autoposter::ingest::providers::FixedProvider;
use news_autoposter::ingest::types::{NewsItem, SourceProvider};
use news_autoposter::ingest::SourceFetcher;
use news_autoposter::notify::{NotifierMux, RecordingNotifier};
use news_autoposter::pipeline::{Capabilities, Orchestrator, RunSettings};
use news_autoposter::publish::credential::{Credential, MemoryCredentialStore, StaticRefresher};
use news_autoposter::publish::platform::ScriptedPlatform;
use news_autoposter::publish::retry::RetryPolicy;
use news_autoposter::publish::Publisher;
use news_autoposter::review::ReviewSink;
use news_autoposter::runs::{MemoryRunStore, RunStore};

/// `n` distinct items published within the last hour.
pub fn items(n: usize) -> Vec<NewsItem> {
    let now = Utc::now();
    (0..n)
        .map(|i| {
            NewsItem::new(
                format!("Story {i}"),
                format!("Summary of story {i}."),
                format!("https://news.example/story-{i}"),
                now - ChronoDuration::minutes(i as i64 + 1),
                "Example Wire",
            )
        })
        .collect()
}

pub fn valid_credential() -> Credential {
    Credential::new("token-old", Utc::now() + ChronoDuration::days(1), Some("refresh-1".into()))
}

pub fn refreshed_credential() -> Credential {
    Credential::new("token-new", Utc::now() + ChronoDuration::days(60), Some("refresh-2".into()))
}

pub struct Parts {
    pub providers: Vec<Arc<dyn SourceProvider>>,
    pub articles: Option<Arc<dyn ArticleFetcher>>,
    pub curator: Arc<FixedCurator>,
    pub writer: Arc<CitingWriter>,
    pub verifier: Arc<FixedVerifier>,
    pub platform: Arc<ScriptedPlatform>,
    pub credential: Option<Credential>,
    pub refresher: Arc<StaticRefresher>,
    pub notifier: Arc<RecordingNotifier>,
    pub runs: Arc<dyn RunStore>,
    pub index: Arc<dyn SeenIndexStore>,
    pub settings: RunSettings,
    pub retry: RetryPolicy,
}

impl Parts {
    pub fn with_items(items: Vec<NewsItem>) -> Self {
        Self {
            providers: vec![Arc::new(FixedProvider::items("Example Wire", items))],
            articles: None,
            curator: Arc::new(FixedCurator::first(3)),
            writer: Arc::new(CitingWriter::new()),
            verifier: Arc::new(FixedVerifier::returning(VerificationReport::passed(90))),
            platform: Arc::new(ScriptedPlatform::succeeding()),
            credential: Some(valid_credential()),
            refresher: Arc::new(StaticRefresher::ok(refreshed_credential())),
            notifier: Arc::new(RecordingNotifier::new()),
            runs: Arc::new(MemoryRunStore::new()),
            index: Arc::new(MemorySeenIndexStore::new()),
            settings: RunSettings::default(),
            retry: RetryPolicy::new(3, Duration::from_millis(5), Duration::ZERO),
        }
    }

    pub fn build(self) -> Harness {
        let fetcher = Arc::new(
            SourceFetcher::new(self.providers).with_source_timeout(Duration::from_secs(2)),
        );
        let creds = Arc::new(MemoryCredentialStore::new(self.credential));
        let publisher = Arc::new(
            Publisher::new(self.platform.clone(), creds.clone(), Some(self.refresher.clone()))
                .with_retry(self.retry),
        );
        let review = ReviewSink::new(
            self.runs.clone(),
            NotifierMux::new(vec![self.notifier.clone()]),
        );
        let caps = Capabilities {
            curator: self.curator.clone(),
            writer: self.writer.clone(),
            verifier: self.verifier.clone(),
        };
        let mut orch = Orchestrator::new(
            fetcher,
            Deduplicator::new(self.index.clone(), 14),
            caps,
            publisher,
            review,
            self.runs.clone(),
            self.settings,
        );
        if let Some(articles) = self.articles {
            orch = orch.with_article_fetcher(articles);
        }
        let orch = Arc::new(orch);
        Harness {
            orch,
            curator: self.curator,
            writer: self.writer,
            verifier: self.verifier,
            platform: self.platform,
            creds,
            refresher: self.refresher,
            notifier: self.notifier,
            runs: self.runs,
            index: self.index,
        }
    }
}

pub struct Harness {
    pub orch: Arc<Orchestrator>,
    pub curator: Arc<FixedCurator>,
    pub writer: Arc<CitingWriter>,
    pub verifier: Arc<FixedVerifier>,
    pub platform: Arc<ScriptedPlatform>,
    pub creds: Arc<MemoryCredentialStore>,
    pub refresher: Arc<StaticRefresher>,
    pub notifier: Arc<RecordingNotifier>,
    pub runs: Arc<dyn RunStore>,
    pub index: Arc<dyn SeenIndexStore>,
}

impl Harness {
    pub async fn index_len(&self) -> usize {
        self.index.load().await.expect("load index").len()
    }
}
