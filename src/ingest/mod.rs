// src/ingest/mod.rs
pub mod article;
pub mod config;
pub mod providers;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};

use crate::error::FetchError;
use crate::ingest::types::{FetchReport, NewsItem, SourceProvider};

pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(15);
pub const SUMMARY_MAX_CHARS: usize = 1000;

/// Query parameters that only track clicks and never change the article.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid", "ref"];

/// Normalize feed text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}

/// Canonical form of an article URL: lowercase scheme/host, no fragment, no
/// tracking params, no trailing slash. Unparseable input is only trimmed.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut parsed) = url::Url::parse(trimmed) else {
        return trimmed.trim_end_matches('/').to_string();
    };

    parsed.set_fragment(None);

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_ascii_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }

    // `Url` already lowercases scheme and host.
    let mut out = parsed.to_string();
    while out.ends_with('/') && !out.ends_with("://") {
        out.pop();
    }
    out
}

/// First 16 hex chars of SHA-256 over `bytes`.
pub(crate) fn short_sha256(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Stable item id: [`short_sha256`] of the canonical URL.
pub fn item_id(url: &str) -> String {
    short_sha256(canonical_url(url).as_bytes())
}

/// Sort newest first and keep the first occurrence of every id.
pub fn merge_items(items: Vec<NewsItem>) -> Vec<NewsItem> {
    let mut items = items;
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    let mut seen = HashSet::with_capacity(items.len());
    items.retain(|it| seen.insert(it.id.clone()));
    items
}

/// Polls every configured source (bounded concurrency, per-source timeout)
/// and merges what came back. One source failing never fails the fetch.
pub struct SourceFetcher {
    providers: Vec<Arc<dyn SourceProvider>>,
    concurrency: usize,
    per_source_timeout: Duration,
}

impl SourceFetcher {
    pub fn new(providers: Vec<Arc<dyn SourceProvider>>) -> Self {
        Self {
            providers,
            concurrency: DEFAULT_FETCH_CONCURRENCY,
            per_source_timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.per_source_timeout = timeout;
        self
    }

    pub fn source_timeout(&self) -> Duration {
        self.per_source_timeout
    }

    pub fn source_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Fetch everything published since `since`. Errors only when every
    /// configured source failed.
    pub async fn fetch(&self, since: DateTime<Utc>) -> Result<FetchReport, FetchError> {
        let timeout = self.per_source_timeout;
        let results: Vec<(usize, String, Result<Vec<NewsItem>, FetchError>)> =
            stream::iter(self.providers.iter().cloned().enumerate())
                .map(|(idx, p)| async move {
                    let name = p.name().to_string();
                    let t0 = Instant::now();
                    let res = match tokio::time::timeout(timeout, p.fetch_since(since)).await {
                        Ok(r) => r,
                        Err(_) => Err(FetchError::Timeout {
                            source_name: name.clone(),
                            secs: timeout.as_secs(),
                        }),
                    };
                    histogram!("fetch_source_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
                    (idx, name, res)
                })
                .buffer_unordered(self.concurrency)
                .collect::<Vec<_>>()
                .boxed()
                .await;

        let mut results = results;
        results.sort_by_key(|(idx, _, _)| *idx);

        let mut raw = Vec::new();
        let mut failed = Vec::new();
        for (_, name, res) in results {
            match res {
                Ok(mut v) => {
                    tracing::debug!(target: "ingest", source = %name, items = v.len(), "source fetched");
                    raw.append(&mut v);
                }
                Err(e) => {
                    tracing::warn!(target: "ingest", error = %e, source = %name, "source failed");
                    counter!("fetch_source_errors_total", "source" => name.clone()).increment(1);
                    failed.push(name);
                }
            }
        }

        if !self.providers.is_empty() && failed.len() == self.providers.len() {
            return Err(FetchError::AllSourcesFailed { failed });
        }

        let items = merge_items(raw);
        counter!("fetch_items_total").increment(items.len() as u64);
        tracing::info!(
            target: "ingest",
            items = items.len(),
            failed = failed.len(),
            "fetch complete"
        );

        Ok(FetchReport {
            items,
            failed_sources: failed,
        })
    }
}
