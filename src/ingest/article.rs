// src/ingest/article.rs
//! Full article text for curated items.
//!
//! Feed summaries are short, so the writer and verifier also get the page
//! body when it can be fetched. A page that fails, times out or has no
//! readable text leaves the item on its summary alone.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use metrics::counter;
use reqwest::header::ACCEPT;
use scraper::{ElementRef, Html, Selector};

use crate::agents::CuratedItem;
use crate::error::FetchError;
use crate::ingest::{normalize_text, DEFAULT_FETCH_CONCURRENCY};

pub const ARTICLE_MAX_CHARS: usize = 3000;

/// Text blocks shorter than this are bylines, captions and buttons.
const MIN_BLOCK_CHARS: usize = 30;

/// Tried in order; the first match is the article root, else `<body>`.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "[role=\"main\"]",
    ".post-content",
    ".article-content",
    ".entry-content",
    ".content-body",
    "main",
    ".blog-post",
    ".post-body",
];

const BLOCK_SELECTOR: &str = "p, h2, h3, li";

const BOILERPLATE: &[&str] = &["nav", "footer", "header", "aside", "form", "script", "style"];

#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    /// Readable text of the page at `url`.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpArticleFetcher {
    client: reqwest::Client,
    max_chars: usize,
}

impl HttpArticleFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_chars: ARTICLE_MAX_CHARS,
        }
    }

    pub fn with_max_chars(mut self, n: usize) -> Self {
        self.max_chars = n;
        self
    }
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

#[async_trait]
impl ArticleFetcher for HttpArticleFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let source_name = host_of(url);
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| FetchError::Unreachable {
                source_name: source_name.clone(),
                message: e.without_url().to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                source_name,
                status: status.as_u16(),
            });
        }

        let html = resp.text().await.map_err(|e| FetchError::Unreachable {
            source_name: source_name.clone(),
            message: e.without_url().to_string(),
        })?;
        extract_article_text(&html, self.max_chars).ok_or(FetchError::Parse {
            source_name,
            message: "no readable article text".into(),
        })
    }
}

fn in_boilerplate(el: &ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(|n| n.value().as_element())
        .any(|e| BOILERPLATE.contains(&e.name()))
}

/// Paragraph-level text of the article root, normalized and capped at
/// `max_chars`. `None` when nothing readable is left.
pub fn extract_article_text(html: &str, max_chars: usize) -> Option<String> {
    let doc = Html::parse_document(html);
    let blocks = Selector::parse(BLOCK_SELECTOR).ok()?;

    let root = CONTENT_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|sel| doc.select(&sel).next())
        .or_else(|| {
            Selector::parse("body")
                .ok()
                .and_then(|sel| doc.select(&sel).next())
        })?;

    let parts: Vec<String> = root
        .select(&blocks)
        .filter(|el| !in_boilerplate(el))
        .map(|el| normalize_text(&el.text().collect::<Vec<_>>().join(" "), usize::MAX))
        .filter(|t| t.chars().count() > MIN_BLOCK_CHARS)
        .collect();

    if parts.is_empty() {
        return None;
    }
    Some(normalize_text(&parts.join(" "), max_chars))
}

/// Fill `full_text` on every item whose page could be read within
/// `timeout`. Returns how many were filled.
pub async fn attach_full_text(
    fetcher: &dyn ArticleFetcher,
    items: &mut [CuratedItem],
    timeout: Duration,
) -> usize {
    let urls: Vec<String> = items.iter().map(|c| c.item.url.clone()).collect();
    let texts: Vec<Option<String>> = stream::iter(urls)
        .map(move |url| async move {
            let res = match tokio::time::timeout(timeout, fetcher.fetch_text(&url)).await {
                Ok(r) => r,
                Err(_) => Err(FetchError::Timeout {
                    source_name: host_of(&url),
                    secs: timeout.as_secs(),
                }),
            };
            match res {
                Ok(text) => Some(text),
                Err(e) => {
                    counter!("article_fetch_errors_total").increment(1);
                    tracing::warn!(target: "ingest", error = %e, url = %url, "article text unavailable; using summary");
                    None
                }
            }
        })
        .buffered(DEFAULT_FETCH_CONCURRENCY)
        .collect()
        .await;

    let mut filled = 0;
    for (c, text) in items.iter_mut().zip(texts) {
        if text.is_some() {
            filled += 1;
        }
        c.full_text = text;
    }
    filled
}
