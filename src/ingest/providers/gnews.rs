// src/ingest/providers/gnews.rs
//! Query-API provider for the GNews search endpoint.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use crate::error::FetchError;
use crate::ingest::types::{NewsItem, SourceKind, SourceProvider};
use crate::ingest::{normalize_text, SUMMARY_MAX_CHARS};

pub const GNEWS_SEARCH_URL: &str = "https://gnews.io/api/v4/search";
pub const DEFAULT_QUERY: &str = "artificial intelligence OR generative AI OR LLM";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<DateTime<Utc>>,
    source: Option<ArticleSource>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

pub struct GNewsProvider {
    name: String,
    query: String,
    max_results: u32,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        endpoint: String,
        api_key: Option<String>,
        client: reqwest::Client,
    },
}

impl GNewsProvider {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        query: impl Into<String>,
        api_key: Option<String>,
        max_results: u32,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            max_results: max_results.clamp(1, 100),
            mode: Mode::Http {
                endpoint: endpoint.into(),
                api_key: api_key.filter(|k| !k.trim().is_empty()),
                client,
            },
        }
    }

    /// Serve a fixed JSON search response (tests, offline runs).
    pub fn from_fixture(name: impl Into<String>, json: &str) -> Self {
        Self {
            name: name.into(),
            query: DEFAULT_QUERY.to_string(),
            max_results: 10,
            mode: Mode::Fixture(json.to_string()),
        }
    }

    fn parse_items(&self, body: &str, since: DateTime<Utc>) -> Result<Vec<NewsItem>, FetchError> {
        let resp: SearchResponse = serde_json::from_str(body).map_err(|e| FetchError::Parse {
            source_name: self.name.clone(),
            message: e.to_string(),
        })?;

        let now = Utc::now();
        let items = resp
            .articles
            .into_iter()
            .filter_map(|a| {
                let url = a.url.filter(|u| !u.trim().is_empty())?;
                let title = normalize_text(a.title.as_deref().unwrap_or_default(), 300);
                if title.is_empty() {
                    return None;
                }
                let published_at = a.published_at.unwrap_or(now);
                if published_at < since {
                    return None;
                }
                // The outlet name is more useful downstream than "GNews".
                let source_name = a
                    .source
                    .and_then(|s| s.name)
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| self.name.clone());
                Some(NewsItem::new(
                    title,
                    normalize_text(a.description.as_deref().unwrap_or_default(), SUMMARY_MAX_CHARS),
                    url.trim(),
                    published_at,
                    source_name,
                ))
            })
            .collect();
        Ok(items)
    }
}

#[async_trait]
impl SourceProvider for GNewsProvider {
    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<NewsItem>, FetchError> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items(s, since),
            Mode::Http {
                endpoint,
                api_key,
                client,
            } => {
                let Some(key) = api_key else {
                    return Err(FetchError::Misconfigured {
                        source_name: self.name.clone(),
                        message: "api key not set".into(),
                    });
                };
                let max = self.max_results.to_string();
                let from = since.to_rfc3339_opts(SecondsFormat::Secs, true);
                let resp = client
                    .get(endpoint)
                    .query(&[
                        ("q", self.query.as_str()),
                        ("lang", "en"),
                        ("max", max.as_str()),
                        ("sortby", "publishedAt"),
                        ("from", from.as_str()),
                        ("apikey", key.as_str()),
                    ])
                    .send()
                    .await
                    .map_err(|e| FetchError::Unreachable {
                        source_name: self.name.clone(),
                        // reqwest errors embed the URL, which carries the key
                        message: e.without_url().to_string(),
                    })?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(FetchError::Status {
                        source_name: self.name.clone(),
                        status: status.as_u16(),
                    });
                }
                let body = resp.text().await.map_err(|e| FetchError::Unreachable {
                    source_name: self.name.clone(),
                    message: e.without_url().to_string(),
                })?;
                self.parse_items(&body, since)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BODY: &str = r#"{"totalArticles":3,"articles":[
      {"title":"Lab ships model","description":"It is faster.","url":"https://news.example/a","publishedAt":"2026-03-10T09:00:00Z","source":{"name":"Tech Daily"}},
      {"title":"Ancient","description":"x","url":"https://news.example/b","publishedAt":"2025-01-01T09:00:00Z","source":{"name":"Tech Daily"}},
      {"title":"","description":"untitled","url":"https://news.example/c","publishedAt":"2026-03-10T09:00:00Z"}
    ]}"#;

    #[tokio::test]
    async fn fixture_maps_outlet_name_and_filters() {
        let p = GNewsProvider::from_fixture("GNews", BODY);
        let since = Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap();
        let items = p.fetch_since(since).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source_name, "Tech Daily");
        assert_eq!(items[0].summary, "It is faster.");
    }

    #[tokio::test]
    async fn missing_key_is_a_source_failure() {
        let p = GNewsProvider::new(
            "GNews",
            GNEWS_SEARCH_URL,
            DEFAULT_QUERY,
            Some("   ".into()),
            10,
            reqwest::Client::new(),
        );
        let err = p.fetch_since(Utc::now()).await.unwrap_err();
        assert!(matches!(err, FetchError::Misconfigured { .. }));
        assert_eq!(p.kind(), SourceKind::Query);
    }
}
