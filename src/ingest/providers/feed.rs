// src/ingest/providers/feed.rs
//! RSS 2.0 / Atom feed provider (company blogs and similar feeds).

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::error::FetchError;
use crate::ingest::types::{NewsItem, SourceKind, SourceProvider};
use crate::ingest::{normalize_text, SUMMARY_MAX_CHARS};

const TITLE_MAX_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// Format-independent view of one feed entry.
struct RawEntry {
    title: String,
    link: Option<String>,
    date: Option<String>,
    summary: String,
}

fn parse_feed_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    let odt = OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok()?;
    Utc.timestamp_opt(odt.unix_timestamp(), 0).single()
}

pub struct FeedProvider {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl FeedProvider {
    /// Serve a fixed XML document (tests, offline runs).
    pub fn from_fixture(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(name: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    fn parse_items(&self, s: &str, since: DateTime<Utc>) -> Result<Vec<NewsItem>, FetchError> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let parse_err = |e: quick_xml::DeError| FetchError::Parse {
            source_name: self.name.clone(),
            message: e.to_string(),
        };

        let entries: Vec<RawEntry> = if looks_like_atom(&xml_clean) {
            let feed: AtomFeed = from_str(&xml_clean).map_err(parse_err)?;
            feed.entry.into_iter().map(RawEntry::from).collect()
        } else {
            let rss: Rss = from_str(&xml_clean).map_err(parse_err)?;
            rss.channel.item.into_iter().map(RawEntry::from).collect()
        };

        let now = Utc::now();
        let mut out = Vec::with_capacity(entries.len());
        for e in entries {
            let Some(url) = e.link.filter(|l| !l.trim().is_empty()) else {
                continue;
            };
            let title = normalize_text(&e.title, TITLE_MAX_CHARS);
            if title.is_empty() {
                continue;
            }
            // Undated entries count as fetched now.
            let published_at = e.date.as_deref().and_then(parse_feed_date).unwrap_or(now);
            if published_at < since {
                continue;
            }
            out.push(NewsItem::new(
                title,
                normalize_text(&e.summary, SUMMARY_MAX_CHARS),
                url.trim(),
                published_at,
                self.name.clone(),
            ));
        }

        histogram!("feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for FeedProvider {
    async fn fetch_since(&self, since: DateTime<Utc>) -> Result<Vec<NewsItem>, FetchError> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items(s, since),
            Mode::Http { url, client } => {
                let resp = client.get(url).send().await.map_err(|e| FetchError::Unreachable {
                    source_name: self.name.clone(),
                    message: e.to_string(),
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
                    message: format!("reading body: {e}"),
                })?;
                self.parse_items(&body, since)
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

impl From<Item> for RawEntry {
    fn from(it: Item) -> Self {
        Self {
            title: it.title.unwrap_or_default(),
            link: it.link,
            date: it.pub_date,
            summary: it.description.unwrap_or_default(),
        }
    }
}

impl From<AtomEntry> for RawEntry {
    fn from(e: AtomEntry) -> Self {
        // Prefer rel="alternate" (or no rel), fall back to the first href.
        let link = e
            .link
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| e.link.first())
            .and_then(|l| l.href.clone());
        Self {
            title: e.title.map(|t| t.value).unwrap_or_default(),
            link,
            date: e.published.or(e.updated),
            summary: e
                .summary
                .or(e.content)
                .map(|t| t.value)
                .unwrap_or_default(),
        }
    }
}

fn looks_like_atom(s: &str) -> bool {
    !s.contains("<rss") && s.contains("<feed")
}

// quick-xml only knows the five XML entities; blog feeds routinely use more.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Blog</title>
<item><title>Fresh model&nbsp;release</title><link>https://blog.example/fresh</link>
<pubDate>Tue, 10 Mar 2026 10:00:00 +0000</pubDate><description>&lt;p&gt;New API&lt;/p&gt;</description></item>
<item><title>Old post</title><link>https://blog.example/old</link>
<pubDate>Mon, 01 Jan 2024 10:00:00 +0000</pubDate><description>old</description></item>
<item><title>No link</title><pubDate>Tue, 10 Mar 2026 10:00:00 +0000</pubDate></item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title>Lab news</title>
<entry><title type="html">Agents SDK</title>
<link rel="self" href="https://lab.example/feed/1"/>
<link rel="alternate" href="https://lab.example/posts/agents-sdk"/>
<published>2026-03-10T08:00:00Z</published><summary>Tooling for agents.</summary></entry>
</feed>"#;

    fn since() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn rss_items_are_windowed_normalized_and_need_links() {
        let p = FeedProvider::from_fixture("Example Blog", RSS);
        let items = p.fetch_since(since()).await.unwrap();
        assert_eq!(items.len(), 1);
        let it = &items[0];
        assert_eq!(it.title, "Fresh model release");
        assert_eq!(it.summary, "New API");
        assert_eq!(it.source_name, "Example Blog");
        assert_eq!(it.id, crate::ingest::item_id("https://blog.example/fresh"));
    }

    #[tokio::test]
    async fn atom_prefers_alternate_link() {
        let p = FeedProvider::from_fixture("Lab", ATOM);
        let items = p.fetch_since(since()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://lab.example/posts/agents-sdk");
        assert_eq!(items[0].title, "Agents SDK");
    }

    #[tokio::test]
    async fn malformed_xml_is_a_parse_error() {
        let p = FeedProvider::from_fixture("Broken", "<rss><channel><item>");
        let err = p.fetch_since(since()).await.unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }

    #[test]
    fn dates_accept_rfc2822_and_rfc3339() {
        assert!(parse_feed_date("Tue, 10 Mar 2026 10:00:00 +0000").is_some());
        assert!(parse_feed_date("2026-03-10T08:00:00Z").is_some());
        assert!(parse_feed_date("yesterday").is_none());
    }
}
