// tests/ingest_article.rs
//
// Article text extraction and its use in a run.
//
// Covered:
// - the article root wins over page chrome; short fragments are dropped
// - extracted text is normalized and capped
// - curated items carry page text into the run; failed or stalled pages
//   fall back to the summary without failing the run

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use common::{items, Parts};
use news_autoposter::error::FetchError;
use news_autoposter::ingest::article::{extract_article_text, ArticleFetcher, ARTICLE_MAX_CHARS};
use news_autoposter::runs::Outcome;

const LAB_ARTICLE: &str = include_str!("fixtures/lab_article.html");

#[test]
fn article_body_is_extracted_without_page_chrome() {
    let text = extract_article_text(LAB_ARTICLE, ARTICLE_MAX_CHARS).expect("article text");

    assert!(text.starts_with("Today we are releasing Reasoner Mini"));
    assert!(text.contains("at \"one fifth\" of the price."));
    assert!(text.contains("A 200k token context window available in the API from day one."));
    assert!(text.contains("Batch pricing at $0.40 per million input tokens."));
    assert!(text.ends_with("with free tier access to follow later this month."));

    for chrome in [
        "By Lab Team",
        "What developers get",
        "Research and publications",
        "Related:",
        "Subscribe",
        "Copyright",
        "analytics",
    ] {
        assert!(!text.contains(chrome), "unexpected {chrome:?} in {text:?}");
    }
    assert!(!text.contains("  "));
}

#[test]
fn extracted_text_is_capped() {
    let text = extract_article_text(LAB_ARTICLE, 40).unwrap();
    assert_eq!(text.chars().count(), 40);
}

/// Serves page text per url; unknown urls fail, listed urls stall.
struct Pages {
    text: HashMap<String, String>,
    stalled: Vec<String>,
}

#[async_trait]
impl ArticleFetcher for Pages {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        if self.stalled.iter().any(|u| u == url) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.text.get(url).cloned().ok_or_else(|| FetchError::Status {
            source_name: "news.example".into(),
            status: 404,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn curated_items_carry_page_text_and_fall_back_to_summary() {
    let news = items(5);
    let pages = Pages {
        text: HashMap::from([(news[0].url.clone(), "Full text of story 0.".to_string())]),
        stalled: vec![news[2].url.clone()],
    };
    let mut p = Parts::with_items(news);
    p.articles = Some(Arc::new(pages));
    let h = p.build();

    let r = h.orch.trigger().await.unwrap();

    assert_eq!(r.outcome, Some(Outcome::Published));
    let texts: Vec<Option<&str>> = r.curated_items.iter().map(|c| c.full_text.as_deref()).collect();
    assert_eq!(texts, vec![Some("Full text of story 0."), None, None]);
    assert!(r.curated_items.iter().all(|c| !c.item.summary.is_empty()));

    let stored = h.runs.get(&r.run_id).await.unwrap().unwrap();
    assert_eq!(stored.curated_items, r.curated_items);
}
