// tests/ingest_dedup.rs
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use news_autoposter::dedup::{Deduplicator, JsonSeenIndexStore};
use news_autoposter::ingest::types::NewsItem;

fn story(url: &str) -> NewsItem {
    NewsItem::new(
        "Same story",
        "",
        url,
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
        "Wire",
    )
}

#[tokio::test]
async fn tracking_variants_of_one_url_count_as_one_item() {
    let tmp = tempfile::tempdir().unwrap();
    let d = Deduplicator::new(Arc::new(JsonSeenIndexStore::new(tmp.path().join("seen.json"))), 14);
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    let raw = vec![
        story("https://wire.example/story"),
        story("https://WIRE.example/story/?utm_source=feed"),
        story("https://wire.example/story#comments"),
    ];
    let (fresh, dropped) = d.filter(raw, now).await.unwrap();

    assert_eq!(fresh.len(), 1);
    assert_eq!(dropped, 2);
}

#[tokio::test]
async fn seen_items_return_once_the_window_has_passed() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("seen.json");
    let day0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    let d = Deduplicator::new(Arc::new(JsonSeenIndexStore::new(&path)), 14);
    let it = story("https://wire.example/story");
    d.commit([it.id.as_str()], day0).await.unwrap();

    // Reopen, as a later process would.
    let d = Deduplicator::new(Arc::new(JsonSeenIndexStore::new(&path)), 14);

    let (fresh, dropped) = d.filter(vec![it.clone()], day0 + Duration::days(13)).await.unwrap();
    assert!(fresh.is_empty());
    assert_eq!(dropped, 1);

    let (fresh, dropped) = d.filter(vec![it.clone()], day0 + Duration::days(15)).await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert_eq!(dropped, 0);
}

#[tokio::test]
async fn commit_prunes_expired_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let d = Deduplicator::new(Arc::new(JsonSeenIndexStore::new(tmp.path().join("seen.json"))), 14);
    let day0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    assert_eq!(d.commit(["aaaa", "bbbb"], day0).await.unwrap(), 2);
    assert_eq!(d.commit(["cccc"], day0 + Duration::days(20)).await.unwrap(), 1);
}
