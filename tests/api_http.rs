// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /trigger (sync, async + poll, busy, replay)
// - GET /runs, GET /runs/{id} (404)
// - POST /fetch_news, POST /publish (ok, empty, rejected, cancelled), GET /publish/validate
// - store failure surfaces as 500

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use common::{items, Harness, Parts};
use news_autoposter::error::StoreError;
use news_autoposter::publish::platform::{PostError, ScriptedPlatform};
use news_autoposter::runs::{RunRecord, RunStore};
use news_autoposter::{router, AppState};

const BODY_LIMIT: usize = 1024 * 1024;

fn app(h: &Harness) -> Router {
    router(AppState {
        orch: h.orch.clone(),
    })
}

async fn send(app: &Router, method: &str, uri: &str, payload: Option<Json>) -> (StatusCode, Json) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match payload {
        Some(p) => {
            req = req.header("content-type", "application/json");
            Body::from(p.to_string())
        }
        None => Body::empty(),
    };
    let resp = app
        .clone()
        .oneshot(req.body(body).expect("build request"))
        .await
        .expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

#[tokio::test]
async fn health_returns_ok() {
    let h = Parts::with_items(items(1)).build();
    let resp = app(&h)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn sync_trigger_returns_the_run_record() {
    let h = Parts::with_items(items(4)).build();

    let (status, v) = send(&app(&h), "POST", "/trigger", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["outcome"], "Published");
    assert!(v["published_url"].as_str().unwrap().starts_with("https://platform.example/"));
    let rec: RunRecord = serde_json::from_value(v).expect("record json");
    assert_eq!(rec.fetched_items.len(), 4);
}

#[tokio::test]
async fn trigger_while_busy_is_409() {
    let h = Parts::with_items(items(2)).build();
    let _permit = h.orch.try_begin().unwrap();

    let (status, v) = send(&app(&h), "POST", "/trigger", None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(v["code"], "busy");
    assert_eq!(h.curator.calls(), 0);
}

#[tokio::test]
async fn async_trigger_is_accepted_and_pollable() {
    let h = Parts::with_items(items(3)).build();
    let app = app(&h);

    let (status, v) = send(&app, "POST", "/trigger?mode=async", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "accepted");
    let run_id = v["run_id"].as_str().unwrap().to_string();

    let mut outcome = Json::Null;
    for _ in 0..200 {
        let (status, v) = send(&app, "GET", &format!("/runs/{run_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        if !v["outcome"].is_null() {
            outcome = v["outcome"].clone();
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(outcome, "Published");

    let (status, v) = send(&app, "GET", "/runs?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v.as_array().unwrap().len(), 1);
    assert_eq!(v[0]["run_id"], run_id.as_str());
}

#[tokio::test]
async fn replayed_run_id_is_reported_as_replayed() {
    let h = Parts::with_items(items(3)).build();
    let app = app(&h);

    let (status, _) = send(&app, "POST", "/trigger?run_id=daily-1", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, v) = send(&app, "POST", "/trigger?mode=async&run_id=daily-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "replayed");
    assert_eq!(h.platform.calls(), 1);
}

#[tokio::test]
async fn unknown_run_is_404() {
    let h = Parts::with_items(items(1)).build();
    let (status, v) = send(&app(&h), "GET", "/runs/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["code"], "not_found");
}

#[tokio::test]
async fn fetch_news_returns_items_without_touching_the_index() {
    let h = Parts::with_items(items(5)).build();

    let (status, v) = send(&app(&h), "POST", "/fetch_news", Some(json!({ "hours_back": 24 }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["items"].as_array().unwrap().len(), 5);
    assert!(v["failed_sources"].as_array().unwrap().is_empty());
    assert_eq!(h.index_len().await, 0);

    let (status, v) = send(&app(&h), "POST", "/fetch_news", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["items"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn publish_tool_posts_content() {
    let h = Parts::with_items(items(1)).build();

    let (status, v) = send(&app(&h), "POST", "/publish", Some(json!({ "content": "Hello" }))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(v["url"].as_str().unwrap().starts_with("https://platform.example/posts/"));
    assert_eq!(h.platform.calls(), 1);
}

#[tokio::test]
async fn publish_tool_rejects_empty_content() {
    let h = Parts::with_items(items(1)).build();

    let (status, v) = send(&app(&h), "POST", "/publish", Some(json!({ "content": "   " }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["code"], "empty_content");
    assert_eq!(h.platform.calls(), 0);
}

#[tokio::test]
async fn publish_tool_maps_rejection_to_422() {
    let mut p = Parts::with_items(items(1));
    p.platform = Arc::new(ScriptedPlatform::new(vec![Err(PostError::Rejected {
        status: 400,
        message: "bad".into(),
    })]));
    let h = p.build();

    let (status, v) = send(&app(&h), "POST", "/publish", Some(json!({ "content": "Hello" }))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(v["code"], "rejected");
}

#[tokio::test]
async fn cancel_stops_a_direct_publish() {
    let mut p = Parts::with_items(items(1));
    p.platform = Arc::new(ScriptedPlatform::stalling(Duration::from_secs(30)));
    let h = p.build();
    let router = app(&h);

    let publishing = router.clone();
    let task = tokio::spawn(async move {
        send(&publishing, "POST", "/publish", Some(json!({ "content": "Hello" }))).await
    });
    for _ in 0..200 {
        if h.platform.calls() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.orch.is_busy());

    let (status, v) = send(&router, "POST", "/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["cancelled"], true);

    let (status, v) = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("publish stopped")
        .unwrap();
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(v["code"], "cancelled");
    assert!(!h.orch.is_busy());
}

#[tokio::test]
async fn validate_reports_token_status() {
    let h = Parts::with_items(items(1)).build();

    let (status, v) = send(&app(&h), "GET", "/publish/validate", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["valid"], true);
}

struct BrokenRunStore;

fn broken() -> StoreError {
    StoreError::Io {
        path: "runs".into(),
        source: std::io::Error::other("disk gone"),
    }
}

#[async_trait]
impl RunStore for BrokenRunStore {
    async fn get(&self, _run_id: &str) -> Result<Option<RunRecord>, StoreError> {
        Err(broken())
    }

    async fn save(&self, _record: &RunRecord) -> Result<(), StoreError> {
        Err(broken())
    }

    async fn recent(&self, _limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        Err(broken())
    }
}

#[tokio::test]
async fn store_failure_is_500() {
    let mut p = Parts::with_items(items(2));
    p.runs = Arc::new(BrokenRunStore);
    let h = p.build();
    let app = app(&h);

    let (status, v) = send(&app, "POST", "/trigger", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(v["code"], "store_error");

    let (status, _) = send(&app, "GET", "/runs", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
