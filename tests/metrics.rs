// tests/metrics.rs
//
// One test per process: the Prometheus recorder can only be installed once.

mod common;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use common::{items, Parts};
use news_autoposter::metrics::Metrics;

#[tokio::test]
async fn metrics_endpoint_exposes_pipeline_series_after_a_run() {
    let metrics = Metrics::init().expect("install recorder");
    assert!(Metrics::init().is_err(), "second install must fail");

    let h = Parts::with_items(items(3)).build();
    h.orch.trigger().await.unwrap();
    h.orch.trigger().await.unwrap();

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "pipeline_runs_total{outcome=\"published\"} 1",
        "pipeline_runs_total{outcome=\"skipped_no_news\"} 1",
        "fetch_items_total",
        "dedup_dropped_total",
        "dedup_index_size",
        "publish_attempts_total",
        "pipeline_last_run_ts",
        "fetch_source_ms",
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
}
