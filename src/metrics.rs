use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and describe every series the service emits.
    /// Fails if a recorder is already installed.
    pub fn init() -> anyhow::Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("fetch_items_total", "Items returned by sources after merge.");
        describe_counter!("fetch_source_errors_total", "Source fetches that failed or timed out.");
        describe_histogram!("fetch_source_ms", "Per-source fetch time in milliseconds.");
        describe_histogram!("feed_parse_ms", "Feed XML parse time in milliseconds.");
        describe_counter!("dedup_dropped_total", "Items suppressed as already seen.");
        describe_gauge!("dedup_index_size", "Entries in the seen-item index.");
        describe_counter!("pipeline_runs_total", "Runs by terminal outcome.");
        describe_counter!("pipeline_busy_total", "Triggers rejected because a run was in progress.");
        describe_gauge!("pipeline_last_run_ts", "Unix time of the last finished run.");
        describe_counter!("publish_attempts_total", "Post attempts against the platform.");
        describe_counter!("publish_retries_total", "Backoff retries after transient publish failures.");
        describe_counter!("credential_refresh_total", "Credential refreshes by result.");
        describe_counter!("review_notify_errors_total", "Review notifications that failed to send.");

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
