//! News Auto-Poster: binary entrypoint
//! Boots the Axum HTTP server: trigger/run-history/tool routes, `/metrics`,
//! and the optional interval trigger.

use std::time::Duration;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;

use news_autoposter::bootstrap::build_orchestrator;
use news_autoposter::config::{load_sources_default, PipelineConfig};
use news_autoposter::metrics::Metrics;
use news_autoposter::scheduler::spawn_interval_trigger;
use news_autoposter::{init_tracing, router, AppState};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::from_env();
    let sources = load_sources_default().context("loading sources config")?;
    let orch = build_orchestrator(&cfg, sources).await?;

    if let Some(secs) = cfg.schedule_interval_secs {
        spawn_interval_trigger(orch.clone(), Duration::from_secs(secs));
    }

    let mut app = router(AppState { orch });
    match Metrics::init() {
        Ok(m) => app = app.merge(m.router()),
        Err(e) => tracing::warn!(error = %e, "metrics disabled"),
    }

    Ok(app.into())
}
