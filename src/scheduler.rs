// src/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::PipelineError;
use crate::pipeline::Orchestrator;

/// Trigger a run every `every`. The first run happens one period after start.
/// A tick that finds a run in progress is skipped, not queued.
pub fn spawn_interval_trigger(orch: Arc<Orchestrator>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(target: "pipeline", every_secs = every.as_secs(), "interval trigger started");
        loop {
            ticker.tick().await;
            match orch.trigger().await {
                Ok(r) => tracing::info!(
                    target: "pipeline",
                    run_id = %r.run_id,
                    outcome = ?r.outcome,
                    "scheduled run finished"
                ),
                Err(PipelineError::Busy) => {
                    tracing::info!(target: "pipeline", "scheduled tick skipped; run in progress")
                }
                Err(e) => tracing::warn!(target: "pipeline", error = %e, "scheduled run did not finish"),
            }
        }
    })
}
