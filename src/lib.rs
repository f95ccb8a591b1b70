// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod agents;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod dedup;
pub mod error;
pub mod gate;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod publish;
pub mod review;
pub mod runs;
pub mod scheduler;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::{ErrorKind, PipelineError};
pub use crate::pipeline::{Orchestrator, RunSettings};
pub use crate::runs::{Outcome, RunRecord};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides the default filter;
/// `LOG_FORMAT=json` switches to JSON lines. A second call is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_autoposter=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
