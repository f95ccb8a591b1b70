//! Execute one pipeline run from the command line and print its record.
//! Dry run unless `--post` is given.

use anyhow::{Context, Result};
use clap::Parser;

use news_autoposter::bootstrap::build_orchestrator;
use news_autoposter::config::{load_sources_default, load_sources_from, PipelineConfig};
use news_autoposter::init_tracing;

#[derive(Debug, Parser)]
#[command(name = "run_once", about = "Fetch, curate, write, verify and (optionally) post once")]
struct Args {
    /// Actually post to the platform (default: dry run).
    #[arg(long)]
    post: bool,

    /// How far back to fetch, in hours.
    #[arg(long, env = "FETCH_HOURS_BACK")]
    hours: Option<i64>,

    /// Minimum verifier confidence to publish (0-100).
    #[arg(long, env = "MIN_CONFIDENCE")]
    threshold: Option<u8>,

    /// Sources file (TOML or JSON); defaults to the usual lookup.
    #[arg(long)]
    sources: Option<std::path::PathBuf>,

    /// Reuse a run id; a finished run is returned without re-running.
    #[arg(long)]
    run_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let args = Args::parse();

    let mut cfg = PipelineConfig::from_env();
    cfg.dry_run = !args.post;
    if let Some(h) = args.hours {
        cfg.fetch_hours_back = h.clamp(1, 24 * 30);
    }
    if let Some(t) = args.threshold {
        cfg.min_confidence = t.min(100);
    }

    let sources = match &args.sources {
        Some(p) => load_sources_from(p)?,
        None => load_sources_default()?,
    };
    let orch = build_orchestrator(&cfg, sources).await?;
    let record = orch.run(args.run_id).await.context("run did not finish")?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
