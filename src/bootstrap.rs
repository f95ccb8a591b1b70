//! Wires production components from config and environment.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::agents::llm::{ChatClient, LlmCurator, LlmVerifier, LlmWriter};
use crate::config::{PipelineConfig, SourcesConfig};
use crate::dedup::{Deduplicator, JsonSeenIndexStore};
use crate::ingest::article::HttpArticleFetcher;
use crate::ingest::providers::http_client;
use crate::ingest::SourceFetcher;
use crate::notify::NotifierMux;
use crate::pipeline::{Capabilities, Orchestrator};
use crate::publish::credential::{
    seed_if_empty, Credential, CredentialStore, JsonCredentialStore, MemoryCredentialStore,
    OAuthRefresher, TokenRefresher,
};
use crate::publish::platform::{DryRunPlatform, LinkedInClient, PlatformClient};
use crate::publish::Publisher;
use crate::review::ReviewSink;
use crate::runs::{JsonRunStore, RunStore};

fn env_lookup(k: &str) -> Option<String> {
    std::env::var(k).ok()
}

pub fn build_fetcher(cfg: &PipelineConfig, sources: SourcesConfig) -> Result<SourceFetcher> {
    let client = http_client()?;
    let providers = sources.into_providers(client, env_lookup);
    Ok(SourceFetcher::new(providers)
        .with_concurrency(cfg.fetch_concurrency)
        .with_source_timeout(Duration::from_secs(cfg.source_timeout_secs)))
}

pub fn build_capabilities() -> Result<Capabilities> {
    let chat = ChatClient::from_env()?
        .context("OPENAI_API_KEY is not set; curator, writer and verifier need it")?;
    let chat = Arc::new(chat);
    Ok(Capabilities {
        curator: Arc::new(LlmCurator::new(chat.clone())),
        writer: Arc::new(LlmWriter::new(chat.clone())),
        verifier: Arc::new(LlmVerifier::new(chat)),
    })
}

pub async fn build_publisher(cfg: &PipelineConfig) -> Result<Publisher> {
    let (platform, credentials): (Arc<dyn PlatformClient>, Arc<dyn CredentialStore>) = if cfg.dry_run {
        tracing::warn!(target: "publish", "DRY_RUN enabled; nothing will be posted");
        let placeholder = Credential::new("dry-run", Utc::now() + chrono::Duration::days(365), None);
        (
            Arc::new(DryRunPlatform),
            Arc::new(MemoryCredentialStore::new(Some(placeholder))),
        )
    } else {
        let store = JsonCredentialStore::new(cfg.credential_path());
        seed_if_empty(&store, Credential::from_lookup(env_lookup, Utc::now()))
            .await
            .context("seeding credential store")?;
        (Arc::new(LinkedInClient::new()?), Arc::new(store))
    };

    let refresher = OAuthRefresher::linkedin_from_lookup(http_client()?, env_lookup)
        .map(|r| Arc::new(r) as Arc<dyn TokenRefresher>);
    if refresher.is_none() && !cfg.dry_run {
        tracing::warn!(target: "publish", "LINKEDIN_CLIENT_ID/SECRET not set; tokens cannot be refreshed");
    }

    Ok(Publisher::new(platform, credentials, refresher)
        .with_retry(cfg.retry_policy())
        .with_safety_margin(chrono::Duration::seconds(cfg.credential_safety_margin_secs)))
}

/// Full production orchestrator with durable state under `cfg.state_dir`.
pub async fn build_orchestrator(cfg: &PipelineConfig, sources: SourcesConfig) -> Result<Arc<Orchestrator>> {
    let fetcher = Arc::new(build_fetcher(cfg, sources)?);
    let dedup = Deduplicator::new(
        Arc::new(JsonSeenIndexStore::new(cfg.seen_index_path())),
        cfg.dedup_window_days,
    );
    let caps = build_capabilities()?;
    let publisher = Arc::new(build_publisher(cfg).await?);
    let runs: Arc<dyn RunStore> = Arc::new(JsonRunStore::new(cfg.runs_dir()));
    let review = ReviewSink::new(runs.clone(), NotifierMux::from_env());

    tracing::info!(
        sources = fetcher.source_names().len(),
        state_dir = %cfg.state_dir.display(),
        platform = publisher.platform_name(),
        min_confidence = cfg.min_confidence,
        "orchestrator ready"
    );

    let articles = Arc::new(HttpArticleFetcher::new(http_client()?));
    Ok(Arc::new(
        Orchestrator::new(fetcher, dedup, caps, publisher, review, runs, cfg.run_settings())
            .with_article_fetcher(articles),
    ))
}
