// src/ingest/providers/mod.rs
pub mod feed;
pub mod gnews;
pub mod fixed;

pub use feed::FeedProvider;
pub use fixed::FixedProvider;
pub use gnews::GNewsProvider;

use std::time::Duration;

pub(crate) const USER_AGENT: &str = "news-autoposter/0.1 (+feed reader)";

/// Shared HTTP client for source providers. The per-source deadline is
/// enforced by the fetcher; this only bounds connect time.
pub fn http_client() -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .context("building source http client")
}
