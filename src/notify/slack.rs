use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

use super::{Notifier, ReviewNotice};

/// Slack messages are capped well below the webhook limit.
const BODY_PREVIEW_CHARS: usize = 2500;

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
    timeout: Duration,
}

impl SlackNotifier {
    /// `None` when `SLACK_WEBHOOK_URL` is unset or blank.
    pub fn from_env() -> Option<Self> {
        std::env::var("SLACK_WEBHOOK_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .map(|u| Self::new(u.trim().to_string()))
    }

    pub fn new(url: String) -> Self {
        Self {
            webhook_url: url,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, notice: &ReviewNotice) -> Result<()> {
        let preview: String = notice.body.chars().take(BODY_PREVIEW_CHARS).collect();
        let text = format!(
            "*{}*\n*Issues:*\n{}\n*Draft:*\n```{}```",
            notice.headline(),
            notice.issues_text(),
            preview
        );
        let body = serde_json::json!({ "text": text });

        self.client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("slack post")?
            .error_for_status()
            .map_err(|e| e.without_url())
            .context("slack non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &str {
        "slack"
    }
}
