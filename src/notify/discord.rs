use super::{Notifier, ReviewNotice};
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Discord rejects embed descriptions over 4096 chars.
const DESCRIPTION_MAX_CHARS: usize = 3800;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    fn payload(notice: &ReviewNotice) -> DiscordWebhookPayload {
        let description: String = format!(
            "**Issues:**\n{}\n\n**Draft:**\n{}",
            notice.issues_text(),
            notice.body
        )
        .chars()
        .take(DESCRIPTION_MAX_CHARS)
        .collect();
        DiscordWebhookPayload::embed(&notice.headline(), &description)
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, notice: &ReviewNotice) -> Result<()> {
        let payload = Self::payload(notice);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Discord webhook HTTP error: {}", e.without_url()),
                },
                Err(e) => anyhow!("Discord webhook request failed: {}", e.without_url()),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }

    fn name(&self) -> &str {
        "discord"
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn embed(title: &str, description: &str) -> Self {
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: title.to_string(),
                description: description.to_string(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn long_drafts_are_truncated() {
        let n = ReviewNotice {
            run_id: "r".into(),
            body: "x".repeat(10_000),
            issues: vec![],
            error: None,
            ts: Utc::now(),
        };
        let p = DiscordNotifier::payload(&n);
        assert_eq!(p.embeds[0].description.chars().count(), DESCRIPTION_MAX_CHARS);
        assert_eq!(p.embeds[0].title, "Draft r needs review");
    }
}
