use std::time::Duration;

use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{Notifier, ReviewNotice};

const SMTP_TIMEOUT: Duration = Duration::from_secs(20);

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailSender {
    /// `Ok(None)` when `SMTP_HOST` is unset; an error when it is set but the
    /// rest of the SMTP config is missing or invalid.
    pub fn from_env() -> Result<Option<Self>> {
        let Some(host) = std::env::var("SMTP_HOST").ok().filter(|h| !h.trim().is_empty()) else {
            return Ok(None);
        };
        let var = |k: &str| std::env::var(k).with_context(|| format!("{k} missing"));
        let user = var("SMTP_USER")?;
        let pass = var("SMTP_PASS")?;
        let from_addr = var("NOTIFY_EMAIL_FROM")?;
        let to_addr = var("NOTIFY_EMAIL_TO")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(host.trim())
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        let from = from_addr.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        let to = to_addr.parse().context("invalid NOTIFY_EMAIL_TO")?;

        Ok(Some(Self { mailer, from, to }))
    }
}

#[async_trait::async_trait]
impl Notifier for EmailSender {
    async fn send(&self, notice: &ReviewNotice) -> Result<()> {
        let body = format!(
            "Run: {}\nTime: {}\n{}\nIssues:\n{}\n\nDraft:\n{}\n",
            notice.run_id,
            notice.ts.to_rfc3339(),
            notice
                .error
                .as_deref()
                .map(|e| format!("Publish error: {e}\n"))
                .unwrap_or_default(),
            notice.issues_text(),
            notice.body
        );

        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(notice.headline())
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }

    fn name(&self) -> &str {
        "email"
    }
}
