// src/publish/mod.rs
//! Publisher: credential lifecycle + bounded retries around a [`PlatformClient`].
//!
//! The publisher is the only writer of the stored [`Credential`]. The
//! orchestrator's run lock keeps two publishes from refreshing concurrently.

pub mod credential;
pub mod platform;
pub mod retry;

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use metrics::counter;

use crate::agents::Draft;
use crate::error::PublishError;
use crate::publish::credential::{Credential, CredentialStore, TokenRefresher};
use crate::publish::platform::{PlatformClient, PostError, TokenStatus};
use crate::publish::retry::RetryPolicy;

pub use credential::DEFAULT_SAFETY_MARGIN_SECS;

pub struct Publisher {
    platform: Arc<dyn PlatformClient>,
    credentials: Arc<dyn CredentialStore>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    retry: RetryPolicy,
    safety_margin: ChronoDuration,
}

impl Publisher {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        credentials: Arc<dyn CredentialStore>,
        refresher: Option<Arc<dyn TokenRefresher>>,
    ) -> Self {
        Self {
            platform,
            credentials,
            refresher,
            retry: RetryPolicy::default(),
            safety_margin: ChronoDuration::seconds(DEFAULT_SAFETY_MARGIN_SECS),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_safety_margin(mut self, margin: ChronoDuration) -> Self {
        self.safety_margin = margin;
        self
    }

    pub fn platform_name(&self) -> &str {
        self.platform.name()
    }

    pub async fn publish(&self, draft: &Draft) -> Result<String, PublishError> {
        self.publish_content(&draft.body).await
    }

    /// Post raw content. Returns the public url.
    pub async fn publish_content(&self, content: &str) -> Result<String, PublishError> {
        let (mut cred, mut refreshed) = self.usable_credential().await?;
        let mut tries: u32 = 0;

        loop {
            tries += 1;
            counter!("publish_attempts_total").increment(1);
            match self.platform.post(&cred.access_token, content).await {
                Ok(url) => {
                    tracing::info!(target: "publish", platform = self.platform.name(), tries, "published");
                    return Ok(url);
                }
                Err(PostError::Rejected { status, message }) => {
                    tracing::warn!(target: "publish", status, "platform rejected content");
                    return Err(PublishError::Rejected { status, message });
                }
                Err(PostError::Unauthorized { status }) if refreshed => {
                    tracing::warn!(target: "publish", status, "fresh token rejected");
                    return Err(PublishError::Unauthorized { status });
                }
                Err(PostError::Unauthorized { status }) => {
                    tracing::info!(target: "publish", status, "token rejected; forcing one refresh");
                    cred = self.refresh(&cred).await?;
                    refreshed = true;
                    // The auth retry does not spend the transient budget.
                    tries -= 1;
                }
                Err(PostError::Transient(msg)) => {
                    if tries >= self.retry.max_attempts {
                        tracing::warn!(target: "publish", tries, error = %msg, "retries exhausted");
                        return Err(PublishError::RetriesExhausted {
                            attempts: tries,
                            last_error: msg,
                        });
                    }
                    let delay = self.retry.delay_before_retry(tries);
                    counter!("publish_retries_total").increment(1);
                    tracing::info!(target: "publish", attempt = tries, delay_ms = delay.as_millis() as u64, error = %msg, "transient publish failure; backing off");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Report whether the stored token is accepted by the platform.
    pub async fn validate(&self) -> Result<TokenStatus, PublishError> {
        let Some(cred) = self.credentials.load().await? else {
            return Ok(TokenStatus {
                valid: false,
                user_name: None,
                error: Some("no credential configured".into()),
            });
        };
        if cred.is_expired(Utc::now()) {
            return Ok(TokenStatus {
                valid: false,
                user_name: None,
                error: Some(format!("token expired at {}", cred.expires_at)),
            });
        }
        match self.platform.validate(&cred.access_token).await {
            Ok(s) => Ok(s),
            Err(e) => Ok(TokenStatus {
                valid: false,
                user_name: None,
                error: Some(e.to_string()),
            }),
        }
    }

    /// Load the credential, refreshing first when inside the safety margin.
    /// The flag says whether a refresh already happened.
    async fn usable_credential(&self) -> Result<(Credential, bool), PublishError> {
        let now = Utc::now();
        let Some(cred) = self.credentials.load().await? else {
            return Err(PublishError::CredentialExpired {
                reason: "no credential configured".into(),
            });
        };
        if !cred.needs_refresh(now, self.safety_margin) {
            return Ok((cred, false));
        }
        if cred.refresh_token.is_none() && !cred.is_expired(now) {
            tracing::warn!(target: "publish", expires_at = %cred.expires_at, "token near expiry and no refresh token; using it as is");
            return Ok((cred, false));
        }
        let fresh = self.refresh(&cred).await?;
        Ok((fresh, true))
    }

    async fn refresh(&self, current: &Credential) -> Result<Credential, PublishError> {
        let Some(refresh_token) = current.refresh_token.as_deref() else {
            counter!("credential_refresh_total", "result" => "unavailable").increment(1);
            return Err(PublishError::CredentialExpired {
                reason: "no refresh token available".into(),
            });
        };
        let Some(refresher) = &self.refresher else {
            counter!("credential_refresh_total", "result" => "unavailable").increment(1);
            return Err(PublishError::CredentialExpired {
                reason: "no refresher configured".into(),
            });
        };
        match refresher.refresh(refresh_token).await {
            Ok(fresh) => {
                self.credentials.save(&fresh).await?;
                counter!("credential_refresh_total", "result" => "ok").increment(1);
                tracing::info!(target: "publish", expires_at = %fresh.expires_at, "credential refreshed");
                Ok(fresh)
            }
            Err(e) => {
                counter!("credential_refresh_total", "result" => "error").increment(1);
                tracing::warn!(target: "publish", error = %e, "credential refresh failed");
                Err(PublishError::CredentialExpired {
                    reason: e.to_string(),
                })
            }
        }
    }
}
