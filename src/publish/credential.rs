// src/publish/credential.rs
//! Publish-target credential, its durable store, and the refresh grant.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::{read_json, write_json_atomic};

pub const LINKEDIN_TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
pub const DEFAULT_SAFETY_MARGIN_SECS: i64 = 300;

/// Lifetime assumed for a seeded token whose expiry was not provided.
const SEEDED_TOKEN_LIFETIME_DAYS: i64 = 60;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

// Tokens never reach logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &format_args!("<{} chars>", self.access_token.len()))
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
            refresh_token: refresh_token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// True once `now` is within `margin` of expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at - margin <= now
    }

    /// Build from `LINKEDIN_*` values resolved through `lookup`.
    pub fn from_lookup<F>(lookup: F, now: DateTime<Utc>) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("LINKEDIN_ACCESS_TOKEN").filter(|t| !t.trim().is_empty())?;
        let expires_at = match lookup("LINKEDIN_TOKEN_EXPIRES_AT") {
            Some(raw) => match DateTime::parse_from_rfc3339(raw.trim()) {
                Ok(ts) => ts.with_timezone(&Utc),
                Err(e) => {
                    tracing::warn!(target: "publish", error = %e, "LINKEDIN_TOKEN_EXPIRES_AT is not RFC3339; treating token as expired");
                    now
                }
            },
            None => {
                tracing::warn!(target: "publish", days = SEEDED_TOKEN_LIFETIME_DAYS, "LINKEDIN_TOKEN_EXPIRES_AT not set; assuming default token lifetime");
                now + Duration::days(SEEDED_TOKEN_LIFETIME_DAYS)
            }
        };
        Some(Self::new(
            token.trim(),
            expires_at,
            lookup("LINKEDIN_REFRESH_TOKEN").map(|t| t.trim().to_string()),
        ))
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credential>, StoreError>;
    async fn save(&self, credential: &Credential) -> Result<(), StoreError>;
}

pub struct JsonCredentialStore {
    path: PathBuf,
}

impl JsonCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialStore for JsonCredentialStore {
    async fn load(&self) -> Result<Option<Credential>, StoreError> {
        read_json(&self.path).await
    }

    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        write_json_atomic(&self.path, credential).await
    }
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new(initial: Option<Credential>) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }

    pub async fn snapshot(&self) -> Option<Credential> {
        self.inner.lock().await.clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self.inner.lock().await.clone())
    }

    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        *self.inner.lock().await = Some(credential.clone());
        Ok(())
    }
}

/// Seed `store` from the environment when it holds nothing yet. A stored
/// credential always wins, since it may carry a newer refreshed token.
pub async fn seed_if_empty(
    store: &dyn CredentialStore,
    seed: Option<Credential>,
) -> Result<bool, StoreError> {
    if store.load().await?.is_some() {
        return Ok(false);
    }
    match seed {
        Some(c) => {
            store.save(&c).await?;
            tracing::info!(target: "publish", expires_at = %c.expires_at, "credential store seeded from environment");
            Ok(true)
        }
        None => Ok(false),
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("token endpoint unreachable: {0}")]
    Transport(String),
    #[error("token endpoint returned HTTP {0}")]
    Status(u16),
    #[error("token endpoint response malformed: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, RefreshError>;
}

/// OAuth2 `refresh_token` grant.
pub struct OAuthRefresher {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl OAuthRefresher {
    pub fn new(
        client: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// `LINKEDIN_CLIENT_ID` / `LINKEDIN_CLIENT_SECRET`; `None` if either is missing.
    pub fn linkedin_from_lookup<F>(client: reqwest::Client, lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let id = lookup("LINKEDIN_CLIENT_ID").filter(|v| !v.trim().is_empty())?;
        let secret = lookup("LINKEDIN_CLIENT_SECRET").filter(|v| !v.trim().is_empty())?;
        Some(Self::new(client, LINKEDIN_TOKEN_URL, id.trim(), secret.trim()))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<Credential, RefreshError> {
        let resp = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.without_url().to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RefreshError::Status(status.as_u16()));
        }
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| RefreshError::Malformed(e.without_url().to_string()))?;
        if body.access_token.trim().is_empty() {
            return Err(RefreshError::Malformed("empty access_token".into()));
        }
        Ok(Credential::new(
            body.access_token,
            Utc::now() + Duration::seconds(body.expires_in.max(0)),
            // Some providers rotate the refresh token, others keep it.
            body.refresh_token.or_else(|| Some(refresh_token.to_string())),
        ))
    }
}

/// Refresher that hands out a fixed result.
pub struct StaticRefresher {
    result: Result<Credential, u16>,
    calls: AtomicUsize,
}

impl StaticRefresher {
    pub fn ok(credential: Credential) -> Self {
        Self {
            result: Ok(credential),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            result: Err(status),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for StaticRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<Credential, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(RefreshError::Status)
    }
}
