// src/publish/platform.rs
//! Target-platform clients. The publisher only sees [`PlatformClient`] and
//! the three-way [`PostError`] classification.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agents::content_fingerprint;

const LINKEDIN_API_URL: &str = "https://api.linkedin.com/v2";
const LINKEDIN_POST_URL: &str = "https://www.linkedin.com/feed/update";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostError {
    /// Network error, 5xx, 408 or 429; worth retrying.
    Transient(String),
    Unauthorized { status: u16 },
    Rejected { status: u16, message: String },
}

impl std::fmt::Display for PostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostError::Transient(m) => write!(f, "transient: {m}"),
            PostError::Unauthorized { status } => write!(f, "unauthorized (HTTP {status})"),
            PostError::Rejected { status, message } => write!(f, "rejected (HTTP {status}): {message}"),
        }
    }
}

pub fn classify_status(status: u16, body: &str) -> PostError {
    match status {
        401 | 403 => PostError::Unauthorized { status },
        408 | 429 | 500..=599 => PostError::Transient(format!("HTTP {status}")),
        _ => PostError::Rejected {
            status,
            message: body.chars().take(300).collect(),
        },
    }
}

/// What the platform reports about a token. Never carries the token itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStatus {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Post `content`; returns the public url of the post.
    async fn post(&self, access_token: &str, content: &str) -> Result<String, PostError>;
    async fn validate(&self, access_token: &str) -> Result<TokenStatus, PostError>;
    fn name(&self) -> &str;
}

/// LinkedIn UGC posts on behalf of the token's member.
pub struct LinkedInClient {
    http: reqwest::Client,
    api_url: String,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: Option<String>,
    name: Option<String>,
}

impl LinkedInClient {
    pub fn new() -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(crate::ingest::providers::USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .context("building platform http client")?;
        Ok(Self {
            http,
            api_url: LINKEDIN_API_URL.to_string(),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    async fn user_info(&self, access_token: &str) -> Result<UserInfo, PostError> {
        let resp = self
            .http
            .get(format!("{}/userinfo", self.api_url))
            .bearer_auth(access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .send()
            .await
            .map_err(|e| PostError::Transient(e.without_url().to_string()))?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        resp.json()
            .await
            .map_err(|e| PostError::Transient(e.without_url().to_string()))
    }
}

#[async_trait]
impl PlatformClient for LinkedInClient {
    async fn post(&self, access_token: &str, content: &str) -> Result<String, PostError> {
        let me = self.user_info(access_token).await?;
        let Some(sub) = me.sub.filter(|s| !s.is_empty()) else {
            return Err(PostError::Rejected {
                status: 200,
                message: "profile has no member id".into(),
            });
        };

        let payload = json!({
            "author": format!("urn:li:person:{sub}"),
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": {
                    "shareCommentary": { "text": content },
                    "shareMediaCategory": "NONE"
                }
            },
            "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" }
        });

        let resp = self
            .http
            .post(format!("{}/ugcPosts", self.api_url))
            .bearer_auth(access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&payload)
            .send()
            .await
            .map_err(|e| PostError::Transient(e.without_url().to_string()))?;

        let status = resp.status().as_u16();
        if status != 201 {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        let post_id = resp
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        Ok(format!("{LINKEDIN_POST_URL}/{post_id}"))
    }

    async fn validate(&self, access_token: &str) -> Result<TokenStatus, PostError> {
        match self.user_info(access_token).await {
            Ok(me) => Ok(TokenStatus {
                valid: true,
                user_name: me.name,
                error: None,
            }),
            Err(PostError::Unauthorized { status }) => Ok(TokenStatus {
                valid: false,
                user_name: None,
                error: Some(format!("token rejected (HTTP {status})")),
            }),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "linkedin"
    }
}

/// Logs instead of posting. The url is derived from the content.
#[derive(Default)]
pub struct DryRunPlatform;

#[async_trait]
impl PlatformClient for DryRunPlatform {
    async fn post(&self, _access_token: &str, content: &str) -> Result<String, PostError> {
        let fp = content_fingerprint(content);
        tracing::info!(target: "publish", fingerprint = %fp, chars = content.chars().count(), "dry run: not posting");
        Ok(format!("dry-run://{fp}"))
    }

    async fn validate(&self, _access_token: &str) -> Result<TokenStatus, PostError> {
        Ok(TokenStatus {
            valid: true,
            user_name: Some("dry-run".into()),
            error: None,
        })
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

/// Answers posts from a script; once exhausted every post succeeds.
pub struct ScriptedPlatform {
    script: Mutex<VecDeque<Result<String, PostError>>>,
    tokens: Mutex<Vec<String>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedPlatform {
    pub fn new(script: Vec<Result<String, PostError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            tokens: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Vec::new())
    }

    /// Every post takes `d` before answering.
    pub fn stalling(d: Duration) -> Self {
        Self {
            delay: Some(d),
            ..Self::succeeding()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Access tokens seen by `post`, in call order.
    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PlatformClient for ScriptedPlatform {
    async fn post(&self, access_token: &str, _content: &str) -> Result<String, PostError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut t) = self.tokens.lock() {
            t.push(access_token.to_string());
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(format!("https://platform.example/posts/{n}")))
    }

    async fn validate(&self, access_token: &str) -> Result<TokenStatus, PostError> {
        Ok(TokenStatus {
            valid: !access_token.is_empty(),
            user_name: None,
            error: None,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
