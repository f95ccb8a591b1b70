// src/agents/llm.rs
//! Model-backed Curator / Writer / Verifier over the OpenAI chat-completions API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::agents::prompts;
use crate::agents::{
    CuratedItem, Curator, CurationResult, Draft, VerificationReport, Verifier, Writer,
};
use crate::error::{CapabilityError, CapabilityStage};
use crate::ingest::types::NewsItem;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Thin chat-completions client. The stage deadline is enforced by the
/// orchestrator, so the request timeout here is only a backstop.
pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("api_key_len", &self.api_key.len())
            .finish()
    }
}

impl ChatClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(crate::ingest::providers::USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(300))
            .build()
            .context("building chat http client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: CHAT_COMPLETIONS_URL.to_string(),
        })
    }

    /// `OPENAI_API_KEY` + optional `OPENAI_MODEL`. `Ok(None)` when no key is set.
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        let key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        if key.trim().is_empty() {
            return Ok(None);
        }
        let model = std::env::var("OPENAI_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self::new(key.trim(), model).map(Some)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub async fn complete(
        &self,
        stage: CapabilityStage,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, CapabilityError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ResponseFormat {
            #[serde(rename = "type")]
            kind: &'static str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            response_format: ResponseFormat,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| CapabilityError::failed(stage, e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CapabilityError::failed(
                stage,
                format!("model endpoint returned HTTP {}", status.as_u16()),
            ));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| CapabilityError::failed(stage, e.without_url().to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CapabilityError::failed(stage, "empty completion"))
    }
}

/// Parse the first JSON object in `raw`, tolerating code fences or prose around it.
pub fn extract_json<T: DeserializeOwned>(
    stage: CapabilityStage,
    raw: &str,
) -> Result<T, CapabilityError> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let slice = match (start, end) {
        (Some(s), Some(e)) if e > s => &raw[s..=e],
        _ => return Err(CapabilityError::breach(stage, "response contained no JSON object")),
    };
    serde_json::from_str(slice)
        .map_err(|e| CapabilityError::breach(stage, format!("malformed JSON response: {e}")))
}

#[derive(Debug, Deserialize)]
struct Selection {
    #[serde(default)]
    selected: Vec<Pick>,
}

#[derive(Debug, Deserialize)]
struct Pick {
    index: usize,
    #[serde(default)]
    justification: String,
}

#[derive(Debug, Deserialize)]
struct DraftJson {
    body: String,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ClaimsJson {
    #[serde(default)]
    claims: Vec<Claim>,
}

#[derive(Debug, Deserialize)]
struct Claim {
    claim: String,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    note: String,
}

pub struct LlmCurator {
    chat: Arc<ChatClient>,
}

impl LlmCurator {
    pub fn new(chat: Arc<ChatClient>) -> Self {
        Self { chat }
    }
}

/// Map 1-based picks back onto `items`. Out-of-range indices are a breach;
/// repeats are left for the orchestrator's curation check.
fn resolve_picks(items: &[NewsItem], picks: Vec<Pick>) -> Result<CurationResult, CapabilityError> {
    let mut out = Vec::with_capacity(picks.len());
    for p in picks {
        let item = p
            .index
            .checked_sub(1)
            .and_then(|i| items.get(i))
            .ok_or_else(|| {
                CapabilityError::breach(
                    CapabilityStage::Curation,
                    format!("selected article {} of {}", p.index, items.len()),
                )
            })?;
        out.push(CuratedItem::new(item.clone(), p.justification));
    }
    Ok(CurationResult { items: out })
}

#[async_trait]
impl Curator for LlmCurator {
    async fn select(&self, items: &[NewsItem]) -> Result<CurationResult, CapabilityError> {
        if items.is_empty() {
            return Ok(CurationResult::empty());
        }
        let stage = CapabilityStage::Curation;
        let raw = self
            .chat
            .complete(stage, prompts::CURATOR_SYSTEM, &prompts::curator_input(items), 0.2)
            .await?;
        let sel: Selection = extract_json(stage, &raw)?;
        resolve_picks(items, sel.selected)
    }
}

pub struct LlmWriter {
    chat: Arc<ChatClient>,
}

impl LlmWriter {
    pub fn new(chat: Arc<ChatClient>) -> Self {
        Self { chat }
    }

    async fn write(&self, system: &str, user: &str) -> Result<Draft, CapabilityError> {
        let stage = CapabilityStage::Writing;
        let raw = self.chat.complete(stage, system, user, 0.7).await?;
        let d: DraftJson = extract_json(stage, &raw)?;
        if d.body.trim().is_empty() {
            return Err(CapabilityError::breach(stage, "empty draft body"));
        }
        Ok(Draft::new(d.body.trim(), d.citations.into_iter().map(|u| u.trim().to_string())))
    }
}

#[async_trait]
impl Writer for LlmWriter {
    async fn draft(&self, curation: &CurationResult) -> Result<Draft, CapabilityError> {
        self.write(prompts::WRITER_SYSTEM, &prompts::sources_block(curation))
            .await
    }

    async fn revise(
        &self,
        draft: &Draft,
        report: &VerificationReport,
        curation: &CurationResult,
    ) -> Result<Option<Draft>, CapabilityError> {
        self.write(
            prompts::REVISER_SYSTEM,
            &prompts::reviser_input(draft, report, curation),
        )
        .await
        .map(Some)
    }
}

pub struct LlmVerifier {
    chat: Arc<ChatClient>,
}

impl LlmVerifier {
    pub fn new(chat: Arc<ChatClient>) -> Self {
        Self { chat }
    }
}

/// Confidence is the verified share of claims; a draft with no factual
/// claims has nothing unsupported and scores 100.
fn score_claims(claims: Vec<Claim>) -> VerificationReport {
    let total = claims.len();
    let ok = claims.iter().filter(|c| c.verified).count();
    let confidence = if total == 0 {
        100
    } else {
        ((ok * 100) / total) as u8
    };
    let issues: Vec<String> = claims
        .into_iter()
        .filter(|c| !c.verified)
        .map(|c| {
            if c.note.trim().is_empty() {
                format!("unsupported claim: {}", c.claim)
            } else {
                format!("unsupported claim: {} ({})", c.claim, c.note.trim())
            }
        })
        .collect();
    VerificationReport::new(issues.is_empty(), confidence, issues)
}

#[async_trait]
impl Verifier for LlmVerifier {
    async fn verify(
        &self,
        draft: &Draft,
        sources: &CurationResult,
    ) -> Result<VerificationReport, CapabilityError> {
        let stage = CapabilityStage::Verification;
        let raw = self
            .chat
            .complete(
                stage,
                prompts::VERIFIER_SYSTEM,
                &prompts::verifier_input(draft, sources),
                0.0,
            )
            .await?;
        let parsed: ClaimsJson = extract_json(stage, &raw)?;
        Ok(score_claims(parsed.claims))
    }
}
