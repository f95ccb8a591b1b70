use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::{PipelineError, PublishError};
use crate::ingest::types::NewsItem;
use crate::pipeline::{Begun, Orchestrator};
use crate::publish::platform::TokenStatus;
use crate::runs::RunRecord;

const DEFAULT_RUNS_LIMIT: usize = 20;
const MAX_RUNS_LIMIT: usize = 100;
const MAX_HOURS_BACK: i64 = 24 * 30;

#[derive(Clone)]
pub struct AppState {
    pub orch: Arc<Orchestrator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/trigger", post(trigger))
        .route("/cancel", post(cancel))
        .route("/runs", get(list_runs))
        .route("/runs/{run_id}", get(get_run))
        .route("/fetch_news", post(fetch_news))
        .route("/publish", post(publish))
        .route("/publish/validate", get(validate_publish))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Error payload for every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let msg = e.to_string();
        match e {
            PipelineError::Busy => Self::new(StatusCode::CONFLICT, "busy", msg),
            PipelineError::IncompleteRun { .. } => Self::new(StatusCode::CONFLICT, "incomplete_run", msg),
            PipelineError::Cancelled { .. } => Self::new(StatusCode::SERVICE_UNAVAILABLE, "cancelled", msg),
            PipelineError::Store(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
        }
    }
}

impl From<PublishError> for ApiError {
    fn from(e: PublishError) -> Self {
        let msg = e.to_string();
        match e {
            PublishError::CredentialExpired { .. } => Self::new(StatusCode::UNAUTHORIZED, "credential_expired", msg),
            PublishError::Unauthorized { .. } => Self::new(StatusCode::UNAUTHORIZED, "unauthorized", msg),
            PublishError::Rejected { .. } => Self::new(StatusCode::UNPROCESSABLE_ENTITY, "rejected", msg),
            PublishError::RetriesExhausted { .. } => Self::new(StatusCode::BAD_GATEWAY, "retries_exhausted", msg),
            PublishError::Timeout { .. } => Self::new(StatusCode::GATEWAY_TIMEOUT, "timeout", msg),
            PublishError::Store(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct TriggerQuery {
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    run_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerAccepted {
    pub run_id: String,
    pub status: String,
}

async fn trigger(
    State(state): State<AppState>,
    Query(q): Query<TriggerQuery>,
) -> Result<Response, ApiError> {
    let run_id = q.run_id.filter(|s| !s.trim().is_empty());
    let is_async = q.mode.as_deref().is_some_and(|m| m.eq_ignore_ascii_case("async"));

    if !is_async {
        let record = state.orch.run(run_id).await?;
        return Ok(Json(record).into_response());
    }

    match state.orch.begin(run_id).await? {
        Begun::Replayed(r) => Ok(Json(TriggerAccepted {
            run_id: r.run_id,
            status: "replayed".into(),
        })
        .into_response()),
        Begun::Fresh(started) => {
            let run_id = started.run_id().to_string();
            let orch = state.orch.clone();
            tokio::spawn(async move {
                if let Err(e) = orch.execute(started).await {
                    tracing::warn!(target: "pipeline", error = %e, "async run did not finish");
                }
            });
            Ok(Json(TriggerAccepted {
                run_id,
                status: "accepted".into(),
            })
            .into_response())
        }
    }
}

async fn cancel(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cancelled = state.orch.is_busy() && state.orch.cancel_current();
    Json(serde_json::json!({ "cancelled": cancelled }))
}

#[derive(Debug, Default, Deserialize)]
struct RunsQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_runs(
    State(state): State<AppState>,
    Query(q): Query<RunsQuery>,
) -> Result<Json<Vec<RunRecord>>, ApiError> {
    let limit = q.limit.unwrap_or(DEFAULT_RUNS_LIMIT).clamp(1, MAX_RUNS_LIMIT);
    let runs = state
        .orch
        .runs()
        .recent(limit)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()))?;
    Ok(Json(runs))
}

async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunRecord>, ApiError> {
    match state.orch.runs().get(&run_id).await {
        Ok(Some(r)) => Ok(Json(r)),
        Ok(None) => Err(ApiError::new(StatusCode::NOT_FOUND, "not_found", format!("no run {run_id}"))),
        Err(e) => Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())),
    }
}

#[derive(Debug, Default, Deserialize)]
struct FetchReq {
    #[serde(default)]
    hours_back: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FetchResp {
    pub items: Vec<NewsItem>,
    pub failed_sources: Vec<String>,
}

/// Fetch-only tool surface. Does not touch the seen index.
async fn fetch_news(
    State(state): State<AppState>,
    body: Option<Json<FetchReq>>,
) -> Result<Json<FetchResp>, ApiError> {
    let hours = body
        .and_then(|Json(b)| b.hours_back)
        .unwrap_or(state.orch.settings().hours_back)
        .clamp(1, MAX_HOURS_BACK);
    let since = Utc::now() - chrono::Duration::hours(hours);
    match state.orch.fetcher().fetch(since).await {
        Ok(report) => Ok(Json(FetchResp {
            items: report.items,
            failed_sources: report.failed_sources,
        })),
        Err(e) => Err(ApiError::new(StatusCode::BAD_GATEWAY, "fetch_failed", e.to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct PublishReq {
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResp {
    pub url: String,
}

/// Direct publish tool surface. Holds the run lock, since publishing may
/// refresh the shared credential; `/cancel` stops it.
async fn publish(
    State(state): State<AppState>,
    Json(req): Json<PublishReq>,
) -> Result<Json<PublishResp>, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "empty_content", "content must not be empty"));
    }
    let url = state.orch.publish_content(&req.content).await??;
    Ok(Json(PublishResp { url }))
}

async fn validate_publish(State(state): State<AppState>) -> Result<Json<TokenStatus>, ApiError> {
    Ok(Json(state.orch.publisher().validate().await?))
}
