//! Typed errors for every pipeline stage.
//!
//! Stage errors are caught at the orchestrator boundary and folded into the
//! run's [`RunError`](crate::runs::RunError); only [`PipelineError`] escapes
//! to callers of the orchestrator.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-source fetch failure. Non-fatal unless every source fails.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source {source_name} unreachable: {message}")]
    Unreachable {
        source_name: String,
        message: String,
    },

    #[error("source {source_name} returned HTTP {status}")]
    Status { source_name: String, status: u16 },

    #[error("source {source_name} payload could not be parsed: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error("source {source_name} timed out after {secs}s")]
    Timeout { source_name: String, secs: u64 },

    #[error("source {source_name} misconfigured: {message}")]
    Misconfigured {
        source_name: String,
        message: String,
    },

    /// Every configured source failed; carries the names in fetch order.
    #[error("all {} sources failed: {}", failed.len(), failed.join(", "))]
    AllSourcesFailed { failed: Vec<String> },
}

/// Which external capability a [`CapabilityError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilityStage {
    Curation,
    Writing,
    Verification,
}

impl fmt::Display for CapabilityStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapabilityStage::Curation => "curation",
            CapabilityStage::Writing => "writing",
            CapabilityStage::Verification => "verification",
        };
        f.write_str(s)
    }
}

/// Curator / Writer / Verifier failure. Always fatal to the run.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("{stage} failed: {message}")]
    Failed {
        stage: CapabilityStage,
        message: String,
    },

    /// The capability returned output violating its I/O contract.
    #[error("{stage} contract breach: {message}")]
    ContractBreach {
        stage: CapabilityStage,
        message: String,
    },

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: CapabilityStage, secs: u64 },
}

impl CapabilityError {
    pub fn failed(stage: CapabilityStage, message: impl Into<String>) -> Self {
        Self::Failed {
            stage,
            message: message.into(),
        }
    }

    pub fn breach(stage: CapabilityStage, message: impl Into<String>) -> Self {
        Self::ContractBreach {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(&self) -> CapabilityStage {
        match self {
            Self::Failed { stage, .. }
            | Self::ContractBreach { stage, .. }
            | Self::Timeout { stage, .. } => *stage,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        if matches!(self, Self::Timeout { .. }) {
            return ErrorKind::Timeout;
        }
        match self.stage() {
            CapabilityStage::Curation => ErrorKind::Curation,
            CapabilityStage::Writing => ErrorKind::Writing,
            CapabilityStage::Verification => ErrorKind::Verification,
        }
    }
}

/// Unrecoverable publish failure. Every variant routes the draft to review.
#[derive(Debug, Error)]
pub enum PublishError {
    /// No usable token: missing, expired without refresh token, or refresh failed.
    #[error("credential expired: {reason}")]
    CredentialExpired { reason: String },

    /// Platform refused a freshly refreshed token.
    #[error("platform rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    /// Platform rejected the content itself; retrying would not help.
    #[error("platform rejected content (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("publish timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PublishError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CredentialExpired { .. } => ErrorKind::CredentialExpired,
            Self::Unauthorized { .. } => ErrorKind::PublishUnauthorized,
            Self::Rejected { .. } => ErrorKind::PublishRejected,
            Self::RetriesExhausted { .. } => ErrorKind::PublishRetriesExhausted,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Store(_) => ErrorKind::Store,
        }
    }
}

/// Durable state read/write failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed state in {}: {source}", path.display())]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A run record with an outcome may not be rewritten.
    #[error("run {run_id} already has a terminal outcome")]
    Immutable { run_id: String },
}

/// Errors surfaced by the orchestrator itself (not folded into a RunRecord).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a run is already in progress")]
    Busy,

    /// Cancelled at a suspension point; the run's outcome stays unset.
    #[error("run {run_id} cancelled before reaching a terminal state")]
    Cancelled { run_id: String },

    /// A stored record for this id has no outcome (crashed mid-run); not repaired.
    #[error("run {run_id} is incomplete and cannot be resumed")]
    IncompleteRun { run_id: String },

    #[error("run store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Error classification persisted on a RunRecord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Fetch,
    Dedup,
    Curation,
    Writing,
    Verification,
    Timeout,
    CredentialExpired,
    PublishUnauthorized,
    PublishRejected,
    PublishRetriesExhausted,
    Store,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_kind_follows_stage_unless_timeout() {
        let e = CapabilityError::failed(CapabilityStage::Writing, "boom");
        assert_eq!(e.kind(), ErrorKind::Writing);
        let t = CapabilityError::Timeout {
            stage: CapabilityStage::Verification,
            secs: 5,
        };
        assert_eq!(t.kind(), ErrorKind::Timeout);
        assert_eq!(t.stage(), CapabilityStage::Verification);
    }

    #[test]
    fn all_sources_failed_lists_names() {
        let e = FetchError::AllSourcesFailed {
            failed: vec!["OpenAI".into(), "GNews".into()],
        };
        assert_eq!(e.to_string(), "all 2 sources failed: OpenAI, GNews");
    }

    #[test]
    fn error_kind_serializes_as_variant_name() {
        let v = serde_json::to_value(ErrorKind::CredentialExpired).unwrap();
        assert_eq!(v, serde_json::json!("CredentialExpired"));
    }
}
