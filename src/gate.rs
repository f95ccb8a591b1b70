//! gate.rs: deterministic publish/review decision over a verification report.

use serde::{Deserialize, Serialize};

use crate::agents::VerificationReport;

pub const DEFAULT_MIN_CONFIDENCE: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDecision {
    Proceed,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityGate {
    pub min_confidence: u8,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl QualityGate {
    pub fn new(min_confidence: u8) -> Self {
        Self {
            min_confidence: min_confidence.min(100),
        }
    }

    /// Proceed iff verified and confidence reaches the threshold.
    pub fn decide(&self, report: &VerificationReport) -> GateDecision {
        if report.verified && report.confidence >= self.min_confidence {
            GateDecision::Proceed
        } else {
            GateDecision::Reject
        }
    }
}
