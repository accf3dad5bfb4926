//! Analysis results and the caller-facing outcome of `report_error`.

use crate::signature::ErrorSignature;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Advice returned by the analysis provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Advice {
    Text(String),
    Structured(serde_json::Value),
}

impl Advice {
    /// Text form of the advice; structured advice is rendered as JSON.
    pub fn as_text(&self) -> String {
        match self {
            Advice::Text(s) => s.clone(),
            Advice::Structured(v) => v.to_string(),
        }
    }
}

/// Advice for one signature. Never mutated once written; a newer analysis
/// replaces the whole entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub signature: ErrorSignature,
    pub advice: Advice,
    pub produced_at: SystemTime,
    pub ttl: Duration,
}

impl AnalysisResult {
    pub fn new(signature: ErrorSignature, advice: Advice, ttl: Duration) -> Self {
        Self {
            signature,
            advice,
            produced_at: SystemTime::now(),
            ttl,
        }
    }
}

/// What the caller of `report_error` gets back.
///
/// "Not analyzed yet", "provider down" and "rate limited" all look the same
/// from here: `Pending`.
#[derive(Debug, Clone)]
pub enum Reported {
    Advice(Arc<AnalysisResult>),
    /// No advice available; carries the signature key so it can be looked up later.
    Pending { signature_key: String },
}

impl Reported {
    pub fn advice(&self) -> Option<&AnalysisResult> {
        match self {
            Reported::Advice(result) => Some(result),
            Reported::Pending { .. } => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Reported::Pending { .. })
    }
}
