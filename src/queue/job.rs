use crate::signature::ErrorSignature;
use crate::types::ErrorReport;
use std::time::Instant;
use uuid::Uuid;

/// Rate-limit key used when a report does not carry one.
pub const GLOBAL_RATE_KEY: &str = "global";

/// One pending analysis. Owned by the queue until a worker takes it.
#[derive(Debug, Clone)]
pub struct QueueJob {
    /// Also sent as the provider request id, so every attempt correlates.
    pub id: Uuid,
    pub signature: ErrorSignature,
    /// The report as first seen.
    pub snapshot: ErrorReport,
    pub rate_key: String,
    pub enqueued_at: Instant,
    pub attempts: u32,
}

impl QueueJob {
    pub fn new(signature: ErrorSignature, snapshot: ErrorReport) -> Self {
        let rate_key = snapshot
            .rate_key
            .clone()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| GLOBAL_RATE_KEY.to_string());
        Self {
            id: Uuid::new_v4(),
            signature,
            snapshot,
            rate_key,
            enqueued_at: Instant::now(),
            attempts: 0,
        }
    }

    pub fn from_report(report: ErrorReport) -> Self {
        Self::new(ErrorSignature::from_report(&report), report)
    }
}
