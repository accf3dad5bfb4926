//! Queue counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub depth: usize,
    /// Failed jobs waiting out their retry delay.
    pub delayed: usize,
    /// Active capacity after memory-pressure scaling.
    pub capacity: usize,
    pub ceiling: usize,
    pub in_flight: usize,
    /// Signatures queued, in flight or waiting for a delayed retry.
    pub pending_signatures: usize,
    /// Enqueues refused because the queue was at capacity.
    pub rejected_count: u64,
    /// Enqueues skipped because the signature was already pending.
    pub deduplicated: u64,
    pub accepted: u64,
    pub completed: u64,
    pub failed_attempts: u64,
    /// Jobs dropped after their last attempt failed.
    pub dropped_exhausted: u64,
    /// Jobs dropped without I/O because the breaker was open.
    pub breaker_rejected: u64,
    pub rate_limited: u64,
    pub requeued: u64,
    /// Queued jobs discarded when capacity shrank under pressure.
    pub shed: u64,
}

#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    pub rejected: AtomicU64,
    pub deduplicated: AtomicU64,
    pub accepted: AtomicU64,
    pub completed: AtomicU64,
    pub failed_attempts: AtomicU64,
    pub dropped_exhausted: AtomicU64,
    pub breaker_rejected: AtomicU64,
    pub rate_limited: AtomicU64,
    pub requeued: AtomicU64,
    pub shed: AtomicU64,
}

impl QueueCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fill(&self, stats: &mut QueueStats) {
        stats.rejected_count = self.rejected.load(Ordering::Relaxed);
        stats.deduplicated = self.deduplicated.load(Ordering::Relaxed);
        stats.accepted = self.accepted.load(Ordering::Relaxed);
        stats.completed = self.completed.load(Ordering::Relaxed);
        stats.failed_attempts = self.failed_attempts.load(Ordering::Relaxed);
        stats.dropped_exhausted = self.dropped_exhausted.load(Ordering::Relaxed);
        stats.breaker_rejected = self.breaker_rejected.load(Ordering::Relaxed);
        stats.rate_limited = self.rate_limited.load(Ordering::Relaxed);
        stats.requeued = self.requeued.load(Ordering::Relaxed);
        stats.shed = self.shed.load(Ordering::Relaxed);
    }
}
