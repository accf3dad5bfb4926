use crate::cache::CacheStats;
use crate::pressure::MemoryPressure;
use crate::queue::QueueStats;
use crate::resilience::{CircuitSnapshot, CircuitState, RateLimiterSnapshot};
use crate::transport::PoolSnapshot;

/// Point-in-time view of every pipeline component.
///
/// Facts only, no policy: hosts can export these as metrics or build health
/// checks on top.
#[derive(Debug, Clone)]
pub struct PipelineSignals {
    pub pressure: MemoryPressure,
    pub queue: QueueStats,
    pub cache: CacheStats,
    /// One entry per downstream target, sorted by name.
    pub breakers: Vec<(String, CircuitSnapshot)>,
    pub pool: PoolSnapshot,
    pub rate_limiter: RateLimiterSnapshot,
}

impl PipelineSignals {
    /// True if any breaker currently refuses calls.
    pub fn any_breaker_open(&self) -> bool {
        self.breakers
            .iter()
            .any(|(_, s)| s.state == CircuitState::Open)
    }

    /// Whether the distributed rate limiter is running on local fallback.
    pub fn rate_limiter_degraded(&self) -> bool {
        self.rate_limiter.degraded
    }
}
