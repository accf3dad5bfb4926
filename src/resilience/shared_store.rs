//! Shared counter stores for distributed rate limiting.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("shared store unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected store reply: {0}")]
    Protocol(String),

    #[error("shared store did not answer within {0:?}")]
    Timeout(Duration),

    #[cfg(feature = "redis-store")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// A counter store shared by every process instance.
///
/// `incr_window` must increment and return the counter under `key` as one
/// atomic operation, setting `ttl` as its expiry when the key is created.
#[async_trait]
pub trait SharedCounterStore: Send + Sync {
    async fn incr_window(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    fn name(&self) -> &'static str;
}

/// Process-local store. Useful for tests and single-instance deployments
/// that still want the distributed code path.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: Mutex<HashMap<String, (u64, Instant)>>,
    offline: AtomicBool,
}

/// Expired counters are swept once the map grows past this size.
const SWEEP_THRESHOLD: usize = 4096;

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SharedCounterStore for InMemoryCounterStore {
    async fn incr_window(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".into()));
        }
        let now = Instant::now();
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        if counters.len() > SWEEP_THRESHOLD {
            counters.retain(|_, (_, expires_at)| *expires_at > now);
        }
        let entry = counters.entry(key.to_string()).or_insert((0, now + ttl));
        if entry.1 <= now {
            *entry = (0, now + ttl);
        }
        entry.0 += 1;
        Ok(entry.0)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
