//! LRU signature cache whose capacity and TTL follow memory pressure.

use super::stats::{AtomicStats, CacheStats};
use crate::pressure::{MemoryPressure, PressureScaling};
use crate::signature::ErrorSignature;
use crate::types::AnalysisResult;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Capacity under normal pressure.
    pub capacity_ceiling: usize,
    /// TTL applied to new entries under normal pressure.
    pub base_ttl: Duration,
    pub scaling: PressureScaling,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_ceiling: 1024,
            base_ttl: Duration::from_secs(3600),
            scaling: PressureScaling::default(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity_ceiling = capacity;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.base_ttl = ttl;
        self
    }

    pub fn with_scaling(mut self, scaling: PressureScaling) -> Self {
        self.scaling = scaling;
        self
    }
}

struct Entry {
    result: Arc<AnalysisResult>,
    inserted_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.result.ttl
    }
}

struct Inner {
    entries: LruCache<ErrorSignature, Entry>,
    capacity: usize,
    ttl: Duration,
    level: MemoryPressure,
}

/// Signature -> analysis cache.
///
/// `len() <= current_capacity()` holds after every operation. Lowering the
/// capacity evicts least-recently-used entries right away.
pub struct AdaptiveCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
    stats: AtomicStats,
}

fn non_zero(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

impl AdaptiveCache {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = config.capacity_ceiling.max(1);
        let inner = Inner {
            entries: LruCache::new(non_zero(capacity)),
            capacity,
            ttl: config.base_ttl,
            level: MemoryPressure::Normal,
        };
        Self {
            config,
            inner: Mutex::new(inner),
            stats: AtomicStats::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a signature, refreshing its recency. Expired entries count as misses.
    pub fn get(&self, signature: &ErrorSignature) -> Option<Arc<AnalysisResult>> {
        let now = Instant::now();
        let mut inner = self.lock();
        let expired = match inner.entries.get(signature) {
            Some(entry) => entry.is_expired(now),
            None => {
                AtomicStats::bump(&self.stats.misses, 1);
                return None;
            }
        };
        if expired {
            inner.entries.pop(signature);
            AtomicStats::bump(&self.stats.expirations, 1);
            AtomicStats::bump(&self.stats.misses, 1);
            return None;
        }
        AtomicStats::bump(&self.stats.hits, 1);
        inner.entries.peek(signature).map(|e| Arc::clone(&e.result))
    }

    /// Read-only lookup: does not touch recency or counters.
    pub fn peek(&self, signature: &ErrorSignature) -> Option<Arc<AnalysisResult>> {
        let now = Instant::now();
        let inner = self.lock();
        inner
            .entries
            .peek(signature)
            .filter(|e| !e.is_expired(now))
            .map(|e| Arc::clone(&e.result))
    }

    /// Insert or overwrite. The entry's TTL is capped at the cache's current TTL.
    pub fn put(&self, signature: ErrorSignature, mut result: AnalysisResult) {
        let mut inner = self.lock();
        if result.ttl.is_zero() || result.ttl > inner.ttl {
            result.ttl = inner.ttl;
        }
        let entry = Entry {
            result: Arc::new(result),
            inserted_at: Instant::now(),
        };
        AtomicStats::bump(&self.stats.inserts, 1);
        if let Some((evicted, _)) = inner.entries.push(signature.clone(), entry) {
            if evicted != signature {
                AtomicStats::bump(&self.stats.evictions, 1);
            }
        }
    }

    pub fn remove(&self, signature: &ErrorSignature) -> bool {
        self.lock().entries.pop(signature).is_some()
    }

    /// Recompute capacity and TTL for `level`. Returns how many entries were evicted.
    pub fn apply_pressure(&self, level: MemoryPressure) -> usize {
        let capacity = self
            .config
            .scaling
            .scale_count(self.config.capacity_ceiling.max(1), level);
        let ttl = self.config.scaling.scale_duration(self.config.base_ttl, level);

        let mut inner = self.lock();
        let evicted = inner.entries.len().saturating_sub(capacity);
        inner.entries.resize(non_zero(capacity));
        inner.capacity = capacity;
        inner.ttl = ttl;
        let previous = std::mem::replace(&mut inner.level, level);
        drop(inner);

        if evicted > 0 {
            AtomicStats::bump(&self.stats.evictions, evicted as u64);
        }
        if previous != level {
            debug!(
                level = %level,
                capacity,
                ttl_ms = ttl.as_millis() as u64,
                evicted,
                "cache capacity recomputed"
            );
        }
        evicted
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let expired: Vec<ErrorSignature> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.entries.pop(key);
        }
        drop(inner);
        if !expired.is_empty() {
            AtomicStats::bump(&self.stats.expirations, expired.len() as u64);
        }
        expired.len()
    }

    pub fn current_capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn current_ttl(&self) -> Duration {
        self.lock().ttl
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, signature: &ErrorSignature) -> bool {
        self.lock().entries.contains(signature)
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let (len, capacity) = {
            let inner = self.lock();
            (inner.entries.len(), inner.capacity)
        };
        self.stats.to_stats(len, capacity)
    }
}
