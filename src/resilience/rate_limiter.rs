use super::shared_store::{SharedCounterStore, StoreError};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RateLimiterSnapshot {
    pub limit: u64,
    pub window_ms: u64,
    /// Keys currently holding a local window.
    pub tracked_keys: usize,
    pub distributed: bool,
    /// True while the shared store is failing and checks run locally.
    pub degraded: bool,
    pub allowed: u64,
    pub denied: u64,
    pub store_failures: u64,
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Events allowed per key per window.
    pub limit: u64,
    pub window: Duration,
    /// Upper bound on tracked keys; the least recently used key is evicted beyond it.
    pub max_keys: usize,
    /// Prefix for counter keys in the shared store.
    pub key_prefix: String,
    /// How long one shared-store increment may take before the check runs locally.
    pub store_timeout: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            limit: 60,
            window: Duration::from_secs(60),
            max_keys: 10_000,
            key_prefix: "faultline:rate:".to_string(),
            store_timeout: Duration::from_millis(100),
        }
    }
}

impl RateLimiterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// `limit` events per second.
    pub fn per_second(limit: u64) -> Self {
        Self::default()
            .with_limit(limit)
            .with_window(Duration::from_secs(1))
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    previous_count: u64,
    window_start: Instant,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            previous_count: 0,
            window_start: now,
        }
    }

    fn roll(&mut self, now: Instant, window: Duration) {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < window {
            return;
        }
        let windows_passed = elapsed.as_nanos() / window.as_nanos().max(1);
        if windows_passed >= 2 {
            // idle for a full window: nothing carries over
            *self = Self::new(now);
            return;
        }
        self.previous_count = self.count;
        self.count = 0;
        self.window_start += window;
    }

    /// Current count plus the previous window's count weighted by overlap.
    fn estimate(&self, now: Instant, window: Duration) -> f64 {
        let into = now.saturating_duration_since(self.window_start).as_secs_f64();
        let overlap = (1.0 - into / window.as_secs_f64().max(f64::EPSILON)).clamp(0.0, 1.0);
        self.count as f64 + self.previous_count as f64 * overlap
    }
}

/// In-process sliding-window limiter with an LRU-bounded key map.
pub struct SlidingWindowLimiter {
    limit: u64,
    window: Duration,
    windows: Mutex<LruCache<String, Window>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: u64, window: Duration, max_keys: usize) -> Self {
        let cap = NonZeroUsize::new(max_keys).unwrap_or(NonZeroUsize::MIN);
        Self {
            limit,
            window,
            windows: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        if !windows.contains(key) {
            windows.put(key.to_string(), Window::new(now));
        }
        let Some(w) = windows.get_mut(key) else {
            return true;
        };
        w.roll(now, self.window);
        if w.estimate(now, self.window) + 1.0 > self.limit as f64 {
            return false;
        }
        w.count += 1;
        true
    }

    /// Drop windows that saw no traffic for two full windows. Returns how many.
    pub fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let idle_after = self.window.saturating_mul(2);
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let idle: Vec<String> = windows
            .iter()
            .filter(|(_, w)| now.saturating_duration_since(w.window_start) >= idle_after)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &idle {
            windows.pop(key);
        }
        idle.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Rate limiter: local-only, or distributed through a [`SharedCounterStore`].
///
/// In distributed mode every check is one atomic increment in the shared
/// store. When the store fails the limiter fails open to the local window
/// instead of blocking traffic.
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    local: SlidingWindowLimiter,
    store: Option<Arc<dyn SharedCounterStore>>,
    degraded: AtomicBool,
    allowed: AtomicU64,
    denied: AtomicU64,
    store_failures: AtomicU64,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        let local = SlidingWindowLimiter::new(cfg.limit, cfg.window, cfg.max_keys);
        Self {
            cfg,
            local,
            store: None,
            degraded: AtomicBool::new(false),
            allowed: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
        }
    }

    pub fn distributed(cfg: RateLimiterConfig, store: Arc<dyn SharedCounterStore>) -> Self {
        let mut limiter = Self::new(cfg);
        limiter.store = Some(store);
        limiter
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }

    pub async fn allow(&self, key: &str) -> bool {
        let allowed = match &self.store {
            None => self.local.allow(key),
            Some(store) => {
                let ttl = self.cfg.window.saturating_mul(2);
                let shared_key = self.shared_key(key);
                let incr = store.incr_window(&shared_key, ttl);
                let outcome = tokio::time::timeout(self.cfg.store_timeout, incr)
                    .await
                    .unwrap_or(Err(StoreError::Timeout(self.cfg.store_timeout)));
                match outcome {
                    Ok(count) => {
                        if self.degraded.swap(false, Ordering::SeqCst) {
                            info!(store = store.name(), "shared rate store recovered");
                        }
                        count <= self.cfg.limit
                    }
                    Err(e) => {
                        self.store_failures.fetch_add(1, Ordering::Relaxed);
                        if !self.degraded.swap(true, Ordering::SeqCst) {
                            warn!(
                                store = store.name(),
                                error = %e,
                                "shared rate store unreachable, falling back to local limits"
                            );
                        }
                        self.local.allow(key)
                    }
                }
            }
        };
        if allowed {
            self.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied.fetch_add(1, Ordering::Relaxed);
        }
        allowed
    }

    fn shared_key(&self, key: &str) -> String {
        let window_ms = self.cfg.window.as_millis().max(1);
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("{}{}:{}", self.cfg.key_prefix, key, now_ms / window_ms)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn purge_idle(&self) -> usize {
        self.local.purge_idle()
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        RateLimiterSnapshot {
            limit: self.cfg.limit,
            window_ms: self.cfg.window.as_millis() as u64,
            tracked_keys: self.local.tracked_keys(),
            distributed: self.store.is_some(),
            degraded: self.is_degraded(),
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }
}
