//! Pipeline configuration.
//!
//! Every limit is fixed at construction time. `PipelineConfig::from_env()`
//! starts from the defaults and applies `FAULTLINE_*` overrides; values that
//! do not parse are ignored.

use crate::cache::CacheConfig;
use crate::queue::QueueConfig;
use crate::resilience::{CircuitBreakerConfig, RateLimiterConfig};
use crate::transport::{HttpBackendConfig, PoolConfig, RetryPolicy};
use crate::{Error, ErrorContext, Result};
use std::str::FromStr;
use std::time::Duration;

/// Intervals of the background timers not owned by a component config.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub pressure_poll_interval: Duration,
    pub rate_purge_interval: Duration,
    pub cache_purge_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            pressure_poll_interval: Duration::from_secs(1),
            rate_purge_interval: Duration::from_secs(30),
            cache_purge_interval: Duration::from_secs(60),
        }
    }
}

impl MaintenanceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pressure_poll_interval(mut self, interval: Duration) -> Self {
        self.pressure_poll_interval = interval;
        self
    }

    pub fn with_rate_purge_interval(mut self, interval: Duration) -> Self {
        self.rate_purge_interval = interval;
        self
    }

    pub fn with_cache_purge_interval(mut self, interval: Duration) -> Self {
        self.cache_purge_interval = interval;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Analysis provider URL. Without it a backend must be supplied to the builder.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Hard limit on one outbound attempt.
    pub attempt_timeout: Duration,
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimiterConfig,
    pub retry: RetryPolicy,
    pub pool: PoolConfig,
    pub maintenance: MaintenanceConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            attempt_timeout: Duration::from_secs(10),
            cache: CacheConfig::default(),
            queue: QueueConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimiterConfig::default(),
            retry: RetryPolicy::default(),
            pool: PoolConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by environment variables:
    ///
    /// - `FAULTLINE_ENDPOINT`, `FAULTLINE_API_KEY`
    /// - `FAULTLINE_WORKERS`, `FAULTLINE_QUEUE_CAPACITY`, `FAULTLINE_MAX_ATTEMPTS`,
    ///   `FAULTLINE_HTTP_RETRIES`, `FAULTLINE_ATTEMPT_TIMEOUT_MS`
    /// - `FAULTLINE_CACHE_CAPACITY`, `FAULTLINE_CACHE_TTL_SECS`
    /// - `FAULTLINE_BREAKER_FAILURE_THRESHOLD`, `FAULTLINE_BREAKER_COOLDOWN_MS`,
    ///   `FAULTLINE_BREAKER_HEADROOM_BONUS`
    /// - `FAULTLINE_RATE_LIMIT`, `FAULTLINE_RATE_WINDOW_MS`, `FAULTLINE_RATE_STORE_TIMEOUT_MS`
    /// - `FAULTLINE_POOL_FLOOR`, `FAULTLINE_POOL_CEILING`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(endpoint) = env_string("FAULTLINE_ENDPOINT") {
            cfg.endpoint = Some(endpoint);
        }
        if let Some(key) = env_string("FAULTLINE_API_KEY") {
            cfg.api_key = Some(key);
        }
        if let Some(n) = env_parse::<usize>("FAULTLINE_WORKERS") {
            cfg.queue.worker_concurrency = n;
        }
        if let Some(n) = env_parse::<usize>("FAULTLINE_QUEUE_CAPACITY") {
            cfg.queue.capacity_ceiling = n;
        }
        if let Some(n) = env_parse::<u32>("FAULTLINE_MAX_ATTEMPTS") {
            cfg.queue.max_attempts = n;
        }
        if let Some(n) = env_parse::<u32>("FAULTLINE_HTTP_RETRIES") {
            cfg.queue.http_retries = n;
        }
        if let Some(ms) = env_parse::<u64>("FAULTLINE_ATTEMPT_TIMEOUT_MS") {
            cfg.attempt_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<usize>("FAULTLINE_CACHE_CAPACITY") {
            cfg.cache.capacity_ceiling = n;
        }
        if let Some(secs) = env_parse::<u64>("FAULTLINE_CACHE_TTL_SECS") {
            cfg.cache.base_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<u32>("FAULTLINE_BREAKER_FAILURE_THRESHOLD") {
            cfg.breaker.failure_threshold = n;
        }
        if let Some(ms) = env_parse::<u64>("FAULTLINE_BREAKER_COOLDOWN_MS") {
            cfg.breaker.cooldown = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<u32>("FAULTLINE_BREAKER_HEADROOM_BONUS") {
            cfg.breaker.headroom_bonus = n;
        }
        if let Some(n) = env_parse::<u64>("FAULTLINE_RATE_LIMIT") {
            cfg.rate_limit.limit = n;
        }
        if let Some(ms) = env_parse::<u64>("FAULTLINE_RATE_WINDOW_MS") {
            cfg.rate_limit.window = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("FAULTLINE_RATE_STORE_TIMEOUT_MS") {
            cfg.rate_limit.store_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_parse::<usize>("FAULTLINE_POOL_FLOOR") {
            cfg.pool.floor = n;
        }
        if let Some(n) = env_parse::<usize>("FAULTLINE_POOL_CEILING") {
            cfg.pool.ceiling = n;
        }
        cfg
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimiterConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_maintenance(mut self, maintenance: MaintenanceConfig) -> Self {
        self.maintenance = maintenance;
        self
    }

    /// HTTP backend settings derived from this config, if an endpoint is set.
    pub fn http_backend_config(&self) -> Option<HttpBackendConfig> {
        let endpoint = self.endpoint.as_ref()?;
        let mut http = HttpBackendConfig::new(endpoint.clone())
            .with_timeout(self.attempt_timeout)
            .with_pool_max_idle_per_host(self.pool.ceiling.max(1));
        if let Some(key) = &self.api_key {
            http = http.with_api_key(key.clone());
        }
        Some(http)
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &str, message: &str, details: String) -> Error {
            Error::configuration_with_context(
                message,
                ErrorContext::new()
                    .with_field_path(field)
                    .with_details(details)
                    .with_source("config_validator"),
            )
        }

        if self.queue.worker_concurrency == 0 {
            return Err(invalid(
                "queue.worker_concurrency",
                "worker concurrency must be at least 1",
                "got 0".into(),
            ));
        }
        if self.queue.capacity_ceiling == 0 {
            return Err(invalid(
                "queue.capacity_ceiling",
                "queue capacity must be at least 1",
                "got 0".into(),
            ));
        }
        if self.queue.max_attempts == 0 {
            return Err(invalid(
                "queue.max_attempts",
                "at least one attempt per job is required",
                "got 0".into(),
            ));
        }
        if self.cache.capacity_ceiling == 0 {
            return Err(invalid(
                "cache.capacity_ceiling",
                "cache capacity must be at least 1",
                "got 0".into(),
            ));
        }
        if self.cache.base_ttl.is_zero() {
            return Err(invalid(
                "cache.base_ttl",
                "cache TTL must be positive",
                "got 0s".into(),
            ));
        }
        if self.attempt_timeout.is_zero() {
            return Err(invalid(
                "attempt_timeout",
                "per-attempt timeout must be positive",
                "got 0ms".into(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(invalid(
                "breaker.failure_threshold",
                "breaker threshold must be at least 1",
                "got 0".into(),
            ));
        }
        if self.rate_limit.window.is_zero() {
            return Err(invalid(
                "rate_limit.window",
                "rate window must be positive",
                "got 0ms".into(),
            ));
        }
        if self.rate_limit.store_timeout.is_zero() {
            return Err(invalid(
                "rate_limit.store_timeout",
                "shared store timeout must be positive",
                "got 0ms".into(),
            ));
        }
        if self.pool.ceiling == 0 || self.pool.floor > self.pool.ceiling {
            return Err(invalid(
                "pool",
                "pool bounds must satisfy 1 <= ceiling and floor <= ceiling",
                format!("floor={}, ceiling={}", self.pool.floor, self.pool.ceiling),
            ));
        }
        let m = &self.maintenance;
        if m.pressure_poll_interval.is_zero()
            || m.rate_purge_interval.is_zero()
            || m.cache_purge_interval.is_zero()
            || self.pool.sample_interval.is_zero()
            || self.pool.resize_interval.is_zero()
        {
            return Err(invalid(
                "maintenance",
                "timer intervals must be positive",
                format!("{:?}", m),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
        assert!(PipelineConfig::default().http_backend_config().is_none());
    }

    #[test]
    fn zero_workers_rejected_with_field_path() {
        let cfg = PipelineConfig::new().with_queue(QueueConfig::new().with_workers(0));
        let err = cfg.validate().unwrap_err();
        let ctx = err.context().unwrap();
        assert_eq!(ctx.field_path.as_deref(), Some("queue.worker_concurrency"));
        assert_eq!(ctx.source.as_deref(), Some("config_validator"));
    }

    #[test]
    fn inverted_pool_bounds_rejected() {
        let cfg = PipelineConfig::new().with_pool(PoolConfig::new().with_bounds(8, 4));
        let err = cfg.validate().unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("pool")
        );
    }

    #[test]
    fn zero_rate_window_rejected() {
        let cfg = PipelineConfig::new()
            .with_rate_limit(RateLimiterConfig::new().with_window(Duration::ZERO));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_store_timeout_rejected_with_field_path() {
        let cfg = PipelineConfig::new()
            .with_rate_limit(RateLimiterConfig::new().with_store_timeout(Duration::ZERO));
        let err = cfg.validate().unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("rate_limit.store_timeout")
        );
    }

    #[test]
    fn http_config_uses_pool_ceiling() {
        let cfg = PipelineConfig::new()
            .with_endpoint("http://127.0.0.1:9/analyze")
            .with_api_key("k")
            .with_pool(PoolConfig::new().with_bounds(1, 7));
        let http = cfg.http_backend_config().unwrap();
        assert_eq!(http.pool_max_idle_per_host, 7);
        assert_eq!(http.api_key.as_deref(), Some("k"));
        assert_eq!(http.timeout, Duration::from_secs(10));
    }

    #[test]
    fn env_overrides_apply_and_garbage_is_ignored() {
        std::env::set_var("FAULTLINE_WORKERS", "9");
        std::env::set_var("FAULTLINE_RATE_WINDOW_MS", "250");
        std::env::set_var("FAULTLINE_CACHE_CAPACITY", "not-a-number");
        let cfg = PipelineConfig::from_env();
        std::env::remove_var("FAULTLINE_WORKERS");
        std::env::remove_var("FAULTLINE_RATE_WINDOW_MS");
        std::env::remove_var("FAULTLINE_CACHE_CAPACITY");

        assert_eq!(cfg.queue.worker_concurrency, 9);
        assert_eq!(cfg.rate_limit.window, Duration::from_millis(250));
        assert_eq!(cfg.cache.capacity_ceiling, CacheConfig::default().capacity_ceiling);
    }
}
