//! 弹性模式模块：熔断器与限流器（本地滑动窗口 + 分布式共享计数）。
//!
//! # Resilience Primitives Module
//!
//! Guards the analysis provider and the host process from each other: a
//! failing provider is cut off by a circuit breaker, and request volume per
//! caller key is capped by a rate limiter.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | Closed/Open/HalfOpen breaker with a single probe and adaptive threshold |
//! | [`registry`] | One breaker per downstream target |
//! | [`rate_limiter`] | Sliding-window limiter, local or backed by a shared store |
//! | [`shared_store`] | Atomic counter stores for multi-instance limits |
//!
//! ## Circuit Breaker
//!
//! - **Closed**: calls pass; consecutive failures are counted
//! - **Open**: calls are refused without network I/O until the cooldown elapses
//! - **Half-Open**: exactly one probe call decides whether to close or reopen
//!
//! ```rust
//! use faultline::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new(
//!     CircuitBreakerConfig::new()
//!         .with_failure_threshold(2)
//!         .with_cooldown(Duration::from_millis(100))
//!         .with_headroom_bonus(0),
//! );
//! breaker.record_failure();
//! breaker.record_failure();
//! assert_eq!(breaker.state(), CircuitState::Open);
//! assert!(!breaker.allow());
//! ```
//!
//! ## Rate Limiter
//!
//! ```rust
//! use faultline::resilience::rate_limiter::{RateLimiter, RateLimiterConfig};
//!
//! # tokio_test::block_on(async {
//! let limiter = RateLimiter::new(RateLimiterConfig::per_second(5));
//! for _ in 0..5 {
//!     assert!(limiter.allow("k").await);
//! }
//! assert!(!limiter.allow("k").await);
//! # });
//! ```

pub mod circuit_breaker;
pub mod rate_limiter;
#[cfg(feature = "redis-store")]
pub mod redis_store;
pub mod registry;
pub mod shared_store;

pub use circuit_breaker::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState,
};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterSnapshot, SlidingWindowLimiter};
#[cfg(feature = "redis-store")]
pub use redis_store::RedisCounterStore;
pub use registry::BreakerRegistry;
pub use shared_store::{InMemoryCounterStore, SharedCounterStore, StoreError};
