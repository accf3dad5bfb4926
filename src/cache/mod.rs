//! 自适应缓存模块：签名到分析结果的 LRU 缓存，容量随内存压力调整。
//!
//! # Adaptive Cache Module
//!
//! Stores the latest [`AnalysisResult`](crate::types::AnalysisResult) per
//! [`ErrorSignature`](crate::signature::ErrorSignature) so repeated
//! occurrences of the same fault are answered without touching the provider.
//!
//! ## Behavior
//!
//! - `get`/`put` are O(1) and guarded by one short-lived mutex
//! - a full cache silently drops its least-recently-used entry
//! - a higher memory-pressure level shrinks the capacity *immediately* (LRU
//!   order) and shortens the TTL applied to new entries
//!
//! ## Example
//!
//! ```rust
//! use faultline::cache::{AdaptiveCache, CacheConfig};
//! use faultline::pressure::MemoryPressure;
//! use std::time::Duration;
//!
//! let cache = AdaptiveCache::new(
//!     CacheConfig::new()
//!         .with_capacity(1000)
//!         .with_ttl(Duration::from_secs(3600)),
//! );
//! cache.apply_pressure(MemoryPressure::Critical);
//! assert_eq!(cache.current_capacity(), 250);
//! ```

mod adaptive;
mod stats;

pub use adaptive::{AdaptiveCache, CacheConfig};
pub use stats::CacheStats;
