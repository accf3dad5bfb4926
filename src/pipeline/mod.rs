//! 管道编排模块：错误上报入口，负责签名、缓存命中与异步分析排队。
//!
//! # Pipeline Orchestrator
//!
//! [`ErrorPipeline::report_error`] is the only call on the host's request
//! path. It is synchronous and never fails:
//!
//! 1. compute the [`ErrorSignature`]
//! 2. cache hit: return the advice
//! 3. cache miss: hand the report to the analysis queue and return
//!    [`Reported::Pending`]
//!
//! "Not analyzed yet", "provider down" and "rate limited" all look like
//! `Pending` to the caller; [`ErrorPipeline::signals`] tells them apart.
//!
//! ```rust,no_run
//! use faultline::pipeline::PipelineBuilder;
//! use faultline::config::PipelineConfig;
//! use faultline::types::ErrorReport;
//!
//! # async fn run() -> faultline::Result<()> {
//! let pipeline = PipelineBuilder::new()
//!     .with_config(PipelineConfig::new().with_endpoint("https://advisor.internal/v1/analyze"))
//!     .build()?;
//!
//! let outcome = pipeline.report_error(&ErrorReport::new("PoolTimeout", "no connection").here());
//! if let Some(advice) = outcome.advice() {
//!     println!("{}", advice.advice.as_text());
//! }
//! pipeline.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod builder;
mod maintenance;
mod signals;

pub use builder::PipelineBuilder;
pub use signals::PipelineSignals;

use crate::cache::{AdaptiveCache, CacheStats};
use crate::pressure::{MemoryPressure, PressureMonitor};
use crate::queue::{AnalysisQueue, EnqueueOutcome, QueueStats};
use crate::resilience::{BreakerRegistry, CircuitSnapshot, CircuitState, RateLimiter};
use crate::signature::ErrorSignature;
use crate::transport::{ConnectionPool, PoolSnapshot, RetryingClient};
use crate::types::{AnalysisResult, ErrorReport, Reported};
use maintenance::Maintenance;
use std::sync::Arc;
use tracing::{info, trace};

pub struct ErrorPipeline {
    cache: Arc<AdaptiveCache>,
    queue: Arc<AnalysisQueue>,
    breakers: Arc<BreakerRegistry>,
    limiter: Arc<RateLimiter>,
    client: Arc<RetryingClient>,
    pool: Arc<ConnectionPool>,
    monitor: Arc<PressureMonitor>,
    maintenance: Maintenance,
}

impl ErrorPipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Report an intercepted error. Never blocks on analysis I/O, never fails.
    pub fn report_error(&self, report: &ErrorReport) -> Reported {
        let signature = ErrorSignature::from_report(report);
        if let Some(result) = self.cache.get(&signature) {
            return Reported::Advice(result);
        }
        let signature_key = signature.key();
        if let EnqueueOutcome::Rejected(reason) = self.queue.enqueue_report(&signature, report) {
            trace!(signature = %signature_key, ?reason, "analysis not queued");
        }
        Reported::Pending { signature_key }
    }

    /// Report any error value; the caller's location becomes the origin.
    #[track_caller]
    pub fn report(&self, err: &(dyn std::error::Error + 'static)) -> Reported {
        self.report_error(&ErrorReport::from_dyn_error(err))
    }

    /// Cached advice for a signature, without touching recency.
    pub fn get_analysis(&self, signature: &ErrorSignature) -> Option<Arc<AnalysisResult>> {
        self.cache.peek(signature)
    }

    /// Same as [`get_analysis`](Self::get_analysis), keyed by the original report.
    pub fn get_analysis_for(&self, report: &ErrorReport) -> Option<Arc<AnalysisResult>> {
        self.get_analysis(&ErrorSignature::from_report(report))
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Breaker state for a target; `None` before the first call to it.
    pub fn breaker_state(&self, target: &str) -> Option<CircuitState> {
        self.breakers.state(target)
    }

    pub fn breaker_snapshot(&self, target: &str) -> Option<CircuitSnapshot> {
        self.breakers.get(target).map(|b| b.snapshot())
    }

    /// Name of the analysis backend, which is also its breaker target.
    pub fn backend_name(&self) -> &str {
        self.client.backend_name()
    }

    pub fn pool_snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }

    pub fn pressure(&self) -> MemoryPressure {
        self.monitor.level()
    }

    /// Push a memory-pressure level. Cache and queue capacities follow before
    /// this returns.
    pub fn set_pressure(&self, level: MemoryPressure) {
        self.monitor.set(level);
        self.cache.apply_pressure(level);
        self.queue.apply_pressure(level);
    }

    pub fn signals(&self) -> PipelineSignals {
        PipelineSignals {
            pressure: self.monitor.level(),
            queue: self.queue.stats(),
            cache: self.cache.stats(),
            breakers: self.breakers.snapshots(),
            pool: self.pool.snapshot(),
            rate_limiter: self.limiter.snapshot(),
        }
    }

    /// Stop timers and workers and wait for them. Queued analyses are discarded;
    /// cached advice stays readable.
    pub async fn shutdown(&self) {
        self.maintenance.stop().await;
        self.queue.shutdown().await;
        info!("error pipeline stopped");
    }
}

impl Drop for ErrorPipeline {
    fn drop(&mut self) {
        self.maintenance.cancel();
        self.queue.close();
    }
}
