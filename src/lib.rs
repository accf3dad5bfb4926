//! # faultline
//!
//! 进程内错误分析管道：错误签名去重、自适应缓存与面向分析服务的弹性调用层。
//!
//! In-process error analysis pipeline. A host reports intercepted errors; the
//! pipeline collapses them into stable signatures, answers repeats from an
//! adaptive cache, and sends new signatures to a remote analysis provider in
//! the background.
//!
//! ## Overview
//!
//! Reporting an error never blocks on the provider and never fails. Behind the
//! report call, a bounded queue feeds a small worker pool; every outbound call
//! goes through a per-target circuit breaker, a sliding-window rate limiter and
//! a retrying HTTP client with a demand-sized connection budget. Cache and
//! queue capacity follow the host's memory pressure.
//!
//! ## Key Features
//!
//! - **Signatures**: volatile message parts (numbers, addresses, ids) are normalized away
//! - **Adaptive cache**: LRU + TTL whose size and lifetime shrink under pressure
//! - **Analysis queue**: bounded, deduplicated per signature, shed under pressure
//! - **Resilience**: circuit breaker with exponential cooldown, rate limiting that
//!   can be shared across instances
//! - **Transport**: retry per failure class, `Retry-After` aware, pool sized from demand
//! - **Signals**: [`PipelineSignals`] exposes every component's state as plain facts
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use faultline::{ErrorPipeline, ErrorReport, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> faultline::Result<()> {
//!     faultline::telemetry::init_tracing("faultline=info");
//!
//!     let pipeline = ErrorPipeline::builder()
//!         .with_config(PipelineConfig::from_env().with_endpoint("https://advisor.internal/v1/analyze"))
//!         .build()?;
//!
//!     let report = ErrorReport::new("PoolTimeout", "timed out after 3000ms waiting for conn 17").here();
//!     match pipeline.report_error(&report).advice() {
//!         Some(result) => println!("advice: {}", result.advice.as_text()),
//!         None => println!("analysis pending"),
//!     }
//!
//!     pipeline.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`pipeline`] | Orchestrator: report entry point, builder, maintenance timers |
//! | [`signature`] | Error signatures and message normalization |
//! | [`cache`] | Pressure-aware LRU + TTL advice cache |
//! | [`queue`] | Bounded analysis queue and its workers |
//! | [`resilience`] | Circuit breakers and rate limiting |
//! | [`transport`] | Analysis backends, retry policy, connection budget |
//! | [`pressure`] | Memory-pressure levels and scaling |
//! | [`config`] | Pipeline configuration and environment overrides |
//! | [`types`] | Error reports and analysis results |
//! | [`telemetry`] | Tracing subscriber setup |

pub mod cache;
pub mod config;
pub mod error;
pub mod error_code;
pub mod pipeline;
pub mod pressure;
pub mod queue;
pub mod resilience;
pub mod signature;
pub mod telemetry;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use config::PipelineConfig;
pub use error::{Error, ErrorContext};
pub use error_code::FailureClass;
pub use pipeline::{ErrorPipeline, PipelineBuilder, PipelineSignals};
pub use pressure::MemoryPressure;
pub use resilience::CircuitState;
pub use signature::ErrorSignature;
pub use types::{Advice, AnalysisResult, ErrorReport, Reported};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
