//! 类型模块：错误报告与分析结果的核心数据类型。
//!
//! # Types Module
//!
//! Core data types that flow through the pipeline.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ErrorReport`] | Snapshot of an intercepted error, tolerant of missing fields |
//! | [`AnalysisResult`] | Advice produced for one signature, owned by the cache |
//! | [`Advice`] | Free-text or structured advice returned by the provider |
//! | [`Reported`] | What `report_error` hands back to the caller |
//!
//! ## Example
//!
//! ```rust
//! use faultline::types::ErrorReport;
//!
//! let report = ErrorReport::new("ConnectionReset", "peer closed connection at 0x7ffd1234")
//!     .with_origin("src/db/pool.rs:88")
//!     .with_detail("route", "/orders");
//! assert_eq!(report.kind.as_deref(), Some("ConnectionReset"));
//! ```

pub mod analysis;
pub mod report;

pub use analysis::{Advice, AnalysisResult, Reported};
pub use report::ErrorReport;
