//! 错误签名模块：从错误的类型、消息和来源推导稳定的去重键。
//!
//! # Signature Engine
//!
//! Derives a stable deduplication key from an error's kind, normalized message
//! and originating location. Two errors that differ only in volatile details
//! (timestamps, object addresses, request ids) collapse to one signature.
//!
//! Signature computation is pure and infallible: missing fields are replaced
//! with placeholders, because a degraded signature still deduplicates.
//!
//! ## Example
//!
//! ```rust
//! use faultline::signature::ErrorSignature;
//! use faultline::types::ErrorReport;
//!
//! let a = ErrorReport::new("PoolTimeout", "no connection after 5000ms at 2024-01-01T00:00:00Z")
//!     .with_origin("src/db.rs:12:5");
//! let b = ErrorReport::new("PoolTimeout", "no connection after 5000ms at 2024-06-30T23:59:59Z")
//!     .with_origin("src/db.rs:12:9");
//! assert_eq!(ErrorSignature::from_report(&a), ErrorSignature::from_report(&b));
//! ```

mod normalize;

pub use normalize::{normalize_message, normalize_origin, MAX_MESSAGE_CHARS};

use crate::types::ErrorReport;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub const UNKNOWN_KIND: &str = "<unknown-kind>";
pub const NO_MESSAGE: &str = "<no-message>";
pub const UNKNOWN_ORIGIN: &str = "<unknown-origin>";

/// Kinds are cut to this many characters; type paths can get long.
const MAX_KIND_CHARS: usize = 128;

/// Deduplication key for an error. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ErrorSignature {
    kind: String,
    normalized_message: String,
    origin: String,
}

impl ErrorSignature {
    /// Compute the signature of a report. Never fails.
    pub fn from_report(report: &ErrorReport) -> Self {
        Self::from_parts(
            report.kind.as_deref(),
            report.message.as_deref(),
            report.origin.as_deref(),
        )
    }

    pub fn from_parts(kind: Option<&str>, message: Option<&str>, origin: Option<&str>) -> Self {
        let kind = kind
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| k.chars().take(MAX_KIND_CHARS).collect())
            .unwrap_or_else(|| UNKNOWN_KIND.to_string());
        let normalized_message = message
            .map(normalize_message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| NO_MESSAGE.to_string());
        let origin = origin
            .map(normalize_origin)
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string());
        Self {
            kind,
            normalized_message,
            origin,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn normalized_message(&self) -> &str {
        &self.normalized_message
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// True if any field had to be substituted with a placeholder.
    pub fn is_degraded(&self) -> bool {
        self.kind == UNKNOWN_KIND
            || self.normalized_message == NO_MESSAGE
            || self.origin == UNKNOWN_ORIGIN
    }

    /// Lowercase hex SHA-256 over the three fields; stable across processes.
    pub fn key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.normalized_message.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.origin.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

impl fmt::Display for ErrorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}: {}", self.kind, self.origin, self.normalized_message)
    }
}

impl From<&ErrorReport> for ErrorSignature {
    fn from(report: &ErrorReport) -> Self {
        Self::from_report(report)
    }
}
