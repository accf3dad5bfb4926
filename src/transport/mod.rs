//! 传输层模块：分析后端抽象、HTTP 后端、按失败类型退避的重试客户端与自适应连接池。
//!
//! # Transport Module
//!
//! Everything that talks to the analysis provider lives here. The pipeline only
//! sees the narrow [`AnalysisBackend`] trait; [`http::HttpBackend`] is the
//! shipped implementation and tests plug in in-process fakes.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`http`] | reqwest-based backend with failure classification |
//! | [`retry`] | Backoff schedule per failure class |
//! | [`pool`] | Permit gate whose size follows observed concurrency |
//! | [`client`] | Retry loop with per-attempt timeout and pool permits |

pub mod client;
pub mod http;
pub mod pool;
pub mod retry;

pub use client::RetryingClient;
pub use http::{HttpBackend, HttpBackendConfig};
pub use pool::{ConnectionPool, PoolConfig, PoolPermit, PoolSnapshot};
pub use retry::RetryPolicy;

use crate::error_code::FailureClass;
use crate::signature::ErrorSignature;
use crate::types::{Advice, ErrorReport};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("attempt timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            TransportError::Http(e) => {
                if e.is_timeout() {
                    FailureClass::Timeout
                } else if e.is_decode() {
                    FailureClass::Decode
                } else if let Some(status) = e.status() {
                    FailureClass::from_http_status(status.as_u16())
                } else {
                    // connect, request and body errors: the exchange never completed
                    FailureClass::Connection
                }
            }
            TransportError::Timeout { .. } => FailureClass::Timeout,
            TransportError::Other(_) => FailureClass::Connection,
        }
    }
}

/// Body sent to the provider for one signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Stable across attempts of the same job, for provider-side correlation.
    pub request_id: Uuid,
    pub signature_key: String,
    pub kind: String,
    pub normalized_message: String,
    pub origin: String,
    /// The first occurrence as reported, with full message and details.
    pub report: ErrorReport,
}

impl AnalysisRequest {
    pub fn new(signature: &ErrorSignature, report: ErrorReport) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            signature_key: signature.key(),
            kind: signature.kind().to_string(),
            normalized_message: signature.normalized_message().to_string(),
            origin: signature.origin().to_string(),
            report,
        }
    }
}

/// Provider answer. `ttl_secs`, when present, shortens how long the advice is cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub advice: Advice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

impl ProviderResponse {
    pub fn text(advice: impl Into<String>) -> Self {
        Self {
            advice: Advice::Text(advice.into()),
            ttl_secs: None,
        }
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }
}

/// The single seam between the pipeline and whatever produces advice.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// One attempt. Retries, timeouts and pooling are handled by the caller.
    async fn send(&self, request: &AnalysisRequest) -> Result<ProviderResponse>;

    /// Target name; one circuit breaker is kept per name.
    fn name(&self) -> &str;
}
