use super::{AnalysisBackend, AnalysisRequest, ProviderResponse, TransportError};
use crate::error_code::FailureClass;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::env;
use std::time::{Duration, Instant};
use tracing::info;

/// Header carrying our correlation id; providers may ignore it.
pub const REQUEST_ID_HEADER: &str = "x-faultline-request-id";

#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Full URL the analysis request is POSTed to.
    pub endpoint: String,
    /// Bearer token; falls back to `FAULTLINE_API_KEY`.
    pub api_key: Option<String>,
    /// Per-attempt timeout enforced by reqwest.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    /// Breaker target name; defaults to the endpoint host.
    pub target_name: Option<String>,
}

impl HttpBackendConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(3),
            pool_max_idle_per_host: 16,
            pool_idle_timeout: Duration::from_secs(90),
            target_name: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pool_max_idle_per_host(mut self, n: usize) -> Self {
        self.pool_max_idle_per_host = n;
        self
    }

    pub fn with_target_name(mut self, name: impl Into<String>) -> Self {
        self.target_name = Some(name.into());
        self
    }
}

/// Analysis backend speaking JSON over HTTP.
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: Option<String>,
    name: String,
}

impl HttpBackend {
    pub fn new(cfg: HttpBackendConfig) -> Result<Self> {
        let endpoint = url::Url::parse(&cfg.endpoint).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid analysis endpoint: {}", e),
                ErrorContext::new()
                    .with_field_path("transport.endpoint")
                    .with_details(cfg.endpoint.clone())
                    .with_source("http_backend"),
            )
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::configuration_with_context(
                "analysis endpoint must be http or https",
                ErrorContext::new()
                    .with_field_path("transport.endpoint")
                    .with_details(endpoint.scheme().to_string())
                    .with_source("http_backend"),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .connect_timeout(cfg.connect_timeout)
            .pool_max_idle_per_host(cfg.pool_max_idle_per_host)
            .pool_idle_timeout(Some(cfg.pool_idle_timeout))
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        let name = cfg
            .target_name
            .clone()
            .or_else(|| endpoint.host_str().map(str::to_string))
            .unwrap_or_else(|| "analysis-provider".to_string());
        let api_key = cfg
            .api_key
            .clone()
            .or_else(|| env::var("FAULTLINE_API_KEY").ok())
            .filter(|k| !k.trim().is_empty());

        Ok(Self {
            client,
            endpoint,
            api_key,
            name,
        })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }

    fn header_first(headers: &HeaderMap, names: &[&str]) -> Option<String> {
        for name in names {
            if let Some(v) = headers.get(*name) {
                if let Ok(s) = v.to_str() {
                    let s = s.trim();
                    if !s.is_empty() {
                        return Some(s.to_string());
                    }
                }
            }
        }
        None
    }

    /// Only the `Retry-After: <seconds>` form is understood.
    fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
        let raw = Self::header_first(headers, &["retry-after"])?;
        let secs: u64 = raw.parse().ok()?;
        Some(secs.saturating_mul(1000))
    }
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    async fn send(&self, request: &AnalysisRequest) -> Result<ProviderResponse> {
        let start = Instant::now();
        let mut req = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .header(REQUEST_ID_HEADER, request.request_id.to_string());
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let err = TransportError::Http(e);
                info!(
                    target_name = %self.name,
                    failure_class = %err.failure_class(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "analysis request failed"
                );
                return Err(Error::Transport(err));
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let retry_after_ms = Self::retry_after_ms(resp.headers());
            let class = FailureClass::from_http_status(status.as_u16());
            let body = resp.text().await.unwrap_or_default();
            info!(
                target_name = %self.name,
                http_status = status.as_u16(),
                failure_class = %class,
                retry_after_ms = retry_after_ms,
                duration_ms = start.elapsed().as_millis() as u64,
                "analysis request failed"
            );
            return Err(Error::Remote {
                status: status.as_u16(),
                class,
                message: body.chars().take(512).collect(),
                retry_after_ms,
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;
        let parsed: ProviderResponse = serde_json::from_slice(&bytes)?;
        Ok(parsed)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
