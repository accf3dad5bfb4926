use super::pool::ConnectionPool;
use super::retry::RetryPolicy;
use super::{AnalysisBackend, AnalysisRequest, ProviderResponse, TransportError};
use crate::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Wraps a backend with per-attempt timeouts, pool permits and class-aware retries.
pub struct RetryingClient {
    backend: Arc<dyn AnalysisBackend>,
    policy: RetryPolicy,
    pool: Arc<ConnectionPool>,
    attempt_timeout: Duration,
    attempts: AtomicU64,
    retries: AtomicU64,
}

impl RetryingClient {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        policy: RetryPolicy,
        pool: Arc<ConnectionPool>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            policy,
            pool,
            attempt_timeout,
            attempts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Total attempts sent to the backend.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Send with up to `max_retries` retries (so at most `max_retries + 1` attempts).
    pub async fn send(
        &self,
        request: &AnalysisRequest,
        max_retries: u32,
    ) -> Result<ProviderResponse> {
        let mut attempt: u32 = 0;
        loop {
            let outcome = self.attempt_once(request).await;
            let err = match outcome {
                Ok(resp) => return Ok(resp),
                Err(err) => err,
            };
            if attempt >= max_retries {
                return Err(err);
            }
            let Some(class) = err.failure_class() else {
                return Err(err);
            };
            let hint = err.retry_after_ms().map(Duration::from_millis);
            let Some(delay) = self.policy.delay_for(class, attempt, hint) else {
                return Err(err);
            };
            debug!(
                target_name = %self.backend.name(),
                attempt,
                failure_class = %class,
                delay_ms = delay.as_millis() as u64,
                "retrying analysis request"
            );
            self.retries.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt_once(&self, request: &AnalysisRequest) -> Result<ProviderResponse> {
        let _permit = self.pool.acquire().await;
        self.attempts.fetch_add(1, Ordering::Relaxed);
        match tokio::time::timeout(self.attempt_timeout, self.backend.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Transport(TransportError::Timeout {
                after_ms: self.attempt_timeout.as_millis() as u64,
            })),
        }
    }
}
