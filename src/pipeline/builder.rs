use super::maintenance::{Maintenance, MaintenanceParts};
use super::ErrorPipeline;
use crate::cache::AdaptiveCache;
use crate::config::PipelineConfig;
use crate::pressure::{PressureMonitor, PressureSource};
use crate::queue::{AnalysisQueue, WorkerContext};
use crate::resilience::{BreakerRegistry, RateLimiter, SharedCounterStore};
use crate::transport::{AnalysisBackend, ConnectionPool, HttpBackend, RetryingClient};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

/// Builder for [`ErrorPipeline`].
///
/// Without an explicit backend, an HTTP backend is built from the configured
/// endpoint.
pub struct PipelineBuilder {
    config: PipelineConfig,
    backend: Option<Arc<dyn AnalysisBackend>>,
    pressure_source: Option<Arc<dyn PressureSource>>,
    shared_store: Option<Arc<dyn SharedCounterStore>>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            backend: None,
            pressure_source: None,
            shared_store: None,
        }
    }

    /// Start from `PipelineConfig::from_env()`.
    pub fn from_env() -> Self {
        Self::new().with_config(PipelineConfig::from_env())
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn AnalysisBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Host probe for memory pressure, polled on the maintenance timer.
    pub fn with_pressure_source(mut self, source: Arc<dyn PressureSource>) -> Self {
        self.pressure_source = Some(source);
        self
    }

    /// Enforce rate limits across instances through a shared store.
    pub fn with_shared_store(mut self, store: Arc<dyn SharedCounterStore>) -> Self {
        self.shared_store = Some(store);
        self
    }

    /// Validate the config, then spawn workers and maintenance timers on the
    /// current Tokio runtime.
    pub fn build(self) -> Result<ErrorPipeline> {
        let runtime = Handle::try_current().map_err(|e| {
            Error::configuration_with_context(
                "the error pipeline must be built inside a Tokio runtime",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("pipeline_builder"),
            )
        })?;
        let config = self.config;
        config.validate()?;

        let backend: Arc<dyn AnalysisBackend> = match self.backend {
            Some(backend) => backend,
            None => {
                let http = config.http_backend_config().ok_or_else(|| {
                    Error::configuration_with_context(
                        "no analysis backend: set an endpoint or supply a backend",
                        ErrorContext::new()
                            .with_field_path("endpoint")
                            .with_source("pipeline_builder"),
                    )
                })?;
                Arc::new(HttpBackend::new(http)?)
            }
        };

        let monitor = Arc::new(PressureMonitor::new(self.pressure_source));
        let cache = Arc::new(AdaptiveCache::new(config.cache.clone()));
        let queue = Arc::new(AnalysisQueue::new(config.queue.clone()));
        let level = monitor.level();
        cache.apply_pressure(level);
        queue.apply_pressure(level);

        let breakers = Arc::new(BreakerRegistry::new(
            config.breaker.clone(),
            monitor.handle(),
        ));
        let limiter = Arc::new(match self.shared_store {
            Some(store) => RateLimiter::distributed(config.rate_limit.clone(), store),
            None => RateLimiter::new(config.rate_limit.clone()),
        });
        let pool = Arc::new(ConnectionPool::new(config.pool.clone()));
        let client = Arc::new(RetryingClient::new(
            backend,
            config.retry.clone(),
            Arc::clone(&pool),
            config.attempt_timeout,
        ));

        queue.start(
            WorkerContext {
                cache: Arc::clone(&cache),
                breakers: Arc::clone(&breakers),
                limiter: Arc::clone(&limiter),
                client: Arc::clone(&client),
            },
            &runtime,
        );
        let maintenance = Maintenance::spawn(
            &runtime,
            MaintenanceParts {
                monitor: Arc::clone(&monitor),
                cache: Arc::clone(&cache),
                queue: Arc::clone(&queue),
                pool: Arc::clone(&pool),
                limiter: Arc::clone(&limiter),
            },
            &config.maintenance,
        );

        info!(
            backend = %client.backend_name(),
            workers = config.queue.worker_concurrency,
            queue_capacity = queue.capacity(),
            cache_capacity = cache.current_capacity(),
            pressure = %level,
            "error pipeline started"
        );

        Ok(ErrorPipeline {
            cache,
            queue,
            breakers,
            limiter,
            client,
            pool,
            monitor,
            maintenance,
        })
    }
}
