//! End-to-end flows through `ErrorPipeline`.

use crate::mock_server::{eventually, MockServerFixture};
use async_trait::async_trait;
use faultline::config::{MaintenanceConfig, PipelineConfig};
use faultline::pressure::{ManualPressure, PressureSource};
use faultline::queue::QueueConfig;
use faultline::resilience::{CircuitBreakerConfig, RateLimiterConfig};
use faultline::transport::{AnalysisBackend, AnalysisRequest, ProviderResponse, RetryPolicy};
use faultline::{
    CircuitState, Error, ErrorPipeline, ErrorReport, FailureClass, MemoryPressure, Result,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

/// In-process provider: sleeps, then fails the first `failures` calls with 503.
struct FakeProvider {
    delay: Duration,
    failures: u32,
    calls: AtomicU32,
}

impl FakeProvider {
    fn answering() -> Arc<Self> {
        Self::failing_first(0)
    }

    fn failing_first(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
            failures,
            calls: AtomicU32::new(0),
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            failures: 0,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisBackend for FakeProvider {
    async fn send(&self, request: &AnalysisRequest) -> Result<ProviderResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if n < self.failures {
            return Err(Error::Remote {
                status: 503,
                class: FailureClass::ServerError,
                message: "overloaded".into(),
                retry_after_ms: None,
            });
        }
        Ok(ProviderResponse::text(format!("check {}", request.kind)))
    }

    fn name(&self) -> &str {
        "advisor"
    }
}

fn quiet_retry() -> RetryPolicy {
    RetryPolicy::new()
        .with_base_delay(Duration::from_millis(5))
        .with_connection_delay(Duration::from_millis(5))
        .with_jitter(0.0)
}

fn config() -> PipelineConfig {
    PipelineConfig::new()
        .with_queue(
            QueueConfig::new()
                .with_workers(1)
                .with_max_attempts(1)
                .with_http_retries(0),
        )
        .with_retry(quiet_retry())
}

fn with_backend(config: PipelineConfig, backend: Arc<FakeProvider>) -> ErrorPipeline {
    ErrorPipeline::builder()
        .with_config(config)
        .with_backend(backend)
        .build()
        .expect("pipeline builds")
}

#[tokio::test]
async fn test_cache_miss_then_advice() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture.mock_advice("increase the pool size", 1).await;
    let pipeline = fixture.pipeline(config()).expect("pipeline builds");

    let report = ErrorReport::new("PoolTimeout", "timed out after 3000ms waiting for conn 17");
    let first = pipeline.report_error(&report);
    assert!(first.is_pending());

    assert!(eventually(WAIT, || pipeline.get_analysis_for(&report).is_some()).await);

    let second = pipeline.report_error(&report);
    let advice = second.advice().expect("cached advice");
    assert_eq!(advice.advice.as_text(), "increase the pool size");

    let stats = pipeline.queue_stats();
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(pipeline.cache_stats().hits, 1);
    mock.assert_async().await;
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_volatile_message_parts_share_one_analysis() {
    let provider = FakeProvider::slow(Duration::from_millis(100));
    let pipeline = with_backend(config(), provider.clone());

    for conn in 0..10 {
        let report = ErrorReport::new(
            "LockTimeout",
            format!("lock wait exceeded for txn {} at 0x7ffd{:04x}", 100_000 + conn, conn),
        );
        assert!(pipeline.report_error(&report).is_pending());
    }

    assert!(eventually(WAIT, || pipeline.queue_stats().completed == 1).await);
    let stats = pipeline.queue_stats();
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.deduplicated, 9);
    assert_eq!(provider.calls(), 1);

    let later = ErrorReport::new("LockTimeout", "lock wait exceeded for txn 424242 at 0x1");
    assert!(pipeline.report_error(&later).advice().is_some());
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_report_error_does_not_wait_for_the_provider() {
    let provider = FakeProvider::slow(Duration::from_secs(2));
    let pipeline = with_backend(config(), provider.clone());

    let started = Instant::now();
    for i in 0..50 {
        let report = ErrorReport::new(format!("Kind{}", i), "boom");
        pipeline.report_error(&report);
    }
    assert!(started.elapsed() < Duration::from_millis(500));

    pipeline.shutdown().await;
    assert!(provider.calls() <= 1);
}

#[tokio::test]
async fn test_retryable_failure_is_requeued() {
    let provider = FakeProvider::failing_first(1);
    let cfg = config().with_queue(
        QueueConfig::new()
            .with_workers(1)
            .with_max_attempts(3)
            .with_http_retries(0)
            .with_requeue_delay(Duration::from_millis(20)),
    );
    let pipeline = with_backend(cfg, provider.clone());

    let report = ErrorReport::new("DeadlockDetected", "deadlock on table orders");
    pipeline.report_error(&report);

    assert!(eventually(WAIT, || pipeline.get_analysis_for(&report).is_some()).await);
    let stats = pipeline.queue_stats();
    assert_eq!(stats.failed_attempts, 1);
    assert_eq!(stats.requeued, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(provider.calls(), 2);
    assert_eq!(pipeline.breaker_state("advisor"), Some(CircuitState::Closed));
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_waiting_retries_stay_within_queue_capacity() {
    let provider = FakeProvider::failing_first(u32::MAX);
    let cfg = config()
        .with_queue(
            QueueConfig::new()
                .with_capacity(4)
                .with_workers(2)
                .with_max_attempts(3)
                .with_http_retries(0)
                .with_requeue_delay(Duration::from_secs(30)),
        )
        .with_rate_limit(RateLimiterConfig::per_second(10_000));
    let pipeline = with_backend(cfg, provider.clone());

    for n in 0..200 {
        let report = ErrorReport::new("ReplicaLag", format!("replica lag on shard s{}", n))
            .with_origin(format!("src/shard_{}.rs:10", n));
        pipeline.report_error(&report);
        tokio::task::yield_now().await;
    }
    assert!(eventually(WAIT, || {
        let s = pipeline.queue_stats();
        s.depth == 0 && s.in_flight == 0 && s.delayed > 0
    })
    .await);

    let stats = pipeline.queue_stats();
    assert!(
        stats.pending_signatures <= stats.capacity + 2,
        "pending {} over capacity {}",
        stats.pending_signatures,
        stats.capacity
    );
    assert!(stats.delayed <= stats.capacity);
    assert!(stats.rejected_count > 0);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_single_attempt_exhausts_on_server_error() {
    let fixture = MockServerFixture::new().await;
    let mock = fixture.mock_error(500, None, 1).await;
    let pipeline = fixture.pipeline(config()).expect("pipeline builds");

    let report = ErrorReport::new("DiskFull", "no space left on device");
    pipeline.report_error(&report);

    assert!(eventually(WAIT, || pipeline.queue_stats().dropped_exhausted == 1).await);
    assert!(pipeline.get_analysis_for(&report).is_none());
    assert!(pipeline.report_error(&report).is_pending());
    mock.assert_async().await;
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_provider_never_surfaces_to_caller() {
    let pipeline = ErrorPipeline::builder()
        .with_config(config().with_endpoint("http://127.0.0.1:1/v1/analyze"))
        .build()
        .expect("pipeline builds");
    let target = pipeline.backend_name().to_string();
    assert_eq!(target, "127.0.0.1");

    let report = ErrorReport::new("ConnectionRefused", "connect to 10.0.0.5:5432 failed");
    assert!(pipeline.report_error(&report).is_pending());

    assert!(eventually(WAIT, || pipeline.queue_stats().dropped_exhausted == 1).await);
    let snapshot = pipeline.breaker_snapshot(&target).expect("breaker exists");
    assert_eq!(snapshot.consecutive_failures, 1);
    assert_eq!(snapshot.state, CircuitState::Closed);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_open_breaker_drops_jobs_without_calling_provider() {
    let provider = FakeProvider::failing_first(u32::MAX);
    let cfg = config().with_breaker(
        CircuitBreakerConfig::new()
            .with_failure_threshold(2)
            .with_headroom_bonus(0)
            .with_cooldown(Duration::from_secs(60)),
    );
    let pipeline = with_backend(cfg, provider.clone());

    pipeline.report_error(&ErrorReport::new("A", "first"));
    pipeline.report_error(&ErrorReport::new("B", "second"));
    assert!(
        eventually(WAIT, || pipeline.breaker_state("advisor") == Some(CircuitState::Open)).await
    );
    assert_eq!(provider.calls(), 2);

    pipeline.report_error(&ErrorReport::new("C", "third"));
    assert!(eventually(WAIT, || pipeline.queue_stats().breaker_rejected == 1).await);
    assert_eq!(provider.calls(), 2);

    let signals = pipeline.signals();
    assert!(signals.any_breaker_open());
    assert_eq!(signals.breakers.len(), 1);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_rate_limited_jobs_are_dropped() {
    let provider = FakeProvider::answering();
    let cfg = config().with_rate_limit(
        RateLimiterConfig::new()
            .with_limit(1)
            .with_window(Duration::from_secs(60)),
    );
    let pipeline = with_backend(cfg, provider.clone());

    pipeline.report_error(&ErrorReport::new("A", "first"));
    pipeline.report_error(&ErrorReport::new("B", "second"));

    assert!(
        eventually(WAIT, || {
            let s = pipeline.queue_stats();
            s.completed == 1 && s.rate_limited == 1
        })
        .await
    );
    assert_eq!(provider.calls(), 1);
    assert_eq!(pipeline.signals().rate_limiter.denied, 1);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_rate_keys_are_independent() {
    let provider = FakeProvider::answering();
    let cfg = config().with_rate_limit(RateLimiterConfig::new().with_limit(1));
    let pipeline = with_backend(cfg, provider.clone());

    pipeline.report_error(&ErrorReport::new("A", "first").with_rate_key("tenant-1"));
    pipeline.report_error(&ErrorReport::new("B", "second").with_rate_key("tenant-2"));

    assert!(eventually(WAIT, || pipeline.queue_stats().completed == 2).await);
    assert_eq!(pipeline.queue_stats().rate_limited, 0);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_pressure_source_shrinks_capacity() {
    let source = Arc::new(ManualPressure::new(MemoryPressure::Normal));
    let cfg = config()
        .with_queue(QueueConfig::new().with_capacity(100).with_workers(1))
        .with_maintenance(
            MaintenanceConfig::new().with_pressure_poll_interval(Duration::from_millis(20)),
        );
    let pipeline = ErrorPipeline::builder()
        .with_config(cfg)
        .with_backend(FakeProvider::answering())
        .with_pressure_source(source.clone() as Arc<dyn PressureSource>)
        .build()
        .expect("pipeline builds");
    assert_eq!(pipeline.queue_stats().capacity, 100);

    source.set(MemoryPressure::Critical);
    assert!(eventually(WAIT, || pipeline.queue_stats().capacity == 25).await);
    assert_eq!(pipeline.pressure(), MemoryPressure::Critical);

    pipeline.set_pressure(MemoryPressure::Normal);
    assert_eq!(pipeline.queue_stats().capacity, 100);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_reports_after_shutdown_stay_pending() {
    let provider = FakeProvider::answering();
    let pipeline = with_backend(config(), provider.clone());
    pipeline.shutdown().await;

    let report = ErrorReport::new("LateError", "after shutdown");
    assert!(pipeline.report_error(&report).is_pending());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_build_without_backend_or_endpoint_fails() {
    let err = ErrorPipeline::builder()
        .with_config(PipelineConfig::new())
        .build()
        .err()
        .expect("no backend configured");
    let ctx = err.context().expect("configuration context");
    assert_eq!(ctx.field_path.as_deref(), Some("endpoint"));
}

#[test]
fn test_build_outside_runtime_fails() {
    let result = ErrorPipeline::builder()
        .with_backend(FakeProvider::answering())
        .build();
    assert!(matches!(result, Err(Error::Configuration { .. })));
}
