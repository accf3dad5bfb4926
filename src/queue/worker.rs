use super::stats::QueueCounters;
use super::{AnalysisQueue, QueueJob};
use crate::cache::AdaptiveCache;
use crate::resilience::{Admission, BreakerRegistry, RateLimiter};
use crate::transport::retry::exponential_backoff;
use crate::transport::{AnalysisRequest, RetryingClient};
use crate::types::AnalysisResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Shared handles every worker needs.
pub struct WorkerContext {
    pub cache: Arc<AdaptiveCache>,
    pub breakers: Arc<BreakerRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub client: Arc<RetryingClient>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

pub(super) async fn run(queue: Arc<AnalysisQueue>, ctx: Arc<WorkerContext>, id: usize) {
    while let Some(job) = queue.next_job().await {
        let _in_flight = InFlight::enter(&queue.in_flight);
        let cancelled = tokio::select! {
            _ = queue.cancel.cancelled() => true,
            _ = process(&queue, &ctx, job) => false,
        };
        if cancelled {
            break;
        }
    }
    debug!(worker = id, "analysis worker stopped");
}

async fn process(queue: &Arc<AnalysisQueue>, ctx: &WorkerContext, mut job: QueueJob) {
    let counters = &queue.counters;
    let breaker = ctx.breakers.get_or_create(ctx.client.backend_name());

    let admission = breaker.admit();
    if admission == Admission::Refused {
        QueueCounters::bump(&counters.breaker_rejected);
        queue.forget(&job.signature);
        debug!(signature = %job.signature, "provider unavailable, analysis dropped");
        return;
    }

    if !ctx.limiter.allow(&job.rate_key).await {
        if admission == Admission::Probe {
            breaker.release_probe();
        }
        QueueCounters::bump(&counters.rate_limited);
        queue.forget(&job.signature);
        debug!(
            signature = %job.signature,
            rate_key = %job.rate_key,
            "rate limited, analysis dropped"
        );
        return;
    }

    let mut request = AnalysisRequest::new(&job.signature, job.snapshot.clone());
    request.request_id = job.id;

    match ctx.client.send(&request, queue.cfg.http_retries).await {
        Ok(resp) => {
            // zero means "use the cache's current TTL"
            let ttl = resp
                .ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(Duration::ZERO);
            let result = AnalysisResult::new(job.signature.clone(), resp.advice, ttl);
            ctx.cache.put(job.signature.clone(), result);
            breaker.record_success();
            QueueCounters::bump(&counters.completed);
            queue.forget(&job.signature);
        }
        Err(err) => {
            QueueCounters::bump(&counters.failed_attempts);
            job.attempts += 1;
            let probe = admission == Admission::Probe;
            if probe {
                breaker.record_failure();
            }
            if err.is_retryable() && job.attempts < queue.cfg.max_attempts {
                let delay = match err.retry_after_ms() {
                    Some(ms) => Duration::from_millis(ms).min(queue.cfg.max_requeue_delay),
                    None => exponential_backoff(
                        queue.cfg.requeue_delay,
                        queue.cfg.max_requeue_delay,
                        job.attempts - 1,
                    ),
                };
                debug!(
                    signature = %job.signature,
                    attempts = job.attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "analysis failed, requeueing"
                );
                queue.requeue_after(job, delay);
            } else {
                if !probe {
                    breaker.record_failure();
                }
                QueueCounters::bump(&counters.dropped_exhausted);
                queue.forget(&job.signature);
                debug!(
                    signature = %job.signature,
                    attempts = job.attempts,
                    error = %err,
                    "analysis dropped after final attempt"
                );
            }
        }
    }
}
