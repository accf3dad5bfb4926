//! Background timers: pressure polling, pool sampling and resizing, rate
//! window cleanup and cache TTL purge. All stop on one cancellation token.

use crate::cache::AdaptiveCache;
use crate::config::MaintenanceConfig;
use crate::pressure::PressureMonitor;
use crate::queue::AnalysisQueue;
use crate::resilience::RateLimiter;
use crate::transport::ConnectionPool;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub(crate) struct MaintenanceParts {
    pub monitor: Arc<PressureMonitor>,
    pub cache: Arc<AdaptiveCache>,
    pub queue: Arc<AnalysisQueue>,
    pub pool: Arc<ConnectionPool>,
    pub limiter: Arc<RateLimiter>,
}

pub(crate) struct Maintenance {
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Maintenance {
    pub fn spawn(runtime: &Handle, parts: MaintenanceParts, cfg: &MaintenanceConfig) -> Self {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(6);

        let monitor = Arc::clone(&parts.monitor);
        tasks.push(every(
            runtime,
            &cancel,
            cfg.pressure_poll_interval,
            move || {
                monitor.refresh();
            },
        ));

        tasks.push(runtime.spawn(apply_pressure_changes(
            parts.monitor.subscribe(),
            Arc::clone(&parts.cache),
            Arc::clone(&parts.queue),
            cancel.clone(),
        )));

        let pool = Arc::clone(&parts.pool);
        let sample_interval = pool.config().sample_interval;
        tasks.push(every(runtime, &cancel, sample_interval, move || pool.sample()));

        let pool = Arc::clone(&parts.pool);
        let resize_interval = pool.config().resize_interval;
        tasks.push(every(runtime, &cancel, resize_interval, move || {
            pool.resize();
        }));

        let limiter = Arc::clone(&parts.limiter);
        tasks.push(every(runtime, &cancel, cfg.rate_purge_interval, move || {
            let purged = limiter.purge_idle();
            if purged > 0 {
                trace!(purged, "idle rate windows removed");
            }
        }));

        let cache = Arc::clone(&parts.cache);
        tasks.push(every(runtime, &cancel, cfg.cache_purge_interval, move || {
            let expired = cache.purge_expired();
            if expired > 0 {
                trace!(expired, "expired cache entries removed");
            }
        }));

        Self {
            cancel,
            tasks: Mutex::new(tasks),
        }
    }

    /// Stop every timer without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop every timer and wait for the tasks to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.drain(..).collect()
        };
        let stopped = tasks.len();
        futures::future::join_all(tasks).await;
        debug!(stopped, "maintenance timers stopped");
    }
}

/// Run `tick` every `period` until cancelled. The first run is one period in.
fn every<F>(runtime: &Handle, cancel: &CancellationToken, period: Duration, tick: F) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    let cancel = cancel.clone();
    runtime.spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => tick(),
            }
        }
    })
}

async fn apply_pressure_changes(
    mut rx: tokio::sync::watch::Receiver<crate::pressure::MemoryPressure>,
    cache: Arc<AdaptiveCache>,
    queue: Arc<AnalysisQueue>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let level = *rx.borrow_and_update();
                cache.apply_pressure(level);
                queue.apply_pressure(level);
            }
        }
    }
}
