//! 分析队列模块：有界、固定并发的后台工作池，负责调用分析服务并写回缓存。
//!
//! # Analysis Queue
//!
//! Cache misses are handed to this queue and analyzed in the background by a
//! fixed number of worker tasks. Enqueue never blocks: a full queue rejects
//! the job on the spot, and queue depth (not worker count) is what absorbs
//! pressure.
//!
//! Per job a worker checks the circuit breaker, then the rate limiter, then
//! calls the provider through the retrying client. Success lands in the
//! cache; a failure is requeued with backoff until the attempt ceiling, after
//! which the job is dropped and the breaker is told.
//!
//! Jobs waiting out a retry delay stay inside the queue and count against
//! its capacity, so the number of pending signatures never exceeds
//! capacity plus the jobs currently in flight.
//!
//! ```rust
//! use faultline::queue::{AnalysisQueue, EnqueueOutcome, QueueConfig, QueueJob, RejectReason};
//! use faultline::types::ErrorReport;
//!
//! let queue = AnalysisQueue::new(QueueConfig::new().with_capacity(1));
//! let job = QueueJob::from_report(ErrorReport::new("Timeout", "db"));
//! assert_eq!(queue.enqueue(job.clone()), EnqueueOutcome::Accepted);
//! assert_eq!(
//!     queue.enqueue(job),
//!     EnqueueOutcome::Rejected(RejectReason::AlreadyPending)
//! );
//! ```

mod job;
mod stats;
mod worker;

pub use job::{QueueJob, GLOBAL_RATE_KEY};
pub use stats::QueueStats;
pub use worker::WorkerContext;

use crate::pressure::{MemoryPressure, PressureScaling};
use crate::signature::ErrorSignature;
use crate::types::ErrorReport;
use stats::QueueCounters;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Capacity under normal memory pressure.
    pub capacity_ceiling: usize,
    pub worker_concurrency: usize,
    /// Attempts per job (each attempt may itself retry at the HTTP level).
    pub max_attempts: u32,
    /// Retries inside one attempt, handled by the retrying client.
    pub http_retries: u32,
    /// Base delay before a failed job is requeued; doubles per attempt.
    pub requeue_delay: Duration,
    pub max_requeue_delay: Duration,
    pub scaling: PressureScaling,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity_ceiling: 1000,
            worker_concurrency: 4,
            max_attempts: 3,
            http_retries: 2,
            requeue_delay: Duration::from_secs(1),
            max_requeue_delay: Duration::from_secs(60),
            scaling: PressureScaling::default(),
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity_ceiling = capacity;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_concurrency = workers;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_http_retries(mut self, retries: u32) -> Self {
        self.http_retries = retries;
        self
    }

    pub fn with_requeue_delay(mut self, delay: Duration) -> Self {
        self.requeue_delay = delay;
        self
    }

    pub fn with_max_requeue_delay(mut self, delay: Duration) -> Self {
        self.max_requeue_delay = delay;
        self
    }

    pub fn with_scaling(mut self, scaling: PressureScaling) -> Self {
        self.scaling = scaling;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    QueueFull,
    /// The signature is already queued, in flight or waiting to be retried.
    AlreadyPending,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    Rejected(RejectReason),
}

impl EnqueueOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, EnqueueOutcome::Accepted)
    }
}

struct QueueState {
    jobs: VecDeque<QueueJob>,
    /// Failed jobs waiting for their retry, ordered by due time.
    delayed: BTreeMap<(Instant, u64), QueueJob>,
    delay_seq: u64,
    pending: HashSet<ErrorSignature>,
    capacity: usize,
}

impl QueueState {
    fn held(&self) -> usize {
        self.jobs.len() + self.delayed.len()
    }

    /// Move retries whose delay has elapsed to the back of the queue.
    fn promote_due(&mut self, now: Instant) {
        while let Some(entry) = self.delayed.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let job = entry.remove();
            self.jobs.push_back(job);
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.keys().next().map(|(due, _)| *due)
    }
}

/// Bounded job queue plus the fixed worker pool draining it.
pub struct AnalysisQueue {
    cfg: QueueConfig,
    state: Mutex<QueueState>,
    notify: Notify,
    in_flight: AtomicUsize,
    counters: QueueCounters,
    closed: AtomicBool,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AnalysisQueue {
    pub fn new(cfg: QueueConfig) -> Self {
        let capacity = cfg.capacity_ceiling.max(1);
        Self {
            state: Mutex::new(QueueState {
                jobs: VecDeque::with_capacity(capacity.min(1024)),
                delayed: BTreeMap::new(),
                delay_seq: 0,
                pending: HashSet::new(),
                capacity,
            }),
            cfg,
            notify: Notify::new(),
            in_flight: AtomicUsize::new(0),
            counters: QueueCounters::default(),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.cfg
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking, O(1). Never waits for room.
    pub fn enqueue(&self, job: QueueJob) -> EnqueueOutcome {
        let signature = job.signature.clone();
        self.admit(&signature, move || job)
    }

    /// Like [`enqueue`](Self::enqueue), but the report is only copied into a
    /// job once the queue has accepted its signature.
    pub fn enqueue_report(&self, signature: &ErrorSignature, report: &ErrorReport) -> EnqueueOutcome {
        self.admit(signature, || QueueJob::new(signature.clone(), report.clone()))
    }

    fn admit(&self, signature: &ErrorSignature, make_job: impl FnOnce() -> QueueJob) -> EnqueueOutcome {
        {
            let mut st = self.lock();
            if self.closed.load(Ordering::SeqCst) {
                return EnqueueOutcome::Rejected(RejectReason::ShuttingDown);
            }
            if st.pending.contains(signature) {
                drop(st);
                QueueCounters::bump(&self.counters.deduplicated);
                return EnqueueOutcome::Rejected(RejectReason::AlreadyPending);
            }
            if st.held() >= st.capacity {
                drop(st);
                QueueCounters::bump(&self.counters.rejected);
                debug!(signature = %signature, "analysis queue full, job rejected");
                return EnqueueOutcome::Rejected(RejectReason::QueueFull);
            }
            st.pending.insert(signature.clone());
            st.jobs.push_back(make_job());
        }
        QueueCounters::bump(&self.counters.accepted);
        self.notify.notify_one();
        EnqueueOutcome::Accepted
    }

    /// Hold a failed job for `delay`, then hand it to the workers again.
    /// The signature is already pending, so dedup is skipped. Returns false
    /// (and releases the signature) when the queue has no room.
    fn requeue_after(&self, job: QueueJob, delay: Duration) -> bool {
        let mut st = self.lock();
        if self.closed.load(Ordering::SeqCst) {
            st.pending.remove(&job.signature);
            return false;
        }
        if st.held() >= st.capacity {
            st.pending.remove(&job.signature);
            drop(st);
            QueueCounters::bump(&self.counters.rejected);
            debug!(signature = %job.signature, "analysis queue full, retry dropped");
            return false;
        }
        st.delay_seq += 1;
        let key = (Instant::now() + delay, st.delay_seq);
        st.delayed.insert(key, job);
        drop(st);
        QueueCounters::bump(&self.counters.requeued);
        // an idle worker may be sleeping toward a later deadline
        self.notify.notify_one();
        true
    }

    /// The job for this signature is finished (or dropped).
    fn forget(&self, signature: &ErrorSignature) {
        self.lock().pending.remove(signature);
    }

    /// Next job for a worker; `None` once the queue shuts down.
    async fn next_job(&self) -> Option<QueueJob> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let (job, more, next_due) = {
                let mut st = self.lock();
                st.promote_due(Instant::now());
                let job = st.jobs.pop_front();
                (job, !st.jobs.is_empty(), st.next_due())
            };
            if job.is_some() {
                if more {
                    self.notify.notify_one();
                }
                return job;
            }
            let retry_due = async {
                match next_due {
                    Some(due) => tokio::time::sleep_until(due).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = &mut notified => {}
                _ = retry_due => {}
            }
        }
    }

    /// Recompute active capacity for `level`. Jobs held beyond the new
    /// capacity are discarded newest-first, queued jobs before delayed
    /// retries; returns how many.
    pub fn apply_pressure(&self, level: MemoryPressure) -> usize {
        let capacity = self
            .cfg
            .scaling
            .scale_count(self.cfg.capacity_ceiling.max(1), level);
        let mut st = self.lock();
        st.capacity = capacity;
        let mut shed = 0;
        while st.held() > capacity {
            let job = match st.jobs.pop_back() {
                Some(job) => job,
                None => match st.delayed.pop_last() {
                    Some((_, job)) => job,
                    None => break,
                },
            };
            st.pending.remove(&job.signature);
            shed += 1;
        }
        drop(st);
        if shed > 0 {
            self.counters.shed.fetch_add(shed as u64, Ordering::Relaxed);
            debug!(level = %level, capacity, shed, "analysis queue shrunk");
        }
        shed
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn depth(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_pending(&self, signature: &ErrorSignature) -> bool {
        self.lock().pending.contains(signature)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = {
            let st = self.lock();
            QueueStats {
                depth: st.jobs.len(),
                delayed: st.delayed.len(),
                capacity: st.capacity,
                pending_signatures: st.pending.len(),
                ..Default::default()
            }
        };
        stats.ceiling = self.cfg.capacity_ceiling;
        stats.in_flight = self.in_flight.load(Ordering::Relaxed);
        self.counters.fill(&mut stats);
        stats
    }

    /// Spawn the worker pool on `runtime`. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>, ctx: WorkerContext, runtime: &Handle) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if !workers.is_empty() || self.is_closed() {
            return;
        }
        let ctx = Arc::new(ctx);
        for id in 0..self.cfg.worker_concurrency.max(1) {
            workers.push(runtime.spawn(worker::run(Arc::clone(self), Arc::clone(&ctx), id)));
        }
        debug!(workers = workers.len(), "analysis workers started");
    }

    /// Stop admission and signal workers to exit, without waiting.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        self.notify.notify_waiters();
    }

    /// Stop admission, cancel workers and wait for them to exit. Jobs still
    /// queued or waiting for a retry are discarded.
    pub async fn shutdown(&self) {
        self.close();
        let handles: Vec<_> = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect()
        };
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                if e.is_panic() {
                    warn!(error = %e, "analysis worker panicked");
                }
            }
        }
        let mut st = self.lock();
        let discarded = st.held();
        st.jobs.clear();
        st.delayed.clear();
        st.pending.clear();
        drop(st);
        debug!(discarded, "analysis queue shut down");
    }
}
