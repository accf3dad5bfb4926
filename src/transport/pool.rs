//! Adaptive connection pool gate.
//!
//! reqwest owns the sockets; this gate bounds how many requests may be in
//! flight at once. The bound (`target_size`) is recomputed out of band from
//! recent demand samples, so a request never waits on a resize.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub floor: usize,
    pub ceiling: usize,
    pub sample_interval: Duration,
    pub resize_interval: Duration,
    /// Number of demand samples the average is taken over.
    pub sample_window: usize,
    /// Multiplier applied to average demand before the +1 spare slot.
    pub headroom: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            floor: 2,
            ceiling: 16,
            sample_interval: Duration::from_secs(1),
            resize_interval: Duration::from_secs(10),
            sample_window: 30,
            headroom: 1.25,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bounds(mut self, floor: usize, ceiling: usize) -> Self {
        self.floor = floor;
        self.ceiling = ceiling;
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn with_resize_interval(mut self, interval: Duration) -> Self {
        self.resize_interval = interval;
        self
    }

    pub fn with_sample_window(mut self, samples: usize) -> Self {
        self.sample_window = samples.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolSnapshot {
    pub active: usize,
    pub waiting: usize,
    pub target_size: usize,
    pub floor: usize,
    pub ceiling: usize,
    pub recent_average: f64,
    pub resizes: u64,
}

#[derive(Debug)]
struct Gate {
    active: usize,
    waiting: usize,
    target: usize,
    samples: VecDeque<usize>,
}

pub struct ConnectionPool {
    cfg: PoolConfig,
    gate: Mutex<Gate>,
    notify: Notify,
    resizes: AtomicU64,
}

/// Slot in the pool; released on drop.
pub struct PoolPermit<'a> {
    pool: &'a ConnectionPool,
}

impl Drop for PoolPermit<'_> {
    fn drop(&mut self) {
        {
            let mut gate = self.pool.lock();
            gate.active = gate.active.saturating_sub(1);
        }
        self.pool.notify.notify_one();
    }
}

/// Marks a caller as waiting in [`ConnectionPool::acquire`]. Dropping it
/// while still queued (the acquire future was cancelled) takes the caller
/// out of the demand count and hands any wake-up on to the next waiter.
struct Waiter<'a> {
    pool: &'a ConnectionPool,
    queued: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if !self.queued {
            return;
        }
        {
            let mut gate = self.pool.lock();
            gate.waiting = gate.waiting.saturating_sub(1);
        }
        self.pool.notify.notify_one();
    }
}

impl ConnectionPool {
    pub fn new(cfg: PoolConfig) -> Self {
        let floor = cfg.floor.max(1);
        let ceiling = cfg.ceiling.max(floor);
        let cfg = PoolConfig {
            floor,
            ceiling,
            ..cfg
        };
        Self {
            gate: Mutex::new(Gate {
                active: 0,
                waiting: 0,
                // start open; the first resize pulls it down to observed demand
                target: ceiling,
                samples: VecDeque::with_capacity(cfg.sample_window),
            }),
            cfg,
            notify: Notify::new(),
            resizes: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.cfg
    }

    fn lock(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a slot under the current target size.
    pub async fn acquire(&self) -> PoolPermit<'_> {
        let mut waiter = Waiter {
            pool: self,
            queued: false,
        };
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut gate = self.lock();
                if gate.active < gate.target {
                    gate.active += 1;
                    if waiter.queued {
                        gate.waiting = gate.waiting.saturating_sub(1);
                        waiter.queued = false;
                    }
                    return PoolPermit { pool: self };
                }
                if !waiter.queued {
                    gate.waiting += 1;
                    waiter.queued = true;
                }
            }
            notified.await;
        }
    }

    /// Non-blocking variant of [`acquire`](Self::acquire).
    pub fn try_acquire(&self) -> Option<PoolPermit<'_>> {
        let mut gate = self.lock();
        if gate.active < gate.target {
            gate.active += 1;
            Some(PoolPermit { pool: self })
        } else {
            None
        }
    }

    /// Record current demand (in-flight plus waiting requests).
    pub fn sample(&self) {
        let mut gate = self.lock();
        let demand = gate.active + gate.waiting;
        if gate.samples.len() >= self.cfg.sample_window.max(1) {
            gate.samples.pop_front();
        }
        gate.samples.push_back(demand);
    }

    /// Recompute the target from recent samples:
    /// `clamp(ceil(avg * headroom) + 1, floor, ceiling)`.
    ///
    /// Shrinking never revokes permits already handed out; it only stops new
    /// ones until in-flight requests drain below the new target.
    pub fn resize(&self) -> usize {
        let (old, new) = {
            let mut gate = self.lock();
            if gate.samples.is_empty() {
                return gate.target;
            }
            let avg = average(&gate.samples);
            let wanted = (avg * self.cfg.headroom).ceil() as usize + 1;
            let new = wanted.clamp(self.cfg.floor, self.cfg.ceiling);
            let old = gate.target;
            gate.target = new;
            (old, new)
        };
        if new != old {
            self.resizes.fetch_add(1, Ordering::Relaxed);
            debug!(from = old, to = new, "connection pool resized");
            if new > old {
                self.notify.notify_waiters();
            }
        }
        new
    }

    pub fn target_size(&self) -> usize {
        self.lock().target
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let gate = self.lock();
        PoolSnapshot {
            active: gate.active,
            waiting: gate.waiting,
            target_size: gate.target,
            floor: self.cfg.floor,
            ceiling: self.cfg.ceiling,
            recent_average: average(&gate.samples),
            resizes: self.resizes.load(Ordering::Relaxed),
        }
    }
}

fn average(samples: &VecDeque<usize>) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<usize>() as f64 / samples.len() as f64
    }
}
