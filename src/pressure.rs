//! Memory-pressure signal.
//!
//! The pipeline does not introspect memory itself. A host-provided
//! [`PressureSource`] is polled on a timer (or the level is pushed through
//! [`PressureMonitor::set`]) and capacity-bounded structures observe the
//! current level through a [`PressureHandle`] or a `watch` subscription.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Coarse memory-pressure level reported by the host.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPressure {
    #[default]
    Normal,
    Elevated,
    Critical,
}

impl MemoryPressure {
    fn as_u8(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Elevated => 1,
            Self::Critical => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Normal,
            1 => Self::Elevated,
            _ => Self::Critical,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Elevated => "elevated",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for MemoryPressure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How much of a configured ceiling stays available at each pressure level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureScaling {
    pub elevated: f64,
    pub critical: f64,
}

impl Default for PressureScaling {
    fn default() -> Self {
        Self {
            elevated: 0.5,
            critical: 0.25,
        }
    }
}

impl PressureScaling {
    pub fn factor(&self, level: MemoryPressure) -> f64 {
        let f = match level {
            MemoryPressure::Normal => 1.0,
            MemoryPressure::Elevated => self.elevated,
            MemoryPressure::Critical => self.critical,
        };
        if f.is_finite() {
            f.clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    /// Scaled element count, never below 1.
    pub fn scale_count(&self, ceiling: usize, level: MemoryPressure) -> usize {
        let scaled = (ceiling as f64 * self.factor(level)).floor() as usize;
        scaled.clamp(1, ceiling.max(1))
    }

    pub fn scale_duration(&self, base: Duration, level: MemoryPressure) -> Duration {
        base.mul_f64(self.factor(level))
    }
}

/// Host-provided pressure probe, polled by the maintenance loop.
pub trait PressureSource: Send + Sync {
    fn poll(&self) -> MemoryPressure;
}

impl<F> PressureSource for F
where
    F: Fn() -> MemoryPressure + Send + Sync,
{
    fn poll(&self) -> MemoryPressure {
        self()
    }
}

/// A pressure source whose level is set by hand. Useful for hosts that push
/// levels from elsewhere, and for tests.
#[derive(Debug, Default)]
pub struct ManualPressure {
    level: AtomicU8,
}

impl ManualPressure {
    pub fn new(level: MemoryPressure) -> Self {
        Self {
            level: AtomicU8::new(level.as_u8()),
        }
    }

    pub fn set(&self, level: MemoryPressure) {
        self.level.store(level.as_u8(), Ordering::Release);
    }
}

impl PressureSource for ManualPressure {
    fn poll(&self) -> MemoryPressure {
        MemoryPressure::from_u8(self.level.load(Ordering::Acquire))
    }
}

/// Cheap read-only view of the current level.
#[derive(Debug, Clone)]
pub struct PressureHandle {
    level: Arc<AtomicU8>,
}

impl PressureHandle {
    /// A handle pinned to `level`, not attached to any monitor.
    pub fn fixed(level: MemoryPressure) -> Self {
        Self {
            level: Arc::new(AtomicU8::new(level.as_u8())),
        }
    }

    pub fn level(&self) -> MemoryPressure {
        MemoryPressure::from_u8(self.level.load(Ordering::Acquire))
    }
}

impl Default for PressureHandle {
    fn default() -> Self {
        Self::fixed(MemoryPressure::Normal)
    }
}

/// Owns the current level and notifies observers when it changes.
pub struct PressureMonitor {
    level: Arc<AtomicU8>,
    tx: watch::Sender<MemoryPressure>,
    source: Option<Arc<dyn PressureSource>>,
}

impl PressureMonitor {
    pub fn new(source: Option<Arc<dyn PressureSource>>) -> Self {
        let initial = source
            .as_ref()
            .map(|s| s.poll())
            .unwrap_or(MemoryPressure::Normal);
        let (tx, _rx) = watch::channel(initial);
        Self {
            level: Arc::new(AtomicU8::new(initial.as_u8())),
            tx,
            source,
        }
    }

    pub fn level(&self) -> MemoryPressure {
        MemoryPressure::from_u8(self.level.load(Ordering::Acquire))
    }

    pub fn handle(&self) -> PressureHandle {
        PressureHandle {
            level: Arc::clone(&self.level),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MemoryPressure> {
        self.tx.subscribe()
    }

    /// Publish a new level. Returns true if it differs from the previous one.
    pub fn set(&self, level: MemoryPressure) -> bool {
        let previous = MemoryPressure::from_u8(self.level.swap(level.as_u8(), Ordering::AcqRel));
        if previous == level {
            return false;
        }
        self.tx.send_replace(level);
        info!(from = %previous, to = %level, "memory pressure changed");
        true
    }

    /// Poll the configured source, if any, and publish its level.
    pub fn refresh(&self) -> bool {
        match &self.source {
            Some(source) => self.set(source.poll()),
            None => false,
        }
    }
}
