use crate::pressure::{MemoryPressure, PressureHandle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of asking the breaker for permission to call the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// The single HalfOpen probe. Its outcome must be recorded, or the probe
    /// released with [`CircuitBreaker::release_probe`] if the call never happens.
    Probe,
    Refused,
}

impl Admission {
    pub fn is_permitted(&self) -> bool {
        !matches!(self, Admission::Refused)
    }
}

#[derive(Debug, Clone)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub effective_threshold: u32,
    pub probe_in_flight: bool,
    pub last_transition_at: Instant,
    pub current_cooldown_ms: u64,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
    pub reopen_count: u32,
    /// Calls refused without touching the provider.
    pub refused: u64,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit. With a non-zero
    /// `headroom_bonus` this is the floor used under critical pressure.
    pub failure_threshold: u32,
    pub cooldown: Duration,
    /// Upper bound for the cooldown after repeated failed probes.
    pub max_cooldown: Duration,
    /// Extra failures tolerated while memory pressure is normal (half of it
    /// when elevated). Zero by default, so the circuit opens at exactly
    /// `failure_threshold`.
    pub headroom_bonus: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(300),
            headroom_bonus: 0,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Alias for with_cooldown for API consistency
    pub fn with_reset_timeout(self, timeout: Duration) -> Self {
        self.with_cooldown(timeout)
    }

    pub fn with_max_cooldown(mut self, max: Duration) -> Self {
        self.max_cooldown = max;
        self
    }

    pub fn with_headroom_bonus(mut self, bonus: u32) -> Self {
        self.headroom_bonus = bonus;
        self
    }
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    consecutive_failures: u32,
    last_transition_at: Instant,
    probe_in_flight: bool,
    open_until: Option<Instant>,
    reopen_count: u32,
    current_cooldown: Duration,
}

/// Circuit breaker for one downstream target.
///
/// - `Closed`: calls pass; consecutive failures up to the adaptive threshold open it
/// - `Open`: calls are refused until the cooldown elapses
/// - `HalfOpen`: exactly one probe is in flight; success closes, failure reopens
///   with a longer (capped) cooldown
pub struct CircuitBreaker {
    target: String,
    cfg: CircuitBreakerConfig,
    pressure: PressureHandle,
    state: Mutex<State>,
    refused: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self::for_target("default", cfg, PressureHandle::default())
    }

    pub fn for_target(
        target: impl Into<String>,
        cfg: CircuitBreakerConfig,
        pressure: PressureHandle,
    ) -> Self {
        let cooldown = cfg.cooldown;
        Self {
            target: target.into(),
            cfg,
            pressure,
            state: Mutex::new(State {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_transition_at: Instant::now(),
                probe_in_flight: false,
                open_until: None,
                reopen_count: 0,
                current_cooldown: cooldown,
            }),
            refused: AtomicU64::new(0),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Failure threshold adjusted for the current memory headroom.
    pub fn effective_threshold(&self) -> u32 {
        let bonus = match self.pressure.level() {
            MemoryPressure::Normal => self.cfg.headroom_bonus,
            MemoryPressure::Elevated => self.cfg.headroom_bonus / 2,
            MemoryPressure::Critical => 0,
        };
        self.cfg.failure_threshold.saturating_add(bonus).max(1)
    }

    pub fn admit(&self) -> Admission {
        let now = Instant::now();
        let mut st = self.lock();
        match st.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let cooled = st.open_until.map(|until| now >= until).unwrap_or(true);
                if cooled {
                    st.state = CircuitState::HalfOpen;
                    st.open_until = None;
                    st.last_transition_at = now;
                    st.probe_in_flight = true;
                    drop(st);
                    info!(target_name = %self.target, "circuit breaker half-open, probing");
                    Admission::Probe
                } else {
                    drop(st);
                    self.refused.fetch_add(1, Ordering::Relaxed);
                    Admission::Refused
                }
            }
            CircuitState::HalfOpen => {
                if st.probe_in_flight {
                    drop(st);
                    self.refused.fetch_add(1, Ordering::Relaxed);
                    Admission::Refused
                } else {
                    st.probe_in_flight = true;
                    Admission::Probe
                }
            }
        }
    }

    /// Check if a call is allowed.
    pub fn allow(&self) -> bool {
        self.admit().is_permitted()
    }

    pub fn record_success(&self) {
        let mut st = self.lock();
        match st.state {
            CircuitState::Closed => st.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                st.state = CircuitState::Closed;
                st.consecutive_failures = 0;
                st.probe_in_flight = false;
                st.reopen_count = 0;
                st.current_cooldown = self.cfg.cooldown;
                st.last_transition_at = Instant::now();
                drop(st);
                info!(target_name = %self.target, "circuit breaker closed");
            }
            // a call admitted before the breaker opened; the cooldown still applies
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let threshold = self.effective_threshold();
        let now = Instant::now();
        let mut st = self.lock();
        st.consecutive_failures = st.consecutive_failures.saturating_add(1);
        match st.state {
            CircuitState::Closed => {
                if st.consecutive_failures >= threshold {
                    let cooldown = st.current_cooldown;
                    Self::open(&mut st, now, cooldown);
                    let failures = st.consecutive_failures;
                    drop(st);
                    warn!(
                        target_name = %self.target,
                        consecutive_failures = failures,
                        threshold,
                        cooldown_ms = cooldown.as_millis() as u64,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                st.reopen_count = st.reopen_count.saturating_add(1);
                let factor = 1u32.checked_shl(st.reopen_count).unwrap_or(u32::MAX);
                let cooldown = self
                    .cfg
                    .cooldown
                    .saturating_mul(factor)
                    .min(self.cfg.max_cooldown.max(self.cfg.cooldown));
                st.current_cooldown = cooldown;
                Self::open(&mut st, now, cooldown);
                let reopens = st.reopen_count;
                drop(st);
                warn!(
                    target_name = %self.target,
                    reopen_count = reopens,
                    cooldown_ms = cooldown.as_millis() as u64,
                    "circuit breaker probe failed, reopened"
                );
            }
            CircuitState::Open => {}
        }
    }

    /// Give back a probe admission whose call never happened.
    pub fn release_probe(&self) {
        let mut st = self.lock();
        if st.state == CircuitState::HalfOpen {
            st.probe_in_flight = false;
        }
    }

    fn open(st: &mut State, now: Instant, cooldown: Duration) {
        st.state = CircuitState::Open;
        st.open_until = Some(now + cooldown);
        st.last_transition_at = now;
        st.probe_in_flight = false;
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let threshold = self.effective_threshold();
        let now = Instant::now();
        let st = self.lock();
        let open_remaining_ms = st.open_until.and_then(|until| {
            if until > now {
                Some((until - now).as_millis() as u64)
            } else {
                None
            }
        });
        CircuitSnapshot {
            state: st.state,
            consecutive_failures: st.consecutive_failures,
            effective_threshold: threshold,
            probe_in_flight: st.probe_in_flight,
            last_transition_at: st.last_transition_at,
            current_cooldown_ms: st.current_cooldown.as_millis() as u64,
            open_remaining_ms,
            reopen_count: st.reopen_count,
            refused: self.refused.load(Ordering::Relaxed),
        }
    }
}
