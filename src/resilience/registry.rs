use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
use crate::pressure::PressureHandle;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// One circuit breaker per downstream target, created on first use.
pub struct BreakerRegistry {
    cfg: CircuitBreakerConfig,
    pressure: PressureHandle,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(cfg: CircuitBreakerConfig, pressure: PressureHandle) -> Self {
        Self {
            cfg,
            pressure,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, target: &str) -> Arc<CircuitBreaker> {
        if let Some(b) = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
        {
            return Arc::clone(b);
        }
        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(breakers.entry(target.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::for_target(
                target,
                self.cfg.clone(),
                self.pressure.clone(),
            ))
        }))
    }

    pub fn get(&self, target: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned()
    }

    /// State of an existing breaker; `None` if the target was never called.
    pub fn state(&self, target: &str) -> Option<CircuitState> {
        self.get(target).map(|b| b.state())
    }

    pub fn snapshots(&self) -> Vec<(String, CircuitSnapshot)> {
        let mut out: Vec<_> = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, b)| (name.clone(), b.snapshot()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_target_shares_one_breaker() {
        let reg = BreakerRegistry::new(CircuitBreakerConfig::default(), PressureHandle::default());
        let a = reg.get_or_create("provider");
        let b = reg.get_or_create("provider");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.state("provider"), Some(CircuitState::Closed));
        assert_eq!(reg.state("other"), None);
    }

    #[test]
    fn targets_fail_independently() {
        let reg = BreakerRegistry::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(1)
                .with_headroom_bonus(0),
            PressureHandle::default(),
        );
        reg.get_or_create("a").record_failure();
        reg.get_or_create("b");
        assert_eq!(reg.state("a"), Some(CircuitState::Open));
        assert_eq!(reg.state("b"), Some(CircuitState::Closed));
        let names: Vec<_> = reg.snapshots().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
