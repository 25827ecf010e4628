use crate::bandit::{ArmParams, ContextualBandit};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub arm: ArmParams,
    /// Propensity reported with the decision; the sampler does not expose a
    /// closed-form probability so this is always 1.0.
    pub probability: f64,
}

/// Thin facade the decision loop and feedback path share.
#[derive(Debug, Clone)]
pub struct PolicyController {
    bandit: Arc<ContextualBandit>,
}

impl PolicyController {
    #[must_use]
    pub const fn new(bandit: Arc<ContextualBandit>) -> Self {
        Self { bandit }
    }

    #[must_use]
    pub fn choose(&self) -> Option<PolicyDecision> {
        self.bandit.select().map(|arm| PolicyDecision {
            arm,
            probability: 1.0,
        })
    }

    pub fn update(&self, arm: &ArmParams, reward: f64) {
        self.bandit.update(arm, reward);
    }

    /// Applies a reward to the arm recorded at `index`, if it exists.
    pub fn update_index(&self, index: usize, reward: f64) -> bool {
        match self.bandit.arm(index) {
            Some(arm) => {
                self.bandit.update(&arm, reward);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn bandit(&self) -> &Arc<ContextualBandit> {
        &self.bandit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_reports_unit_probability() {
        let bandit = Arc::new(ContextualBandit::with_seed(&[0.03], &[1.0], &[10], 0.0, 5));
        let policy = PolicyController::new(bandit);

        let decision = policy.choose().unwrap();
        assert_eq!(decision.arm.index, 0);
        assert!((decision.probability - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_update_index_reaches_bandit() {
        let bandit = Arc::new(ContextualBandit::with_seed(&[0.03, 0.05], &[1.0], &[10], 0.1, 5));
        let policy = PolicyController::new(Arc::clone(&bandit));

        assert!(policy.update_index(1, 4.0));
        assert!(!policy.update_index(7, 4.0));
        assert!((bandit.arms()[1].successes - 2.0).abs() < 1e-12);
    }
}
