//! Thompson-sampling selector for take-profit / stop-loss / time-stop arms.
//!
//! Each arm keeps Beta sufficient statistics. `successes` grows by 1 on a
//! positive reward and by 0.1 otherwise, `trials` by 1 on every update, so
//! the implied failure count `trials - successes` never drops below its prior.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};
use surge_trade_core::{OrderMeta, StrategyConfig};

const PRIOR_SUCCESSES: f64 = 1.0;
const PRIOR_TRIALS: f64 = 2.0;
const NON_SUCCESS_CREDIT: f64 = 0.1;

const EPSILON_FLOOR: f64 = 0.01;
const EPSILON_CAP: f64 = 0.2;
const EPSILON_DECAY: f64 = 0.9;
const EPSILON_GROWTH: f64 = 1.05;

/// Smallest Beta shape parameter handed to the sampler.
const MIN_SHAPE: f64 = 1e-6;

/// Immutable exit parameters of one arm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmParams {
    /// Position of the arm in the selector's menu.
    pub index: usize,
    /// Take-profit fraction.
    pub tp: f64,
    /// Stop-loss distance in ATR multiples.
    pub sl_atr: f64,
    /// Time stop in minutes.
    pub tstop_min: u32,
}

impl ArmParams {
    /// Order metadata consumed by exit logic downstream.
    #[must_use]
    pub fn to_meta(&self) -> OrderMeta {
        let mut meta = OrderMeta::new();
        meta.insert("arm".to_string(), self.index.into());
        meta.insert("tp".to_string(), self.tp.into());
        meta.insert("sl_atr".to_string(), self.sl_atr.into());
        meta.insert("tstop".to_string(), self.tstop_min.into());
        meta
    }

    /// Recovers the arm index from fill or acknowledgment metadata.
    #[must_use]
    pub fn index_from_meta(meta: &OrderMeta) -> Option<usize> {
        meta.get("arm")
            .and_then(serde_json::Value::as_u64)
            .and_then(|i| usize::try_from(i).ok())
    }

    /// Rebuilds the full parameter set written by [`ArmParams::to_meta`].
    #[must_use]
    pub fn from_meta(meta: &OrderMeta) -> Option<Self> {
        Some(Self {
            index: Self::index_from_meta(meta)?,
            tp: meta.get("tp")?.as_f64()?,
            sl_atr: meta.get("sl_atr")?.as_f64()?,
            tstop_min: u32::try_from(meta.get("tstop")?.as_u64()?).ok()?,
        })
    }
}

/// An arm together with its learned statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanditArm {
    pub params: ArmParams,
    pub successes: f64,
    pub trials: f64,
}

impl BanditArm {
    fn new(params: ArmParams) -> Self {
        Self {
            params,
            successes: PRIOR_SUCCESSES,
            trials: PRIOR_TRIALS,
        }
    }

    /// Posterior mean success rate.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.successes / self.trials
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let alpha = self.successes.max(MIN_SHAPE);
        let beta = (self.trials - self.successes).max(MIN_SHAPE);
        Beta::new(alpha, beta).map_or(0.0, |dist| dist.sample(rng))
    }
}

struct BanditState {
    arms: Vec<BanditArm>,
    epsilon: f64,
    rng: StdRng,
}

/// Adaptive parameter selector over the full cross-product of choice sets.
///
/// All reads and updates go through one lock; the arm set is fixed at
/// construction.
pub struct ContextualBandit {
    state: Mutex<BanditState>,
}

impl std::fmt::Debug for ContextualBandit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ContextualBandit")
            .field("arms", &state.arms.len())
            .field("epsilon", &state.epsilon)
            .finish_non_exhaustive()
    }
}

impl ContextualBandit {
    /// Builds one arm per (tp, sl, tstop) combination, tp varying slowest.
    #[must_use]
    pub fn new(tp_choices: &[f64], sl_choices: &[f64], tstop_choices: &[u32], epsilon: f64) -> Self {
        Self::with_rng(
            tp_choices,
            sl_choices,
            tstop_choices,
            epsilon,
            StdRng::from_entropy(),
        )
    }

    #[must_use]
    pub fn with_seed(
        tp_choices: &[f64],
        sl_choices: &[f64],
        tstop_choices: &[u32],
        epsilon: f64,
        seed: u64,
    ) -> Self {
        Self::with_rng(
            tp_choices,
            sl_choices,
            tstop_choices,
            epsilon,
            StdRng::seed_from_u64(seed),
        )
    }

    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        let rng = config
            .random_seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self::with_rng(
            &config.tp_choices,
            &config.sl_choices,
            &config.tstop_choices,
            config.epsilon,
            rng,
        )
    }

    fn with_rng(
        tp_choices: &[f64],
        sl_choices: &[f64],
        tstop_choices: &[u32],
        epsilon: f64,
        rng: StdRng,
    ) -> Self {
        let mut arms = Vec::with_capacity(tp_choices.len() * sl_choices.len() * tstop_choices.len());
        for &tp in tp_choices {
            for &sl_atr in sl_choices {
                for &tstop_min in tstop_choices {
                    let index = arms.len();
                    arms.push(BanditArm::new(ArmParams {
                        index,
                        tp,
                        sl_atr,
                        tstop_min,
                    }));
                }
            }
        }

        Self {
            state: Mutex::new(BanditState { arms, epsilon, rng }),
        }
    }

    /// Picks an arm: uniformly at random with probability epsilon, otherwise
    /// the arm with the highest posterior sample.
    ///
    /// Returns `None` only when the arm set is empty.
    pub fn select(&self) -> Option<ArmParams> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.arms.is_empty() {
            return None;
        }

        if state.rng.gen::<f64>() < state.epsilon {
            let index = state.rng.gen_range(0..state.arms.len());
            tracing::debug!(arm = index, "bandit exploring");
            return Some(state.arms[index].params);
        }

        let mut best: Option<(f64, ArmParams)> = None;
        for arm in &state.arms {
            let sample = arm.sample(&mut state.rng);
            if best.map_or(true, |(top, _)| sample > top) {
                best = Some((sample, arm.params));
            }
        }
        best.map(|(_, params)| params)
    }

    /// Records the reward observed for `arm` and adapts exploration.
    ///
    /// A zero reward is not a success but still counts as a trial, and it
    /// widens exploration like a win does; only a strictly negative reward
    /// narrows it.
    pub fn update(&self, arm: &ArmParams, reward: f64) {
        let mut state = self.state.lock();
        let Some(entry) = state.arms.get_mut(arm.index) else {
            tracing::warn!(arm = arm.index, "update for unknown arm ignored");
            return;
        };

        entry.successes += if reward > 0.0 { 1.0 } else { NON_SUCCESS_CREDIT };
        entry.trials += 1.0;

        state.epsilon = if reward < 0.0 {
            (state.epsilon * EPSILON_DECAY).max(EPSILON_FLOOR)
        } else {
            (state.epsilon * EPSILON_GROWTH).min(EPSILON_CAP)
        };
        tracing::debug!(arm = arm.index, reward, epsilon = state.epsilon, "bandit updated");
    }

    /// Overwrites an arm's statistics, e.g. to warm-start from stored counts.
    pub fn set_arm_stats(&self, index: usize, successes: f64, trials: f64) {
        if let Some(arm) = self.state.lock().arms.get_mut(index) {
            arm.successes = successes;
            arm.trials = trials;
        }
    }

    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.state.lock().epsilon
    }

    /// Snapshot of every arm and its statistics.
    #[must_use]
    pub fn arms(&self) -> Vec<BanditArm> {
        self.state.lock().arms.clone()
    }

    #[must_use]
    pub fn arm(&self, index: usize) -> Option<ArmParams> {
        self.state.lock().arms.get(index).map(|arm| arm.params)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().arms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
