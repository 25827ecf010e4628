pub mod bandit;
pub mod drift;
pub mod evaluator;
pub mod policy;
pub mod reward;
pub mod surge;

pub use bandit::{ArmParams, BanditArm, ContextualBandit};
pub use drift::DriftDetector;
pub use evaluator::{evaluate, EvaluationResult};
pub use policy::{PolicyController, PolicyDecision};
pub use reward::{compute_reward, TradeOutcome};
pub use surge::{SurgeDetector, SurgeSignal};
