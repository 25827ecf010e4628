//! Risk gating, order routing and the event-driven decision loop.

pub mod decision_loop;
pub mod risk;
pub mod router;

pub use decision_loop::{DecisionLoop, DecisionLoopHandle, LoopStats};
pub use risk::{RiskGate, RiskSnapshot};
pub use router::OrderRouter;
