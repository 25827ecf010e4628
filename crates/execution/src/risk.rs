//! Risk guardrails protecting the strategy from runaway losses.
//!
//! Trading halts when the session's realized loss reaches `max_drawdown`
//! and stays halted until an operator re-enables it. New positions are
//! refused while the open-position count is at its limit.
//!
//! # Example
//!
//! ```
//! use surge_trade_core::RiskConfig;
//! use surge_trade_execution::RiskGate;
//! use rust_decimal_macros::dec;
//!
//! let gate = RiskGate::new(RiskConfig {
//!     max_drawdown: dec!(100),
//!     max_concurrent_positions: 3,
//! });
//! assert!(gate.can_open_new());
//!
//! gate.register_fill(dec!(-150));
//! assert!(!gate.can_open_new());
//! ```

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use surge_trade_core::RiskConfig;

// =============================================================================
// State
// =============================================================================

/// Point-in-time copy of the guardrail counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// Session realized loss, never positive.
    pub daily_loss: Decimal,
    /// Router-tracked open entries. Can dip below zero when exits race fills.
    pub positions: i64,
    pub trading_enabled: bool,
}

impl Default for RiskSnapshot {
    fn default() -> Self {
        Self {
            daily_loss: Decimal::ZERO,
            positions: 0,
            trading_enabled: true,
        }
    }
}

// =============================================================================
// Risk Gate
// =============================================================================

/// Guardrail state behind a single lock.
///
/// Every method takes the lock once and completes before the next caller
/// proceeds; none of them await.
#[derive(Debug)]
pub struct RiskGate {
    config: RiskConfig,
    state: Mutex<RiskSnapshot>,
}

impl RiskGate {
    #[must_use]
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RiskSnapshot::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Folds a realized P&L into the session loss.
    ///
    /// Gains pull the loss back toward zero but never above it. Reaching
    /// `max_drawdown` disables trading; this method never re-enables it.
    pub fn register_fill(&self, pnl: Decimal) {
        let mut state = self.state.lock();
        state.daily_loss = (state.daily_loss + pnl).min(Decimal::ZERO);
        tracing::debug!(daily_loss = %state.daily_loss, pnl = %pnl, "updated daily loss");

        if state.daily_loss.abs() >= self.config.max_drawdown && state.trading_enabled {
            state.trading_enabled = false;
            tracing::warn!(
                daily_loss = %state.daily_loss,
                max_drawdown = %self.config.max_drawdown,
                "trading disabled due to drawdown"
            );
        }
    }

    /// Adjusts the open-position count. No clamping is applied.
    pub fn register_position_change(&self, delta: i64) {
        let mut state = self.state.lock();
        state.positions += delta;
        tracing::debug!(positions = state.positions, delta, "open positions changed");
    }

    /// Whether a new position may open right now.
    #[must_use]
    pub fn can_open_new(&self) -> bool {
        let state = self.state.lock();
        self.admits(&state)
    }

    /// Checks admission and claims a position slot in one step.
    ///
    /// Returns false, leaving the count untouched, when admission fails.
    #[must_use]
    pub fn try_reserve(&self) -> bool {
        let mut state = self.state.lock();
        if !self.admits(&state) {
            return false;
        }
        state.positions += 1;
        tracing::debug!(positions = state.positions, "position slot reserved");
        true
    }

    /// Manual override; the only way to re-enable after a drawdown halt.
    pub fn toggle_trading(&self, enabled: bool) {
        let mut state = self.state.lock();
        state.trading_enabled = enabled;
        tracing::info!(enabled, "trading toggled");
    }

    #[must_use]
    pub fn snapshot(&self) -> RiskSnapshot {
        *self.state.lock()
    }

    fn admits(&self, state: &RiskSnapshot) -> bool {
        state.trading_enabled
            && state.daily_loss.abs() < self.config.max_drawdown
            && state.positions < i64::from(self.config.max_concurrent_positions)
    }
}

// =============================================================================
// Tests
// =============================================================================
