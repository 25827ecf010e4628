use serde::{Deserialize, Serialize};

/// Realized and unrealized result of one trade, as seen by the selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub realized: f64,
    pub unrealized: f64,
    pub fees: f64,
    pub slippage: f64,
    pub holding_time_secs: f64,
}

/// Net P&L minus a holding penalty of one unit per hour held.
#[must_use]
pub fn compute_reward(outcome: &TradeOutcome) -> f64 {
    let pnl = outcome.realized + outcome.unrealized - outcome.fees - outcome.slippage;
    let penalty = outcome.holding_time_secs / 3600.0;
    pnl - penalty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_nets_costs_and_holding_penalty() {
        let outcome = TradeOutcome {
            realized: 12.0,
            unrealized: 3.0,
            fees: 1.0,
            slippage: 0.5,
            holding_time_secs: 1800.0,
        };
        assert!((compute_reward(&outcome) - 13.0).abs() < 1e-12);
    }

    #[test]
    fn test_flat_trade_held_long_is_negative() {
        let outcome = TradeOutcome {
            holding_time_secs: 7200.0,
            ..TradeOutcome::default()
        };
        assert!((compute_reward(&outcome) + 2.0).abs() < 1e-12);
    }
}
