use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub sharpe: f64,
    pub win_rate: f64,
    pub avg_hold: f64,
}

/// Per-trade Sharpe (population std), win rate and mean holding time.
#[must_use]
pub fn evaluate(pnls: &[f64], holds: &[f64]) -> EvaluationResult {
    let (sharpe, win_rate) = if pnls.is_empty() {
        (0.0, 0.0)
    } else {
        let n = pnls.len() as f64;
        let mean = pnls.iter().sum::<f64>() / n;
        let variance = pnls.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
        let wins = pnls.iter().filter(|&&p| p > 0.0).count() as f64;
        (mean / (variance.sqrt() + 1e-9), wins / n)
    };
    let avg_hold = if holds.is_empty() {
        0.0
    } else {
        holds.iter().sum::<f64>() / holds.len() as f64
    };

    EvaluationResult {
        sharpe,
        win_rate,
        avg_hold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_mixed_trades() {
        let result = evaluate(&[1.0, -1.0, 3.0, 1.0], &[60.0, 120.0]);

        // mean 1, population std sqrt(2)
        assert!((result.sharpe - 1.0 / 2f64.sqrt()).abs() < 1e-6);
        assert!((result.win_rate - 0.75).abs() < 1e-12);
        assert!((result.avg_hold - 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_empty_is_zero() {
        let result = evaluate(&[], &[]);
        assert_eq!(result.sharpe, 0.0);
        assert_eq!(result.win_rate, 0.0);
        assert_eq!(result.avg_hold, 0.0);
    }
}
