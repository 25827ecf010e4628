//! Surge entry heuristic.
//!
//! Scores short-horizon momentum and volume expansion into `[0, 1]`. A
//! high score alone never triggers an entry; the volume spike must also
//! clear its own threshold.

use serde::{Deserialize, Serialize};
use surge_trade_core::{Features, StrategyConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgeSignal {
    pub symbol: String,
    pub score: f64,
    pub features: Features,
}

/// Stateless surge scorer.
#[derive(Debug, Clone, Copy)]
pub struct SurgeDetector {
    entry_threshold: f64,
    vol_spike_threshold: f64,
}

impl Default for SurgeDetector {
    fn default() -> Self {
        Self::new(0.6, 3.0)
    }
}

impl SurgeDetector {
    #[must_use]
    pub const fn new(entry_threshold: f64, vol_spike_threshold: f64) -> Self {
        Self {
            entry_threshold,
            vol_spike_threshold,
        }
    }

    #[must_use]
    pub const fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.entry_score_threshold, config.vol_spike_threshold)
    }

    /// `0.7 * z_ret + 0.3 * z_vol`, where `z_ret` rewards positive 5s/15s returns
    /// and `z_vol` is the fraction by which volume exceeds its threshold.
    #[must_use]
    pub fn score(&self, symbol: &str, features: &Features) -> SurgeSignal {
        let ret_5 = features.ret_5s.max(0.0);
        let ret_15 = features.ret_15s.max(0.0);
        let z_ret = (ret_5 * 20.0 + ret_15 * 10.0).min(1.0);
        let z_vol = (features.vol_spike / self.vol_spike_threshold.max(1e-9) - 1.0).clamp(0.0, 1.0);
        let score = (0.7 * z_ret + 0.3 * z_vol).clamp(0.0, 1.0);

        SurgeSignal {
            symbol: symbol.to_string(),
            score,
            features: *features,
        }
    }

    #[must_use]
    pub fn is_entry(&self, signal: &SurgeSignal) -> bool {
        signal.score >= self.entry_threshold && signal.features.vol_spike >= self.vol_spike_threshold
    }
}
