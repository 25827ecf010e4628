//! Seeded synthetic market for paper sessions.
//!
//! Every step advances each symbol by one simulated second. Prices follow a
//! Gaussian random walk; now and then a symbol enters a short surge regime
//! with positive drift and elevated volume, which is what the detector is
//! meant to catch.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal, Normal, NormalError};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use surge_trade_core::{Features, TradeEvent};

const HISTORY: usize = 16;
const TICK_VOL: f64 = 0.0005;
const SURGE_DRIFT: f64 = 0.003;
const SURGE_PROBABILITY: f64 = 0.01;
const SURGE_TICKS: u32 = 20;
const SURGE_VOLUME: f64 = 5.0;
/// Smoothing for the per-second absolute-return average behind the ATR estimate.
const ATR_ALPHA: f64 = 0.05;

/// One symbol's market update for a simulated second.
#[derive(Debug, Clone)]
pub struct Tick {
    pub event: TradeEvent,
    pub price: Decimal,
    pub spread: Decimal,
    /// One-minute average true range as a fraction of price.
    pub atr_frac: f64,
}

struct SymbolState {
    symbol: String,
    history: VecDeque<f64>,
    surge_left: u32,
    abs_ret_ema: f64,
}

impl SymbolState {
    fn trailing_return(&self, lookback: usize) -> f64 {
        let len = self.history.len();
        if len <= lookback {
            return 0.0;
        }
        self.history[len - 1] / self.history[len - 1 - lookback] - 1.0
    }
}

pub struct SyntheticMarket {
    rng: StdRng,
    noise: Normal<f64>,
    volume: LogNormal<f64>,
    spread: Decimal,
    symbols: Vec<SymbolState>,
}

impl SyntheticMarket {
    /// # Errors
    ///
    /// Fails only if the built-in distribution parameters are invalid.
    pub fn new(
        symbols: &[String],
        start_price: f64,
        spread: Decimal,
        seed: u64,
    ) -> Result<Self, NormalError> {
        let symbols = symbols
            .iter()
            .map(|symbol| SymbolState {
                symbol: symbol.clone(),
                history: VecDeque::from([start_price]),
                surge_left: 0,
                // Mean absolute value of a zero-mean normal is sigma * sqrt(2/pi).
                abs_ret_ema: TICK_VOL * 0.8,
            })
            .collect();

        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            noise: Normal::new(0.0, TICK_VOL)?,
            volume: LogNormal::new(0.0, 0.25)?,
            spread,
            symbols,
        })
    }

    /// Advances every symbol by one second, one tick per symbol.
    pub fn step(&mut self) -> Vec<Tick> {
        let mut ticks = Vec::with_capacity(self.symbols.len());

        for state in &mut self.symbols {
            if state.surge_left == 0 && self.rng.gen_bool(SURGE_PROBABILITY) {
                state.surge_left = SURGE_TICKS;
                tracing::debug!(symbol = %state.symbol, "synthetic surge started");
            }
            let surging = state.surge_left > 0;
            state.surge_left = state.surge_left.saturating_sub(1);

            let drift = if surging { SURGE_DRIFT } else { 0.0 };
            let ret = drift + self.noise.sample(&mut self.rng);
            let last = state.history.back().copied().unwrap_or(1.0);
            let mid = (last * (1.0 + ret)).max(0.01);
            state.history.push_back(mid);
            if state.history.len() > HISTORY {
                state.history.pop_front();
            }
            state.abs_ret_ema = ATR_ALPHA * ret.abs() + (1.0 - ATR_ALPHA) * state.abs_ret_ema;

            let mut vol_spike = self.volume.sample(&mut self.rng);
            if surging {
                vol_spike *= SURGE_VOLUME;
            }

            let Some(price) = Decimal::from_f64(mid).map(|p| p.round_dp(4)) else {
                continue;
            };
            let features = Features {
                ret_5s: state.trailing_return(5),
                ret_15s: state.trailing_return(15),
                vol_spike,
            };
            ticks.push(Tick {
                event: TradeEvent::trade(state.symbol.clone(), features),
                price,
                spread: self.spread,
                atr_frac: state.abs_ret_ema * 60f64.sqrt(),
            });
        }

        ticks
    }
}
