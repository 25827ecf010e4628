use crate::error::ConfigError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub paper: PaperBrokerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl AppConfig {
    /// Checks cross-field constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy.validate()?;
        self.risk.validate()?;
        self.paper.validate()?;
        if self.execution.entry_quantity <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "execution.entry_quantity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Signal thresholds and the bandit's arm menu.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Take-profit fractions (0.05 = 5%).
    pub tp_choices: Vec<f64>,
    /// Stop-loss distances in ATR multiples.
    pub sl_choices: Vec<f64>,
    /// Time stops in minutes.
    pub tstop_choices: Vec<u32>,
    /// Initial exploration rate.
    pub epsilon: f64,
    pub entry_score_threshold: f64,
    pub vol_spike_threshold: f64,
    /// Seed for the selector's RNG; entropy when absent.
    pub random_seed: Option<u64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            tp_choices: vec![0.03, 0.04, 0.05, 0.06, 0.07, 0.08],
            sl_choices: vec![1.0, 1.25, 1.5, 2.0],
            tstop_choices: vec![10, 15, 20],
            epsilon: 0.07,
            entry_score_threshold: 0.6,
            vol_spike_threshold: 3.0,
            random_seed: None,
        }
    }
}

impl StrategyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.tp_choices.is_empty() || self.sl_choices.is_empty() || self.tstop_choices.is_empty()
        {
            return Err(ConfigError::Invalid(
                "strategy choice sets must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(ConfigError::Invalid(format!(
                "strategy.epsilon must be within [0, 1], got {}",
                self.epsilon
            )));
        }
        if self.vol_spike_threshold <= 0.0 {
            return Err(ConfigError::Invalid(
                "strategy.vol_spike_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Realized session loss (positive magnitude) that halts trading.
    pub max_drawdown: Decimal,
    pub max_concurrent_positions: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_drawdown: Decimal::from(500),
            max_concurrent_positions: 3,
        }
    }
}

impl RiskConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_drawdown <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "risk.max_drawdown must be positive".to_string(),
            ));
        }
        if self.max_concurrent_positions == 0 {
            return Err(ConfigError::Invalid(
                "risk.max_concurrent_positions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Simulated venue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperBrokerConfig {
    pub initial_cash: Decimal,
    /// Lower bound of the uniform fill delay.
    pub min_fill_delay_ms: u64,
    /// Upper bound of the uniform fill delay (inclusive).
    pub max_fill_delay_ms: u64,
    /// Price used for symbols the quote feed has never seen.
    pub default_price: Decimal,
    pub default_spread: Decimal,
    pub random_seed: Option<u64>,
}

impl Default for PaperBrokerConfig {
    fn default() -> Self {
        Self {
            initial_cash: Decimal::from(100_000),
            min_fill_delay_ms: 50,
            max_fill_delay_ms: 200,
            default_price: Decimal::from(100),
            default_spread: Decimal::new(5, 2),
            random_seed: None,
        }
    }
}

impl PaperBrokerConfig {
    /// Config with a fixed fill delay, mostly useful in tests.
    #[must_use]
    pub fn with_fill_delay_ms(mut self, ms: u64) -> Self {
        self.min_fill_delay_ms = ms;
        self.max_fill_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn with_initial_cash(mut self, cash: Decimal) -> Self {
        self.initial_cash = cash;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_fill_delay_ms > self.max_fill_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "paper fill delay range is inverted: {}..={}",
                self.min_fill_delay_ms, self.max_fill_delay_ms
            )));
        }
        if self.default_spread < Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "paper.default_spread must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// How the router reconciles the risk check with the position counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryAdmission {
    /// Check and count in one step under the risk lock; released if the
    /// submission fails.
    #[default]
    Reserve,
    /// Check, submit, then count. Concurrent entries can overshoot the
    /// position limit between the check and the count.
    CheckThenRegister,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerKind {
    #[default]
    Paper,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub broker: BrokerKind,
    pub entry_admission: EntryAdmission,
    /// Quantity submitted per entry decision.
    pub entry_quantity: Decimal,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            broker: BrokerKind::Paper,
            entry_admission: EntryAdmission::Reserve,
            entry_quantity: Decimal::ONE,
        }
    }
}
