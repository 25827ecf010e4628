use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use surge_trade_core::{PaperBrokerConfig, Quote, QuoteSource};

/// Last-trade/spread table fed by the market-data side and read at fill time.
///
/// Symbols never updated quote at the configured default price and spread.
#[derive(Debug)]
pub struct PaperQuoteFeed {
    quotes: RwLock<HashMap<String, Quote>>,
    fallback: Quote,
}

impl Default for PaperQuoteFeed {
    fn default() -> Self {
        Self::from_config(&PaperBrokerConfig::default())
    }
}

impl PaperQuoteFeed {
    #[must_use]
    pub fn new(default_price: Decimal, default_spread: Decimal) -> Self {
        Self {
            quotes: RwLock::new(HashMap::new()),
            fallback: Quote::new(default_price, default_spread),
        }
    }

    #[must_use]
    pub fn from_config(config: &PaperBrokerConfig) -> Self {
        Self::new(config.default_price, config.default_spread)
    }

    pub fn update(&self, symbol: &str, price: Decimal, spread: Decimal) {
        self.quotes
            .write()
            .insert(symbol.to_string(), Quote::new(price, spread));
    }

    #[must_use]
    pub fn get(&self, symbol: &str) -> Quote {
        self.quotes
            .read()
            .get(symbol)
            .copied()
            .unwrap_or(self.fallback)
    }
}

#[async_trait]
impl QuoteSource for PaperQuoteFeed {
    async fn quote(&self, symbol: &str) -> Quote {
        self.get(symbol)
    }
}
