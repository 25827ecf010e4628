//! Simulated matching venue for paper trading.
//!
//! [`PaperBroker`] implements the [`surge_trade_core::Broker`] capability
//! entirely in memory, pricing fills off a [`PaperQuoteFeed`].

pub mod broker;
pub mod quote_feed;

pub use broker::{fill_price, PaperBroker, ShutdownMode};
pub use quote_feed::PaperQuoteFeed;
