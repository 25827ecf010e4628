pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod traits;

pub use config::{
    AppConfig, BrokerKind, EntryAdmission, ExecutionConfig, PaperBrokerConfig, RiskConfig,
    StrategyConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{BrokerError, ConfigError};
pub use events::{
    EventKind, Features, FillEvent, Order, OrderAck, OrderId, OrderMeta, OrderRequest,
    OrderStatus, OrderType, PositionSnapshot, Quote, Side, TimeInForce, TradeEvent,
};
pub use traits::{Broker, FillCallback, QuoteSource};
