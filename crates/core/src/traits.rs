use crate::error::BrokerError;
use crate::events::{FillEvent, OrderAck, OrderId, OrderRequest, PositionSnapshot, Quote};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Subscriber invoked once per fill event.
///
/// Called outside every venue lock, so it may call back into the broker.
pub type FillCallback = Arc<dyn Fn(&FillEvent) + Send + Sync>;

/// Order-execution capability shared by simulated and live venues.
///
/// `place_order` acknowledges immediately; the outcome is only observable
/// through `stream_orders`.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck, BrokerError>;

    /// Cancels an open order. Unknown or already-filled ids are a no-op.
    async fn cancel(&self, order_id: &OrderId) -> Result<(), BrokerError>;

    async fn positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError>;

    async fn cash(&self) -> Result<Decimal, BrokerError>;

    /// Delivers fill events to `on_event` for as long as the returned future is
    /// polled. The callback is deregistered on every exit path, including when
    /// the future is dropped.
    async fn stream_orders(&self, on_event: FillCallback) -> Result<(), BrokerError>;
}

/// Source of the quotes a simulated venue prices fills against.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, symbol: &str) -> Quote;
}
