use crate::risk::RiskGate;
use rust_decimal::Decimal;
use std::sync::Arc;
use surge_trade_core::{Broker, BrokerError, EntryAdmission, OrderAck, OrderId, OrderRequest, Side};
use surge_trade_strategy::ArmParams;

/// Composes risk admission, order submission and position bookkeeping.
///
/// Locks are taken in a fixed order: the risk gate first, released, then
/// the broker. Neither is held while the other is acquired.
pub struct OrderRouter {
    broker: Arc<dyn Broker>,
    risk: Arc<RiskGate>,
    admission: EntryAdmission,
}

impl std::fmt::Debug for OrderRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderRouter")
            .field("risk", &self.risk)
            .field("admission", &self.admission)
            .finish_non_exhaustive()
    }
}

impl OrderRouter {
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>, risk: Arc<RiskGate>, admission: EntryAdmission) -> Self {
        Self {
            broker,
            risk,
            admission,
        }
    }

    #[must_use]
    pub fn risk(&self) -> &Arc<RiskGate> {
        &self.risk
    }

    #[must_use]
    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    #[must_use]
    pub const fn admission(&self) -> EntryAdmission {
        self.admission
    }

    /// Submits a market entry carrying the arm's exit parameters as metadata.
    ///
    /// Returns `Ok(None)` when risk refuses the entry; that is a policy
    /// outcome, not an error.
    ///
    /// Under [`EntryAdmission::CheckThenRegister`] the check and the position
    /// increment are separate steps around the submission, so concurrent
    /// entries can all pass the check before any is counted.
    ///
    /// # Errors
    ///
    /// Propagates broker submission failures. With `Reserve` admission the
    /// reserved slot is released first.
    pub async fn submit_entry(
        &self,
        symbol: &str,
        side: Side,
        qty: Decimal,
        arm: &ArmParams,
    ) -> Result<Option<OrderAck>, BrokerError> {
        let request = OrderRequest::market(symbol, side, qty).with_meta(arm.to_meta());

        match self.admission {
            EntryAdmission::Reserve => {
                if !self.risk.try_reserve() {
                    tracing::info!(symbol, "risk prevented new position");
                    return Ok(None);
                }
                match self.broker.place_order(request).await {
                    Ok(ack) => {
                        tracing::info!(order_id = %ack.order_id, symbol, arm = arm.index, "entry submitted");
                        Ok(Some(ack))
                    }
                    Err(e) => {
                        self.risk.register_position_change(-1);
                        Err(e)
                    }
                }
            }
            EntryAdmission::CheckThenRegister => {
                if !self.risk.can_open_new() {
                    tracing::info!(symbol, "risk prevented new position");
                    return Ok(None);
                }
                let ack = self.broker.place_order(request).await?;
                self.risk.register_position_change(1);
                tracing::info!(order_id = %ack.order_id, symbol, arm = arm.index, "entry submitted");
                Ok(Some(ack))
            }
        }
    }

    /// Cancels `order_id` and releases one position slot.
    ///
    /// The slot is released even when the cancel was a no-op because the
    /// order had already filled or was unknown.
    ///
    /// # Errors
    ///
    /// Propagates broker cancel failures; the slot is not released then.
    pub async fn submit_exit(&self, order_id: &OrderId) -> Result<(), BrokerError> {
        self.broker.cancel(order_id).await?;
        self.risk.register_position_change(-1);
        tracing::info!(order_id = %order_id, "exit submitted");
        Ok(())
    }
}
