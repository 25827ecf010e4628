//! Open-trade bookkeeping for paper sessions.
//!
//! An entry fill opens a trade carrying the arm that chose it. Every mark
//! checks that arm's take-profit, stop-loss and time stop; a triggered trade
//! is flattened with an opposite market order tagged [`EXIT_OF`], and the
//! fill of that order closes the trade with a realized P&L.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use surge_trade_core::{FillEvent, OrderId, OrderMeta, OrderRequest, Side};
use surge_trade_strategy::ArmParams;

/// Metadata key linking an exit order to the entry it flattens.
pub const EXIT_OF: &str = "exit_of";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TimeStop,
}

/// Flattening order for a triggered trade.
#[derive(Debug, Clone)]
pub struct ExitOrder {
    pub entry_id: OrderId,
    pub request: OrderRequest,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub entry_id: OrderId,
    pub symbol: String,
    pub arm: ArmParams,
    pub pnl: Decimal,
    pub holding_secs: u64,
}

#[derive(Debug, Clone)]
struct OpenTrade {
    symbol: String,
    side: Side,
    quantity: Decimal,
    entry_price: Decimal,
    arm: ArmParams,
    opened_at: u64,
    closing: bool,
}

#[derive(Debug, Default)]
pub struct TradeBook {
    open: HashMap<OrderId, OpenTrade>,
    closed: Vec<ClosedTrade>,
    /// Simulated seconds since the session started.
    clock: u64,
}

impl TradeBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the simulated clock forward one second.
    pub fn advance(&mut self) {
        self.clock += 1;
    }

    #[must_use]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Trades opened and not yet closed, including those with an exit in flight.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    #[must_use]
    pub fn closed(&self) -> &[ClosedTrade] {
        &self.closed
    }

    /// Records a fill. Returns the trade it closed, if it was an exit fill.
    ///
    /// Fills without arm or exit metadata are ignored.
    pub fn on_fill(&mut self, fill: &FillEvent) -> Option<ClosedTrade> {
        if let Some(entry) = fill.meta.get(EXIT_OF).and_then(serde_json::Value::as_str) {
            let entry_id = OrderId::from(entry);
            let Some(trade) = self.open.remove(&entry_id) else {
                tracing::warn!(entry_id = %entry_id, "exit fill for unknown trade");
                return None;
            };
            let closed = ClosedTrade {
                pnl: (fill.price - trade.entry_price) * trade.side.signed(trade.quantity),
                holding_secs: self.clock.saturating_sub(trade.opened_at),
                entry_id,
                symbol: trade.symbol,
                arm: trade.arm,
            };
            self.closed.push(closed.clone());
            return Some(closed);
        }

        let arm = ArmParams::from_meta(&fill.meta)?;
        self.open.insert(
            fill.order_id.clone(),
            OpenTrade {
                symbol: fill.symbol.clone(),
                side: fill.side,
                quantity: fill.quantity,
                entry_price: fill.price,
                arm,
                opened_at: self.clock,
                closing: false,
            },
        );
        None
    }

    /// Checks every open trade on `symbol` against `price`.
    ///
    /// `atr_frac` scales the arm's stop distance. Triggered trades are marked
    /// closing so they are exited once; orders come back sorted by entry id.
    pub fn on_mark(&mut self, symbol: &str, price: Decimal, atr_frac: f64) -> Vec<ExitOrder> {
        let clock = self.clock;
        let mut exits = Vec::new();

        for (entry_id, trade) in &mut self.open {
            if trade.closing || trade.symbol != symbol || trade.entry_price.is_zero() {
                continue;
            }
            let move_frac = ((price - trade.entry_price) / trade.entry_price)
                .to_f64()
                .unwrap_or(0.0);
            let ret = match trade.side {
                Side::Buy => move_frac,
                Side::Sell => -move_frac,
            };

            let reason = if ret >= trade.arm.tp {
                ExitReason::TakeProfit
            } else if ret <= -(trade.arm.sl_atr * atr_frac) {
                ExitReason::StopLoss
            } else if clock.saturating_sub(trade.opened_at) >= u64::from(trade.arm.tstop_min) * 60 {
                ExitReason::TimeStop
            } else {
                continue;
            };

            trade.closing = true;
            let mut meta = OrderMeta::new();
            meta.insert(EXIT_OF.to_string(), entry_id.as_str().into());
            exits.push(ExitOrder {
                entry_id: entry_id.clone(),
                request: OrderRequest::market(symbol, trade.side.opposite(), trade.quantity)
                    .with_meta(meta),
                reason,
            });
        }

        exits.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
        exits
    }

    /// Clears the closing flag after an exit order could not be placed.
    pub fn reopen(&mut self, entry_id: &OrderId) {
        if let Some(trade) = self.open.get_mut(entry_id) {
            trade.closing = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use surge_trade_core::OrderStatus;

    fn arm() -> ArmParams {
        ArmParams {
            index: 2,
            tp: 0.05,
            sl_atr: 1.0,
            tstop_min: 10,
        }
    }

    fn fill(id: &str, side: Side, price: Decimal, meta: OrderMeta) -> FillEvent {
        FillEvent {
            order_id: OrderId::from(id),
            symbol: "AAPL".to_string(),
            side,
            quantity: dec!(2),
            price,
            status: OrderStatus::Filled,
            timestamp: Default::default(),
            meta,
        }
    }

    fn open_long(book: &mut TradeBook, price: Decimal) {
        let closed = book.on_fill(&fill("PAPER-1", Side::Buy, price, arm().to_meta()));
        assert!(closed.is_none());
        assert_eq!(book.open_count(), 1);
    }

    #[test]
    fn test_fill_without_metadata_is_ignored() {
        let mut book = TradeBook::new();
        assert!(book
            .on_fill(&fill("PAPER-1", Side::Buy, dec!(100), OrderMeta::new()))
            .is_none());
        assert_eq!(book.open_count(), 0);
    }

    #[test]
    fn test_take_profit_triggers_once() {
        let mut book = TradeBook::new();
        open_long(&mut book, dec!(100));

        assert!(book.on_mark("AAPL", dec!(104), 0.01).is_empty());

        let exits = book.on_mark("AAPL", dec!(105), 0.01);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].reason, ExitReason::TakeProfit);
        assert_eq!(exits[0].entry_id, OrderId::from("PAPER-1"));
        assert_eq!(exits[0].request.side, Side::Sell);
        assert_eq!(exits[0].request.quantity, dec!(2));
        assert_eq!(
            exits[0].request.meta.get(EXIT_OF).and_then(|v| v.as_str()),
            Some("PAPER-1")
        );

        // Already closing: no second exit.
        assert!(book.on_mark("AAPL", dec!(110), 0.01).is_empty());
    }

    #[test]
    fn test_stop_loss_scales_with_atr() {
        let mut book = TradeBook::new();
        open_long(&mut book, dec!(100));

        // 1.0 ATR at 2% ATR: a 1.5% drop is inside the stop.
        assert!(book.on_mark("AAPL", dec!(98.5), 0.02).is_empty());

        let exits = book.on_mark("AAPL", dec!(97.9), 0.02);
        assert_eq!(exits[0].reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_time_stop_after_arm_minutes() {
        let mut book = TradeBook::new();
        open_long(&mut book, dec!(100));

        for _ in 0..599 {
            book.advance();
        }
        assert!(book.on_mark("AAPL", dec!(100), 0.01).is_empty());

        book.advance();
        let exits = book.on_mark("AAPL", dec!(100), 0.01);
        assert_eq!(exits[0].reason, ExitReason::TimeStop);
    }

    #[test]
    fn test_marks_for_other_symbols_are_ignored() {
        let mut book = TradeBook::new();
        open_long(&mut book, dec!(100));
        assert!(book.on_mark("MSFT", dec!(200), 0.01).is_empty());
    }

    #[test]
    fn test_short_trade_profits_when_price_falls() {
        let mut book = TradeBook::new();
        book.on_fill(&fill("PAPER-7", Side::Sell, dec!(100), arm().to_meta()));

        let exits = book.on_mark("AAPL", dec!(95), 0.01);
        assert_eq!(exits[0].reason, ExitReason::TakeProfit);
        assert_eq!(exits[0].request.side, Side::Buy);
    }

    #[test]
    fn test_exit_fill_closes_trade_with_realized_pnl() {
        let mut book = TradeBook::new();
        open_long(&mut book, dec!(100));
        for _ in 0..30 {
            book.advance();
        }
        let exit = book.on_mark("AAPL", dec!(106), 0.01).remove(0);

        let closed = book
            .on_fill(&fill("PAPER-2", Side::Sell, dec!(105.9), exit.request.meta))
            .unwrap();

        assert_eq!(closed.entry_id, OrderId::from("PAPER-1"));
        assert_eq!(closed.pnl, dec!(11.8));
        assert_eq!(closed.holding_secs, 30);
        assert_eq!(closed.arm, arm());
        assert_eq!(book.open_count(), 0);
        assert_eq!(book.closed().len(), 1);
    }

    #[test]
    fn test_reopen_allows_another_exit_attempt() {
        let mut book = TradeBook::new();
        open_long(&mut book, dec!(100));
        assert_eq!(book.on_mark("AAPL", dec!(106), 0.01).len(), 1);

        book.reopen(&OrderId::from("PAPER-1"));

        assert_eq!(book.on_mark("AAPL", dec!(106), 0.01).len(), 1);
    }

    #[test]
    fn test_exit_fill_for_unknown_trade_is_ignored() {
        let mut book = TradeBook::new();
        let mut meta = OrderMeta::new();
        meta.insert(EXIT_OF.to_string(), "PAPER-404".into());

        assert!(book
            .on_fill(&fill("PAPER-9", Side::Sell, dec!(100), meta))
            .is_none());
        assert!(book.closed().is_empty());
    }
}
