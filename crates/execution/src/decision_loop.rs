//! Strategy loop wiring surge signals, bandit decisions and order routing.
//!
//! One decision per trade event, processed until the entry is acknowledged
//! before the next event is read. The loop exits when its stop signal
//! fires or the event stream ends.

use crate::router::OrderRouter;
use futures_util::{Stream, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use surge_trade_core::{EventKind, Side, TradeEvent};
use surge_trade_strategy::{PolicyController, SurgeDetector};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    pub events_seen: u64,
    pub signals: u64,
    pub orders_submitted: u64,
    pub risk_rejections: u64,
    pub broker_errors: u64,
}

/// Everything the loop needs per event except the stream itself.
struct Decider {
    router: Arc<OrderRouter>,
    policy: PolicyController,
    detector: SurgeDetector,
    side: Side,
    quantity: Decimal,
}

pub struct DecisionLoop<S> {
    events: S,
    decider: Decider,
}

impl<S> DecisionLoop<S>
where
    S: Stream<Item = TradeEvent> + Send + Unpin + 'static,
{
    #[must_use]
    pub fn new(
        events: S,
        router: Arc<OrderRouter>,
        policy: PolicyController,
        detector: SurgeDetector,
        quantity: Decimal,
    ) -> Self {
        Self {
            events,
            decider: Decider {
                router,
                policy,
                detector,
                side: Side::Buy,
                quantity,
            },
        }
    }

    /// Overrides the entry side (buy by default).
    #[must_use]
    pub fn with_side(mut self, side: Side) -> Self {
        self.decider.side = side;
        self
    }

    /// Spawns the loop onto the runtime and returns its stop handle.
    #[must_use]
    pub fn spawn(self) -> DecisionLoopHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        DecisionLoopHandle { stop_tx, task }
    }

    /// Runs until `stop` turns true (or its sender is dropped) or the stream ends.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> LoopStats {
        let mut stats = LoopStats::default();
        tracing::info!("decision loop started");

        loop {
            if *stop.borrow() {
                break;
            }

            let event = tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                next = self.events.next() => match next {
                    Some(event) => event,
                    None => {
                        tracing::info!("event stream ended");
                        break;
                    }
                },
            };

            stats.events_seen += 1;
            self.decider.handle_event(&event, &mut stats).await;
        }

        tracing::info!(?stats, "decision loop stopped");
        stats
    }
}

impl Decider {
    async fn handle_event(&self, event: &TradeEvent, stats: &mut LoopStats) {
        if event.kind != EventKind::Trade {
            return;
        }

        let signal = self.detector.score(&event.symbol, &event.features);
        if !self.detector.is_entry(&signal) {
            return;
        }
        stats.signals += 1;

        let Some(decision) = self.policy.choose() else {
            tracing::warn!("no arms configured, skipping entry");
            return;
        };

        match self
            .router
            .submit_entry(&signal.symbol, self.side, self.quantity, &decision.arm)
            .await
        {
            Ok(Some(ack)) => {
                stats.orders_submitted += 1;
                tracing::info!(
                    order_id = %ack.order_id,
                    symbol = %signal.symbol,
                    score = signal.score,
                    "submitted order"
                );
            }
            Ok(None) => stats.risk_rejections += 1,
            Err(e) => {
                stats.broker_errors += 1;
                tracing::warn!(symbol = %signal.symbol, error = %e, "entry submission failed");
            }
        }
    }
}

/// Owner of a spawned decision loop.
///
/// Dropping the handle also stops the loop.
#[derive(Debug)]
pub struct DecisionLoopHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<LoopStats>,
}

impl DecisionLoopHandle {
    /// Signals the loop and waits for its task to finish.
    ///
    /// An event already being processed completes first; no further event is
    /// read. The loop task is not running once this returns.
    pub async fn stop(self) -> LoopStats {
        self.stop_tx.send_replace(true);
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "decision loop task failed");
                LoopStats::default()
            }
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
