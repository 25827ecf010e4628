//! Integration tests running the router and decision loop against the paper venue.
//!
//! Covers:
//! - Fill accounting across many orders and symbols
//! - Position-limit enforcement under concurrent entries for both admission modes
//! - Decision loop end-to-end with fill feedback into the selector
//! - Subscriber lifetime and exits after fills

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use surge_trade_core::{
    Broker, BrokerError, EntryAdmission, Features, FillCallback, FillEvent, OrderAck, OrderId,
    OrderRequest, OrderStatus, PaperBrokerConfig, PositionSnapshot, RiskConfig, Side, TradeEvent,
};
use surge_trade_execution::{DecisionLoop, OrderRouter, RiskGate};
use surge_trade_paper::{PaperBroker, PaperQuoteFeed, ShutdownMode};
use surge_trade_strategy::{
    compute_reward, ArmParams, ContextualBandit, PolicyController, SurgeDetector, TradeOutcome,
};
use tokio::sync::{watch, Barrier};
use tokio::task::JoinHandle;

// =============================================================================
// Helper Functions
// =============================================================================

fn paper(seed: u64) -> (PaperBroker, Arc<PaperQuoteFeed>) {
    PaperBroker::with_feed(PaperBrokerConfig::default().with_seed(seed))
}

fn risk_gate(max_positions: u32) -> Arc<RiskGate> {
    Arc::new(RiskGate::new(RiskConfig {
        max_drawdown: dec!(500),
        max_concurrent_positions: max_positions,
    }))
}

fn arm() -> ArmParams {
    ArmParams {
        index: 0,
        tp: 0.04,
        sl_atr: 1.25,
        tstop_min: 20,
    }
}

fn surge(symbol: &str) -> TradeEvent {
    TradeEvent::trade(
        symbol,
        Features {
            ret_5s: 0.04,
            ret_15s: 0.03,
            vol_spike: 5.0,
        },
    )
}

/// Subscribes `on_fill` and waits until the venue has registered it.
async fn subscribe(
    broker: &PaperBroker,
    on_fill: impl Fn(&FillEvent) + Send + Sync + 'static,
) -> JoinHandle<()> {
    let before = broker.subscriber_count();
    let stream_broker = broker.clone();
    let callback: FillCallback = Arc::new(on_fill);
    let task = tokio::spawn(async move {
        let _ = stream_broker.stream_orders(callback).await;
    });
    while broker.subscriber_count() == before {
        tokio::task::yield_now().await;
    }
    task
}

fn collector() -> (Arc<Mutex<Vec<FillEvent>>>, impl Fn(&FillEvent) + Send + Sync + 'static) {
    let fills = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fills);
    (fills, move |event: &FillEvent| sink.lock().push(event.clone()))
}

/// Acknowledges orders only once every gated submission has arrived.
struct GatedBroker {
    gate: Barrier,
    placed: Mutex<u64>,
}

#[async_trait]
impl Broker for GatedBroker {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck, BrokerError> {
        self.gate.wait().await;
        let seq = {
            let mut placed = self.placed.lock();
            *placed += 1;
            *placed
        };
        Ok(OrderAck {
            order_id: OrderId(format!("GATED-{seq}")),
            status: OrderStatus::Accepted,
            meta: request.meta,
        })
    }

    async fn cancel(&self, _order_id: &OrderId) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError> {
        Ok(Vec::new())
    }

    async fn cash(&self) -> Result<Decimal, BrokerError> {
        Ok(Decimal::ZERO)
    }

    async fn stream_orders(&self, _on_event: FillCallback) -> Result<(), BrokerError> {
        Ok(())
    }
}

// =============================================================================
// Fill Accounting
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_fills_reconcile_with_positions_and_cash() {
    let (broker, feed) = paper(21);
    feed.update("AAPL", dec!(100), dec!(0.10));
    feed.update("MSFT", dec!(50), dec!(0.02));
    let (fills, on_fill) = collector();
    let stream = subscribe(&broker, on_fill).await;

    let orders = [
        ("AAPL", Side::Buy, dec!(3)),
        ("MSFT", Side::Buy, dec!(10)),
        ("AAPL", Side::Sell, dec!(1)),
        ("MSFT", Side::Sell, dec!(4)),
        ("AAPL", Side::Buy, dec!(2)),
        ("MSFT", Side::Sell, dec!(7)),
    ];
    for (i, (symbol, side, qty)) in orders.into_iter().enumerate() {
        broker
            .place_order(OrderRequest::market(symbol, side, qty))
            .await
            .unwrap();
        if i == 2 {
            // Later fills price off a moved market.
            feed.update("AAPL", dec!(101.5), dec!(0.10));
        }
    }

    broker.shutdown(ShutdownMode::Drain).await;
    stream.await.unwrap();

    let fills = fills.lock().clone();
    assert_eq!(fills.len(), orders.len());
    assert!(broker.open_orders().is_empty());

    let mut net: HashMap<String, Decimal> = HashMap::new();
    let mut spent = Decimal::ZERO;
    for fill in &fills {
        assert_eq!(fill.status, OrderStatus::Filled);
        *net.entry(fill.symbol.clone()).or_default() += fill.side.signed(fill.quantity);
        spent += fill.price * fill.side.signed(fill.quantity);
    }

    let positions = broker.positions().await.unwrap();
    assert_eq!(positions.len(), 2);
    for position in &positions {
        assert_eq!(net[&position.symbol], position.quantity);
    }
    assert_eq!(net["AAPL"], dec!(4));
    assert_eq!(net["MSFT"], dec!(-1));
    assert_eq!(broker.cash().await.unwrap(), dec!(100000) - spent);
}

#[tokio::test(start_paused = true)]
async fn test_exit_after_fill_releases_slot_without_touching_venue() {
    let (broker, _feed) = paper(5);
    let risk = risk_gate(3);
    let router = OrderRouter::new(
        Arc::new(broker.clone()),
        Arc::clone(&risk),
        EntryAdmission::Reserve,
    );
    let (fills, on_fill) = collector();
    let stream = subscribe(&broker, on_fill).await;

    let ack = router
        .submit_entry("AAPL", Side::Buy, dec!(1), &arm())
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    assert_eq!(fills.lock().len(), 1);
    let cash_after_fill = broker.cash().await.unwrap();

    router.submit_exit(&ack.order_id).await.unwrap();

    assert_eq!(risk.snapshot().positions, 0);
    assert_eq!(broker.cash().await.unwrap(), cash_after_fill);
    assert_eq!(broker.positions().await.unwrap()[0].quantity, dec!(1));

    broker.shutdown(ShutdownMode::Drain).await;
    stream.await.unwrap();
}

// =============================================================================
// Concurrent Admission
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reserve_admission_caps_concurrent_entries() {
    let (broker, _feed) = paper(8);
    let risk = risk_gate(3);
    let router = Arc::new(OrderRouter::new(
        Arc::new(broker.clone()),
        Arc::clone(&risk),
        EntryAdmission::Reserve,
    ));
    let start = Arc::new(Barrier::new(10));

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let router = Arc::clone(&router);
            let start = Arc::clone(&start);
            tokio::spawn(async move {
                start.wait().await;
                router
                    .submit_entry(&format!("SYM{i}"), Side::Buy, dec!(1), &arm())
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    for task in futures_util::future::join_all(tasks).await {
        if task.unwrap().unwrap().is_some() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 3);
    assert_eq!(risk.snapshot().positions, 3);
    broker.shutdown(ShutdownMode::Abort).await;
}

#[tokio::test]
async fn test_check_then_register_admits_past_limit_when_entries_overlap() {
    let broker = Arc::new(GatedBroker {
        gate: Barrier::new(5),
        placed: Mutex::new(0),
    });
    let risk = risk_gate(3);
    let router = Arc::new(OrderRouter::new(
        broker,
        Arc::clone(&risk),
        EntryAdmission::CheckThenRegister,
    ));

    // Every entry passes the check before any of them is counted.
    let tasks: Vec<_> = (0..5)
        .map(|i| {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                router
                    .submit_entry(&format!("SYM{i}"), Side::Buy, dec!(1), &arm())
                    .await
            })
        })
        .collect();

    let accepted = futures_util::future::join_all(tasks)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(Some(_)))))
        .count();

    assert_eq!(accepted, 5);
    assert_eq!(risk.snapshot().positions, 5);
    assert!(!risk.can_open_new());
}

// =============================================================================
// Decision Loop End-to-End
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_loop_fills_feed_rewards_back_to_selector() {
    let (broker, feed) = paper(13);
    let risk = risk_gate(3);
    let router = Arc::new(OrderRouter::new(
        Arc::new(broker.clone()),
        Arc::clone(&risk),
        EntryAdmission::Reserve,
    ));
    let bandit = Arc::new(ContextualBandit::with_seed(
        &[0.03, 0.05],
        &[1.0, 2.0],
        &[10],
        0.1,
        99,
    ));
    let policy = PolicyController::new(Arc::clone(&bandit));

    let feedback_policy = policy.clone();
    let feedback_risk = Arc::clone(&risk);
    let feedback_feed = Arc::clone(&feed);
    let (fills, on_fill) = collector();
    let stream = subscribe(&broker, move |fill: &FillEvent| {
        on_fill(fill);
        let mid = feedback_feed.get(&fill.symbol).price;
        let slippage = (fill.price - mid).abs() * fill.quantity;
        let reward = compute_reward(&TradeOutcome {
            slippage: slippage.to_f64().unwrap_or(0.0),
            ..TradeOutcome::default()
        });
        if let Some(index) = ArmParams::index_from_meta(&fill.meta) {
            feedback_policy.update_index(index, reward);
        }
        feedback_risk.register_fill(-slippage);
    })
    .await;

    let events = futures_util::stream::iter(
        ["AAPL", "MSFT", "NVDA", "AMD", "TSLA"].map(surge),
    );
    let (_stop_tx, stop) = watch::channel(false);
    let stats = DecisionLoop::new(
        events,
        Arc::clone(&router),
        policy,
        SurgeDetector::default(),
        dec!(2),
    )
    .run(stop)
    .await;

    assert_eq!(stats.orders_submitted, 3);
    assert_eq!(stats.risk_rejections, 2);

    broker.shutdown(ShutdownMode::Drain).await;
    stream.await.unwrap();

    let fills = fills.lock().clone();
    assert_eq!(fills.len(), 3);
    assert!(fills
        .iter()
        .all(|f| ArmParams::index_from_meta(&f.meta).is_some()));

    // Every arm starts from a prior of two trials; the three fills add one each.
    let arms = bandit.arms();
    let trials: f64 = arms.iter().map(|a| a.trials).sum();
    assert!((trials - arms.len() as f64 * 2.0 - 3.0).abs() < 1e-9);
    // Every market fill pays half the spread, so each reward is negative.
    assert!((bandit.epsilon() - 0.1 * 0.9_f64.powi(3)).abs() < 1e-9);
    assert_eq!(risk.snapshot().daily_loss, dec!(-0.15));
}

// =============================================================================
// Subscribers
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_aborted_subscriber_receives_nothing_further() {
    let (broker, _feed) = paper(2);
    let (kept, on_kept) = collector();
    let (dropped, on_dropped) = collector();
    let kept_stream = subscribe(&broker, on_kept).await;
    let dropped_stream = subscribe(&broker, on_dropped).await;

    broker
        .place_order(OrderRequest::market("AAPL", Side::Buy, dec!(1)))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    assert_eq!(kept.lock().len(), 1);
    assert_eq!(dropped.lock().len(), 1);

    dropped_stream.abort();
    let _ = dropped_stream.await;
    assert_eq!(broker.subscriber_count(), 1);

    broker
        .place_order(OrderRequest::market("AAPL", Side::Sell, dec!(1)))
        .await
        .unwrap();
    broker.shutdown(ShutdownMode::Drain).await;
    kept_stream.await.unwrap();

    assert_eq!(kept.lock().len(), 2);
    assert_eq!(dropped.lock().len(), 1);
}
