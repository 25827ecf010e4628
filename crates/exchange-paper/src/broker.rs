//! Simulated matching venue.
//!
//! `place_order` acknowledges immediately and schedules one fill task per
//! order after a uniform random delay. Every order eventually fills in full
//! unless it is canceled first; there are no rejections or partial fills.
//!
//! # Locking
//!
//! Order table, positions and cash share one lock. Fill-task handles and
//! subscribers each have their own. No two of these are ever held at the same
//! time, and none is held across an `.await` or while subscribers run.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_trade_core::{
    Broker, BrokerError, FillCallback, FillEvent, Order, OrderAck, OrderId, OrderRequest,
    OrderStatus, OrderType, PaperBrokerConfig, PositionSnapshot, Quote, QuoteSource, Side,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::quote_feed::PaperQuoteFeed;

// =============================================================================
// Shutdown
// =============================================================================

/// What `shutdown` does with fill tasks still waiting on their delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Let every pending fill complete and dispatch.
    Drain,
    /// Abort pending fills and discard their orders.
    Abort,
}

// =============================================================================
// Internal State
// =============================================================================

#[derive(Debug)]
struct PaperState {
    orders: HashMap<OrderId, Order>,
    positions: HashMap<String, PositionSnapshot>,
    cash: Decimal,
}

impl PaperState {
    fn new(initial_cash: Decimal) -> Self {
        Self {
            orders: HashMap::new(),
            positions: HashMap::new(),
            cash: initial_cash,
        }
    }

    /// Applies a fill: signed position change, average price overwritten by
    /// the fill price, cash moved by `price * signed qty`.
    fn apply_fill(&mut self, order: &Order, price: Decimal) {
        let signed = order.side.signed(order.quantity);
        let position = self
            .positions
            .entry(order.symbol.clone())
            .or_insert_with(|| PositionSnapshot {
                symbol: order.symbol.clone(),
                quantity: Decimal::ZERO,
                avg_price: Decimal::ZERO,
            });
        position.quantity += signed;
        position.avg_price = price;
        self.cash -= price * signed;
    }
}

struct Shared {
    config: PaperBrokerConfig,
    quotes: Arc<dyn QuoteSource>,
    state: Mutex<PaperState>,
    fill_tasks: Mutex<HashMap<OrderId, JoinHandle<()>>>,
    subscribers: Mutex<BTreeMap<u64, FillCallback>>,
    next_order_id: AtomicU64,
    next_subscriber_id: AtomicU64,
    rng: Mutex<StdRng>,
    accepting: AtomicBool,
    closed: watch::Sender<bool>,
}

impl Shared {
    fn fill_delay(&self) -> Duration {
        let (lo, hi) = (self.config.min_fill_delay_ms, self.config.max_fill_delay_ms);
        let ms = if lo >= hi {
            lo
        } else {
            self.rng.lock().gen_range(lo..=hi)
        };
        Duration::from_millis(ms)
    }

    fn dispatch(&self, event: &FillEvent) {
        let callbacks: Vec<FillCallback> = self.subscribers.lock().values().cloned().collect();
        for callback in callbacks {
            callback(event);
        }
    }
}

/// Drops the subscriber when `stream_orders` returns or its future is dropped.
struct Subscription {
    shared: Arc<Shared>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shared.subscribers.lock().remove(&self.id);
        tracing::debug!(subscriber = self.id, "fill subscriber removed");
    }
}

/// Fill price for `order` against `quote`.
///
/// Market orders (or limit orders without a price) cross half the spread.
/// Limit orders fill at the better of the limit and the last price.
#[must_use]
pub fn fill_price(order: &Order, quote: Quote) -> Decimal {
    match (order.order_type, order.limit_price) {
        (OrderType::Limit, Some(limit)) => match order.side {
            Side::Buy => limit.min(quote.price),
            Side::Sell => limit.max(quote.price),
        },
        _ => {
            let half_spread = quote.spread / Decimal::TWO;
            match order.side {
                Side::Buy => quote.price + half_spread,
                Side::Sell => quote.price - half_spread,
            }
        }
    }
}

async fn run_fill(shared: Arc<Shared>, order_id: OrderId, delay: Duration) {
    tokio::time::sleep(delay).await;

    let symbol = shared
        .state
        .lock()
        .orders
        .get(&order_id)
        .map(|order| order.symbol.clone());
    let Some(symbol) = symbol else {
        shared.fill_tasks.lock().remove(&order_id);
        return;
    };
    let quote = shared.quotes.quote(&symbol).await;

    let event = {
        let mut state = shared.state.lock();
        // Canceled while the quote was being read.
        let Some(mut order) = state.orders.remove(&order_id) else {
            drop(state);
            shared.fill_tasks.lock().remove(&order_id);
            return;
        };
        let price = fill_price(&order, quote);
        order.remaining = Decimal::ZERO;
        state.apply_fill(&order, price);

        FillEvent {
            order_id: order.id,
            symbol: order.symbol,
            side: order.side,
            quantity: order.quantity,
            price,
            status: OrderStatus::Filled,
            timestamp: Utc::now(),
            meta: order.meta,
        }
    };
    shared.fill_tasks.lock().remove(&order_id);

    tracing::debug!(
        order_id = %event.order_id,
        symbol = %event.symbol,
        side = %event.side,
        qty = %event.quantity,
        price = %event.price,
        "paper order filled"
    );
    shared.dispatch(&event);
}

// =============================================================================
// Paper Broker
// =============================================================================

/// In-memory broker implementing optimistic, always-fill matching.
///
/// Cheap to clone; clones share the same venue.
#[derive(Clone)]
pub struct PaperBroker {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for PaperBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperBroker")
            .field("config", &self.shared.config)
            .field("state", &self.shared.state)
            .finish_non_exhaustive()
    }
}

impl PaperBroker {
    #[must_use]
    pub fn new(config: PaperBrokerConfig, quotes: Arc<dyn QuoteSource>) -> Self {
        let rng = config
            .random_seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let (closed, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PaperState::new(config.initial_cash)),
                fill_tasks: Mutex::new(HashMap::new()),
                subscribers: Mutex::new(BTreeMap::new()),
                next_order_id: AtomicU64::new(0),
                next_subscriber_id: AtomicU64::new(0),
                rng: Mutex::new(rng),
                accepting: AtomicBool::new(true),
                closed,
                quotes,
                config,
            }),
        }
    }

    /// Creates a broker with its own quote feed, returning both.
    #[must_use]
    pub fn with_feed(config: PaperBrokerConfig) -> (Self, Arc<PaperQuoteFeed>) {
        let feed = Arc::new(PaperQuoteFeed::from_config(&config));
        let broker = Self::new(config, Arc::clone(&feed) as Arc<dyn QuoteSource>);
        (broker, feed)
    }

    #[must_use]
    pub fn config(&self) -> &PaperBrokerConfig {
        &self.shared.config
    }

    /// Orders accepted but not yet filled or canceled.
    #[must_use]
    pub fn open_orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.shared.state.lock().orders.values().cloned().collect();
        orders.sort_by_key(|order| order.created_at);
        orders
    }

    /// Number of fill tasks still outstanding.
    #[must_use]
    pub fn pending_fills(&self) -> usize {
        self.shared.fill_tasks.lock().len()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().len()
    }

    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    /// Schedules the fill task for an order already in the open-order table.
    ///
    /// Acceptance is re-checked under the fill-task lock, so an order racing
    /// `shutdown` is either drained by it or withdrawn here with `Closed`.
    fn spawn_fill(&self, order_id: &OrderId) -> Result<Duration, BrokerError> {
        let delay = self.shared.fill_delay();
        let spawned = {
            // Held across the spawn so the task cannot deregister before it is registered.
            let mut tasks = self.shared.fill_tasks.lock();
            if self.is_accepting() {
                let handle = tokio::spawn(run_fill(
                    Arc::clone(&self.shared),
                    order_id.clone(),
                    delay,
                ));
                tasks.insert(order_id.clone(), handle);
                true
            } else {
                false
            }
        };

        if spawned {
            Ok(delay)
        } else {
            self.shared.state.lock().orders.remove(order_id);
            tracing::debug!(order_id = %order_id, "paper order withdrawn during shutdown");
            Err(BrokerError::Closed)
        }
    }

    /// Stops accepting orders, settles outstanding fill tasks per `mode`, then
    /// releases every `stream_orders` call.
    pub async fn shutdown(&self, mode: ShutdownMode) {
        self.shared.accepting.store(false, Ordering::SeqCst);

        loop {
            let handles: Vec<(OrderId, JoinHandle<()>)> =
                self.shared.fill_tasks.lock().drain().collect();
            if handles.is_empty() {
                break;
            }
            for (order_id, handle) in handles {
                if mode == ShutdownMode::Abort {
                    handle.abort();
                }
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        tracing::warn!(order_id = %order_id, error = %e, "fill task failed");
                    }
                }
            }
        }

        if mode == ShutdownMode::Abort {
            let abandoned = {
                let mut state = self.shared.state.lock();
                let count = state.orders.len();
                state.orders.clear();
                count
            };
            if abandoned > 0 {
                tracing::info!(abandoned, "paper broker discarded unfilled orders");
            }
        }

        self.shared.closed.send_replace(true);
        tracing::info!(?mode, "paper broker shut down");
    }
}

// =============================================================================
// Trait Implementation
// =============================================================================

#[async_trait]
impl Broker for PaperBroker {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck, BrokerError> {
        if !self.is_accepting() {
            return Err(BrokerError::Closed);
        }
        if request.quantity <= Decimal::ZERO {
            return Err(BrokerError::InvalidOrder(format!(
                "quantity must be positive, got {}",
                request.quantity
            )));
        }

        let seq = self.shared.next_order_id.fetch_add(1, Ordering::SeqCst) + 1;
        let order_id = OrderId(format!("PAPER-{seq}"));
        let order = Order::from_request(order_id.clone(), request, Utc::now());
        let meta = order.meta.clone();

        self.shared
            .state
            .lock()
            .orders
            .insert(order_id.clone(), order);

        let delay = self.spawn_fill(&order_id)?;

        tracing::debug!(
            order_id = %order_id,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "paper order accepted"
        );
        Ok(OrderAck {
            order_id,
            status: OrderStatus::Accepted,
            meta,
        })
    }

    async fn cancel(&self, order_id: &OrderId) -> Result<(), BrokerError> {
        let removed = self.shared.state.lock().orders.remove(order_id);
        if removed.is_some() {
            if let Some(handle) = self.shared.fill_tasks.lock().remove(order_id) {
                handle.abort();
            }
            tracing::debug!(order_id = %order_id, "paper order canceled");
        }
        Ok(())
    }

    async fn positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError> {
        let mut positions: Vec<PositionSnapshot> =
            self.shared.state.lock().positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    async fn cash(&self) -> Result<Decimal, BrokerError> {
        Ok(self.shared.state.lock().cash)
    }

    async fn stream_orders(&self, on_event: FillCallback) -> Result<(), BrokerError> {
        let id = self.shared.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.shared.subscribers.lock().insert(id, on_event);
        let _subscription = Subscription {
            shared: Arc::clone(&self.shared),
            id,
        };
        tracing::debug!(subscriber = id, "fill subscriber registered");

        let mut closed = self.shared.closed.subscribe();
        // Err only if the sender is gone, which cannot outlive `self`.
        let _ = closed.wait_for(|closed| *closed).await;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
