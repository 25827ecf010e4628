//! paper CLI command: a closed-loop session against the simulated venue.
//!
//! A seeded synthetic market drives both the venue's quotes and the decision
//! loop's event stream. Entry fills open trades whose exits follow the chosen
//! arm; each exit fill's realized P&L becomes the reward fed back into the
//! selector and the risk gate.

use anyhow::{Context, Result};
use clap::Args;
use futures_util::stream;
use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_trade_core::{
    AppConfig, Broker, BrokerKind, ConfigLoader, FillCallback, FillEvent, PositionSnapshot,
    TradeEvent,
};
use surge_trade_execution::{DecisionLoop, LoopStats, OrderRouter, RiskGate, RiskSnapshot};
use surge_trade_paper::{PaperBroker, PaperQuoteFeed, ShutdownMode};
use surge_trade_strategy::{
    compute_reward, evaluate, BanditArm, ContextualBandit, DriftDetector, EvaluationResult,
    PolicyController, SurgeDetector, TradeOutcome,
};
use tokio::sync::mpsc;

use crate::market::SyntheticMarket;
use crate::trade_book::{ExitOrder, TradeBook};

/// Arguments for the paper command.
#[derive(Args, Debug, Clone)]
pub struct PaperArgs {
    /// Config file path
    #[arg(short, long, default_value = "config/surge.toml")]
    pub config: PathBuf,

    /// Number of synthetic trade events to feed the decision loop
    #[arg(long, default_value = "2000")]
    pub events: usize,

    /// Seed for the synthetic market; also seeds the selector and venue
    #[arg(long)]
    pub seed: Option<u64>,

    /// Wall-clock milliseconds per simulated second
    #[arg(long, default_value = "5")]
    pub tick_ms: u64,

    /// Comma-separated symbols to simulate
    #[arg(long, value_delimiter = ',', default_value = "AAPL,MSFT,NVDA,TSLA")]
    pub symbols: Vec<String>,
}

/// Printed to stdout when the session ends.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub events_emitted: u64,
    pub simulated_secs: u64,
    pub loop_stats: LoopStats,
    pub fills: u64,
    pub exits_placed: u64,
    pub closed_trades: usize,
    pub open_trades: usize,
    pub risk: RiskSnapshot,
    pub positions: Vec<PositionSnapshot>,
    pub cash: Decimal,
    pub evaluation: EvaluationResult,
    pub epsilon: f64,
    pub top_arms: Vec<BanditArm>,
}

// =============================================================================
// Wiring
// =============================================================================

struct Venue {
    broker: PaperBroker,
    feed: Arc<PaperQuoteFeed>,
}

fn build_venue(config: &AppConfig) -> Venue {
    match config.execution.broker {
        BrokerKind::Paper => {
            let (broker, feed) = PaperBroker::with_feed(config.paper.clone());
            Venue { broker, feed }
        }
    }
}

/// Fill subscriber state: trade book, reward feedback and counters.
struct Feedback {
    book: Mutex<TradeBook>,
    drift: Mutex<DriftDetector>,
    policy: PolicyController,
    risk: Arc<RiskGate>,
    fills: AtomicU64,
}

impl Feedback {
    fn on_fill(&self, fill: &FillEvent) {
        self.fills.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            order_id = %fill.order_id,
            symbol = %fill.symbol,
            side = %fill.side,
            qty = %fill.quantity,
            price = %fill.price,
            "fill"
        );

        let Some(trade) = self.book.lock().on_fill(fill) else {
            return;
        };

        let reward = compute_reward(&TradeOutcome {
            realized: trade.pnl.to_f64().unwrap_or(0.0),
            holding_time_secs: trade.holding_secs as f64,
            ..TradeOutcome::default()
        });
        self.policy.update(&trade.arm, reward);
        self.risk.register_fill(trade.pnl);

        let drifted = {
            let mut drift = self.drift.lock();
            drift.update(reward).then(|| drift.mean())
        };
        if let Some(mean) = drifted {
            tracing::warn!(mean_reward = mean, "reward drift detected");
        }

        tracing::info!(
            entry_id = %trade.entry_id,
            symbol = %trade.symbol,
            arm = trade.arm.index,
            pnl = %trade.pnl,
            reward,
            "trade closed"
        );
    }
}

// =============================================================================
// Command
// =============================================================================

/// Runs a paper session and prints its summary as JSON.
pub async fn run_paper(args: PaperArgs) -> Result<()> {
    let mut config = ConfigLoader::load(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    if let Some(seed) = args.seed {
        config.strategy.random_seed = Some(seed);
        config.paper.random_seed = Some(seed.wrapping_add(1));
    }
    let market_seed = args.seed.unwrap_or_else(rand::random);

    tracing::info!(
        events = args.events,
        symbols = ?args.symbols,
        market_seed,
        admission = ?config.execution.entry_admission,
        "starting paper session"
    );

    let summary = run_session(&config, &args, market_seed).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_session(config: &AppConfig, args: &PaperArgs, market_seed: u64) -> Result<SessionSummary> {
    let venue = build_venue(config);
    let risk = Arc::new(RiskGate::new(config.risk.clone()));
    let router = Arc::new(OrderRouter::new(
        Arc::new(venue.broker.clone()),
        Arc::clone(&risk),
        config.execution.entry_admission,
    ));
    let bandit = Arc::new(ContextualBandit::from_config(&config.strategy));
    let policy = PolicyController::new(Arc::clone(&bandit));
    let feedback = Arc::new(Feedback {
        book: Mutex::new(TradeBook::new()),
        drift: Mutex::new(DriftDetector::default()),
        policy: policy.clone(),
        risk: Arc::clone(&risk),
        fills: AtomicU64::new(0),
    });

    let subscriber = {
        let broker = venue.broker.clone();
        let feedback = Arc::clone(&feedback);
        let callback: FillCallback = Arc::new(move |fill: &FillEvent| feedback.on_fill(fill));
        tokio::spawn(async move { broker.stream_orders(callback).await })
    };
    while venue.broker.subscriber_count() == 0 {
        tokio::task::yield_now().await;
    }

    let start_price = config
        .paper
        .default_price
        .to_f64()
        .context("paper.default_price is not representable as f64")?;
    let mut market = SyntheticMarket::new(
        &args.symbols,
        start_price,
        config.paper.default_spread,
        market_seed,
    )
    .context("invalid synthetic market parameters")?;

    let (tx, rx) = mpsc::channel::<TradeEvent>(1);
    let events = Box::pin(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    }));
    let handle = DecisionLoop::new(
        events,
        Arc::clone(&router),
        policy,
        SurgeDetector::from_config(&config.strategy),
        config.execution.entry_quantity,
    )
    .spawn();

    let mut driver = MarketDriver {
        market: &mut market,
        feed: &venue.feed,
        feedback: &feedback,
        router: &router,
        tick: Duration::from_millis(args.tick_ms),
        emitted: 0,
        exits: 0,
    };
    tokio::select! {
        () = driver.run(tx, args.events) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, stopping session early");
        }
    }
    let (emitted, exits_placed) = (driver.emitted, driver.exits);

    let loop_stats = handle.stop().await;
    venue.broker.shutdown(ShutdownMode::Drain).await;
    subscriber
        .await
        .context("fill subscriber task panicked")?
        .context("fill stream failed")?;

    let (closed, open_trades, simulated_secs) = {
        let book = feedback.book.lock();
        (book.closed().to_vec(), book.open_count(), book.clock())
    };
    let pnls: Vec<f64> = closed.iter().map(|t| t.pnl.to_f64().unwrap_or(0.0)).collect();
    let holds: Vec<f64> = closed.iter().map(|t| t.holding_secs as f64).collect();

    let mut top_arms = bandit.arms();
    top_arms.sort_by(|a, b| b.mean().total_cmp(&a.mean()));
    top_arms.truncate(5);

    Ok(SessionSummary {
        events_emitted: emitted,
        simulated_secs,
        loop_stats,
        fills: feedback.fills.load(Ordering::Relaxed),
        exits_placed,
        closed_trades: closed.len(),
        open_trades,
        risk: risk.snapshot(),
        positions: venue.broker.positions().await?,
        cash: venue.broker.cash().await?,
        evaluation: evaluate(&pnls, &holds),
        epsilon: bandit.epsilon(),
        top_arms,
    })
}

// =============================================================================
// Market Driver
// =============================================================================

/// Steps the synthetic market: quotes first, then exits, then the event.
struct MarketDriver<'a> {
    market: &'a mut SyntheticMarket,
    feed: &'a PaperQuoteFeed,
    feedback: &'a Feedback,
    router: &'a OrderRouter,
    tick: Duration,
    emitted: u64,
    exits: u64,
}

impl MarketDriver<'_> {
    async fn run(&mut self, tx: mpsc::Sender<TradeEvent>, events: usize) {
        let target = events as u64;
        while self.emitted < target {
            let ticks = self.market.step();
            if ticks.is_empty() {
                break;
            }
            self.feedback.book.lock().advance();

            for tick in ticks {
                self.feed.update(&tick.event.symbol, tick.price, tick.spread);
                let exits = self
                    .feedback
                    .book
                    .lock()
                    .on_mark(&tick.event.symbol, tick.price, tick.atr_frac);
                for exit in exits {
                    self.close_trade(exit).await;
                }

                if tx.send(tick.event).await.is_err() {
                    tracing::warn!("decision loop is gone, ending market");
                    return;
                }
                self.emitted += 1;
                if self.emitted >= target {
                    break;
                }
            }

            tokio::time::sleep(self.tick).await;
        }
        tracing::info!(events = self.emitted, "synthetic market finished");
    }

    async fn close_trade(&mut self, exit: ExitOrder) {
        if let Err(e) = self.router.submit_exit(&exit.entry_id).await {
            tracing::warn!(entry_id = %exit.entry_id, error = %e, "exit cancel failed");
        }
        match self.router.broker().place_order(exit.request).await {
            Ok(ack) => {
                self.exits += 1;
                tracing::info!(
                    entry_id = %exit.entry_id,
                    order_id = %ack.order_id,
                    reason = ?exit.reason,
                    "exit placed"
                );
            }
            Err(e) => {
                self.feedback.book.lock().reopen(&exit.entry_id);
                tracing::warn!(entry_id = %exit.entry_id, error = %e, "exit order rejected");
            }
        }
    }
}
