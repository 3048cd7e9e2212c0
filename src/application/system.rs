//! Wires Link → Correlator → MarketBook → StrategyEngine → Execution →
//! RiskGuardian into one runtime (spec.md's Design Notes: the engine talks to
//! Execution and RiskGuardian directly, but those two never talk back to the
//! engine except through the mailbox — breaking the naive three-way cycle).
//! Two-phase `build`/`start` bootstrap, grounded in the teacher's
//! `application::system::Application`.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{error, info, warn};

use crate::application::execution::{Execution, ExecutionEvent};
use crate::application::market_book::MarketBook;
use crate::application::risk_guardian::RiskGuardian;
use crate::application::strategy_engine::{EngineCommand, StrategyConfig, StrategyEngine};
use crate::config::Config;
use crate::domain::events::LoggingListener;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::ports::PersistenceSink;
use crate::infrastructure::correlator::{Correlator, DEFAULT_CALL_DEADLINE, EscalatedError, StreamKind};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::link::{BrokerLink, LinkState};
use crate::infrastructure::observability::{Metrics, MetricsReporter, RuntimeSnapshot};
use crate::infrastructure::persistence::InMemoryPersistenceSink;

const PRIMARY_TIMEFRAME: Timeframe = Timeframe::S60;
const CANDLE_HISTORY_COUNT: u32 = 300;

pub struct TradingSystem {
    link: Arc<BrokerLink>,
    correlator: Arc<Correlator>,
    execution: Arc<Execution>,
    symbol: String,
    snapshot: Arc<RwLock<RuntimeSnapshot>>,
    metrics: Metrics,
    metrics_interval_secs: u64,

    market_events_rx: Option<broadcast::Receiver<crate::application::market_book::MarketEvent>>,
    engine: Option<StrategyEngine>,
    engine_rx: Option<mpsc::Receiver<EngineCommand>>,
    engine_tx: mpsc::Sender<EngineCommand>,
}

impl TradingSystem {
    /// Constructs every component and registers the default logging listener.
    /// Nothing talks to the network yet — call `start` to bring the link up.
    pub async fn build(config: &Config) -> anyhow::Result<Self> {
        let link = BrokerLink::new(&config.broker.app_id, &config.broker.token);
        let correlator = Correlator::spawn(Arc::clone(&link));
        let execution = Execution::new(
            Arc::clone(&correlator),
            config.broker.symbol.clone(),
            config.broker.currency.clone(),
        );

        let persistence: Arc<dyn PersistenceSink> = Arc::new(InMemoryPersistenceSink::new());
        let event_bus = EventBus::new();
        event_bus.subscribe(Arc::new(LoggingListener)).await;

        let tick_rx = correlator.subscribe(StreamKind::Tick);
        let ohlc_rx = correlator.subscribe(StreamKind::Ohlc);
        let candles_rx = correlator.subscribe(StreamKind::Candles);
        let market_book = MarketBook::new(PRIMARY_TIMEFRAME);
        let (_market_handle, market_events_rx) = market_book.spawn(tick_rx, ohlc_rx, candles_rx);

        let risk = RiskGuardian::new(Decimal::ZERO, config.risk_guardian_config(), Arc::clone(&persistence));
        let (engine_tx, engine_rx) = mpsc::channel(512);
        let snapshot = Arc::new(RwLock::new(RuntimeSnapshot::default()));
        let engine = StrategyEngine::new(
            config.strategy_config(),
            Arc::clone(&execution),
            risk,
            persistence,
            event_bus,
            Arc::clone(&snapshot),
            Decimal::ZERO,
        );

        Ok(Self {
            link,
            correlator,
            execution,
            symbol: config.broker.symbol.clone(),
            snapshot,
            metrics: Metrics::new()?,
            metrics_interval_secs: config.metrics_interval_secs,
            market_events_rx: Some(market_events_rx),
            engine: Some(engine),
            engine_rx: Some(engine_rx),
            engine_tx,
        })
    }

    /// Brings the link up and spawns every forwarding/observer task. Returns
    /// once everything is running; the runtime then lives in its spawned
    /// tasks until the process exits.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        Arc::clone(&self.link).start();

        self.execution.spawn_balance_listener();
        self.execution.spawn_contract_update_listener();

        spawn_resubscribe_loop(
            Arc::clone(&self.link),
            Arc::clone(&self.correlator),
            self.symbol.clone(),
        );
        spawn_link_state_watcher(
            self.link.subscribe_state(),
            self.metrics.clone(),
            Arc::clone(&self.snapshot),
        );

        let market_events_rx = self
            .market_events_rx
            .take()
            .expect("start called more than once");
        spawn_market_forwarder(market_events_rx, self.engine_tx.clone());

        let execution_events_rx = self.execution.subscribe();
        spawn_execution_forwarder(
            execution_events_rx,
            self.engine_tx.clone(),
            Arc::clone(&self.snapshot),
            self.metrics.clone(),
        );

        let escalations_rx = self.correlator.subscribe_escalations();
        spawn_escalation_forwarder(escalations_rx, self.engine_tx.clone());

        let engine = self.engine.take().expect("start called more than once");
        let engine_rx = self.engine_rx.take().expect("start called more than once");
        tokio::spawn(engine.run(engine_rx));

        let reporter = MetricsReporter::new(
            Arc::clone(&self.snapshot),
            self.metrics.clone(),
            self.metrics_interval_secs,
        );
        tokio::spawn(reporter.run());

        info!("trading system started");
        Ok(())
    }
}

/// Re-issues the tick/candle/balance subscriptions every time the link
/// transitions into `Authorized` (spec.md §4.3/§4.5: subscriptions are
/// re-requested on every reconnect since the broker doesn't remember them).
fn spawn_resubscribe_loop(link: Arc<BrokerLink>, correlator: Arc<Correlator>, symbol: String) {
    tokio::spawn(async move {
        let mut state_changes = link.subscribe_state();
        loop {
            if state_changes.changed().await.is_err() {
                return;
            }
            if *state_changes.borrow() != LinkState::Authorized {
                continue;
            }
            for timeframe in Timeframe::all() {
                let request = serde_json::json!({
                    "ticks_history": symbol,
                    "style": "candles",
                    "granularity": timeframe.seconds(),
                    "count": CANDLE_HISTORY_COUNT,
                    "subscribe": 1,
                });
                if let Err(e) = correlator.call(request, DEFAULT_CALL_DEADLINE).await {
                    warn!(?timeframe, error = %e, "candle history subscribe failed");
                }
            }
            let ticks_request = serde_json::json!({"ticks": symbol, "subscribe": 1});
            if let Err(e) = correlator.call(ticks_request, DEFAULT_CALL_DEADLINE).await {
                warn!(error = %e, "tick subscribe failed");
            }
            let balance_request = serde_json::json!({"balance": 1, "subscribe": 1});
            if let Err(e) = correlator.call(balance_request, DEFAULT_CALL_DEADLINE).await {
                warn!(error = %e, "balance resubscribe failed");
            }
        }
    });
}

/// `LinkState::Fatal` means the token was rejected — unrecoverable, exit
/// fatally (spec.md §7) rather than spin forever with a dead link.
fn spawn_link_state_watcher(
    mut state_changes: tokio::sync::watch::Receiver<LinkState>,
    metrics: Metrics,
    snapshot: Arc<RwLock<RuntimeSnapshot>>,
) {
    tokio::spawn(async move {
        let mut previous = state_changes.borrow().clone();
        loop {
            let state = state_changes.borrow_and_update().clone();
            metrics.link_state.set(match state {
                LinkState::Down => 0.0,
                LinkState::Connecting => 1.0,
                LinkState::Authorized => 2.0,
                LinkState::Fatal => 3.0,
            });
            if state == LinkState::Authorized && previous != LinkState::Authorized {
                metrics.inc_reconnects("authorized");
            } else if state == LinkState::Down && previous == LinkState::Authorized {
                metrics.inc_reconnects("dropped");
            }
            previous = state.clone();
            snapshot.write().await.link_authorized = state == LinkState::Authorized;
            if state == LinkState::Fatal {
                error!("link entered a fatal state, terminating process");
                std::process::exit(1);
            }
            if state_changes.changed().await.is_err() {
                return;
            }
        }
    });
}

fn spawn_market_forwarder(
    mut market_events_rx: broadcast::Receiver<crate::application::market_book::MarketEvent>,
    engine_tx: mpsc::Sender<EngineCommand>,
) {
    use crate::application::market_book::MarketEvent;
    tokio::spawn(async move {
        loop {
            match market_events_rx.recv().await {
                Ok(MarketEvent::Tick(tick)) => {
                    if engine_tx.send(EngineCommand::Tick(tick)).await.is_err() {
                        return;
                    }
                }
                Ok(MarketEvent::IndicatorsUpdated(set)) => {
                    if engine_tx.send(EngineCommand::IndicatorsUpdated(set)).await.is_err() {
                        return;
                    }
                }
                Ok(MarketEvent::CandleClosed { .. }) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "engine mailbox forwarder dropped market events under load");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });
}

fn spawn_execution_forwarder(
    mut execution_events_rx: broadcast::Receiver<ExecutionEvent>,
    engine_tx: mpsc::Sender<EngineCommand>,
    snapshot: Arc<RwLock<RuntimeSnapshot>>,
    metrics: Metrics,
) {
    tokio::spawn(async move {
        loop {
            match execution_events_rx.recv().await {
                Ok(ExecutionEvent::TradeOpened {
                    contract_id,
                    entry_price,
                    contract_type,
                    ..
                }) => {
                    snapshot.write().await.open_trade_count = 1;
                    metrics.open_trades_count.set(1.0);
                    if engine_tx
                        .send(EngineCommand::TradeOpened {
                            contract_id,
                            entry_price,
                            contract_type,
                        })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(ExecutionEvent::TradeClosed {
                    contract_id,
                    exit_price,
                    profit,
                }) => {
                    snapshot.write().await.open_trade_count = 0;
                    metrics.open_trades_count.set(0.0);
                    metrics.inc_trades(if profit.is_sign_negative() { "loss" } else { "profit" });
                    if engine_tx
                        .send(EngineCommand::TradeClosed {
                            contract_id,
                            exit_price,
                            profit,
                        })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(ExecutionEvent::BalanceUpdate(balance)) => {
                    snapshot.write().await.account_balance = balance;
                    if engine_tx.send(EngineCommand::BalanceUpdate(balance)).await.is_err() {
                        return;
                    }
                }
                Ok(ExecutionEvent::RateLimit) => {
                    if engine_tx.send(EngineCommand::EscalatedRateLimit).await.is_err() {
                        return;
                    }
                }
                Ok(ExecutionEvent::BuyLimitReached) => {
                    if engine_tx.send(EngineCommand::EscalatedBuyLimitReached).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "engine mailbox forwarder dropped execution events under load");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });
}

fn spawn_escalation_forwarder(
    mut escalations_rx: broadcast::Receiver<EscalatedError>,
    engine_tx: mpsc::Sender<EngineCommand>,
) {
    tokio::spawn(async move {
        loop {
            match escalations_rx.recv().await {
                Ok(EscalatedError::RateLimit) => {
                    if engine_tx.send(EngineCommand::EscalatedRateLimit).await.is_err() {
                        return;
                    }
                }
                Ok(EscalatedError::BuyLimitReached) => {
                    if engine_tx.send(EngineCommand::EscalatedBuyLimitReached).await.is_err() {
                        return;
                    }
                }
                // InvalidToken is already fatal at the link layer.
                Ok(EscalatedError::InvalidToken) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    });
}
