//! Single-mailbox trading state machine (spec.md §4.6). Owns every mutable
//! decision variable — `current_price`, the SMA snapshots, `market_state`,
//! the one allowed open trade, the crossover cooldown — and processes
//! `EngineCommand`s strictly one at a time, matching the at-most-one-trade
//! invariant spec.md §5 requires. Grounded in the teacher's
//! `application::strategy::StrategyEngine` mailbox loop, generalized from its
//! multi-symbol order-book-driven signals to this spec's SMA/train-detector
//! state machine.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{RwLock, mpsc};
use tracing::{error, info, warn};

use crate::application::execution::Execution;
use crate::application::risk_guardian::RiskGuardian;
use crate::domain::errors::ExecutionError;
use crate::domain::events::TradingEvent;
use crate::domain::market::indicators::IndicatorSet;
use crate::domain::market::market_state::MarketState;
use crate::domain::ports::PersistenceSink;
use crate::domain::types::{ContractType, Tick, TriggerReason};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::observability::RuntimeSnapshot;

/// Tick-distance take-profit/stop-loss thresholds (spec.md §4.6 item 3).
/// Distinct from the broker-side `limit_order` sent with the proposal, which
/// is best-effort only — these are the authority that actually closes trades.
const TAKE_PROFIT_POINTS: Decimal = Decimal::from_parts(15, 0, 0, false, 0);
const STOP_LOSS_POINTS: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub symbol: String,
    pub stake_amount: Decimal,
    pub multiplier: Decimal,
    pub take_profit_multiplier: Decimal,
    pub stop_loss_multiplier: Decimal,
    pub spike_delta: Decimal,
    pub crossover_cooldown_minutes: i64,
}

#[derive(Debug, Clone)]
pub enum EngineCommand {
    Tick(Tick),
    IndicatorsUpdated(IndicatorSet),
    TradeOpened {
        contract_id: String,
        entry_price: Decimal,
        contract_type: ContractType,
    },
    TradeClosed {
        contract_id: String,
        exit_price: Decimal,
        profit: Decimal,
    },
    BalanceUpdate(Decimal),
    EscalatedRateLimit,
    EscalatedBuyLimitReached,
}

#[derive(Debug, Clone, Copy)]
struct ActiveTrade {
    contract_id_is_open: bool,
    entry_price: Decimal,
    contract_type: ContractType,
}

pub struct StrategyEngine {
    config: StrategyConfig,
    execution: Arc<Execution>,
    risk: RiskGuardian,
    persistence: Arc<dyn PersistenceSink>,
    event_bus: EventBus,
    /// Shared with `application::system`'s `MetricsReporter` — the engine is
    /// the sole owner of `RiskGuardian`, so it's the natural place to keep
    /// the risk-derived fields of the snapshot current.
    snapshot: Arc<RwLock<RuntimeSnapshot>>,

    current_price: Option<Decimal>,
    previous_price: Option<Decimal>,
    smas: IndicatorSet,
    market_state: MarketState,
    active_trade_id: Option<String>,
    active_trade: Option<ActiveTrade>,
    /// True from the moment a sell request is issued until `TradeClosed`
    /// lands, so a single tick's TP/SL check and RESTRICTED-state check
    /// can't both fire a sell for the same contract.
    sell_in_flight: bool,
    is_trading: bool,
    account_balance: Decimal,
    cooldown_until: i64,
}

impl StrategyEngine {
    pub fn new(
        config: StrategyConfig,
        execution: Arc<Execution>,
        risk: RiskGuardian,
        persistence: Arc<dyn PersistenceSink>,
        event_bus: EventBus,
        snapshot: Arc<RwLock<RuntimeSnapshot>>,
        starting_balance: Decimal,
    ) -> Self {
        Self {
            config,
            execution,
            risk,
            persistence,
            event_bus,
            snapshot,
            current_price: None,
            previous_price: None,
            smas: IndicatorSet::default(),
            market_state: MarketState::Restricted,
            active_trade_id: None,
            active_trade: None,
            sell_in_flight: false,
            is_trading: false,
            account_balance: starting_balance,
            cooldown_until: 0,
        }
    }

    /// Consumes `self` into the task that owns the mailbox for the runtime's
    /// lifetime. Commands are processed strictly in arrival order.
    pub async fn run(mut self, mut mailbox: mpsc::Receiver<EngineCommand>) {
        while let Some(command) = mailbox.recv().await {
            match command {
                EngineCommand::Tick(tick) => self.on_tick(tick).await,
                EngineCommand::IndicatorsUpdated(smas) => self.on_indicators_updated(smas).await,
                EngineCommand::TradeOpened {
                    contract_id,
                    entry_price,
                    contract_type,
                } => {
                    self.on_trade_opened(contract_id, entry_price, contract_type)
                        .await
                }
                EngineCommand::TradeClosed {
                    contract_id,
                    exit_price,
                    profit,
                } => self.on_trade_closed(contract_id, exit_price, profit).await,
                EngineCommand::BalanceUpdate(balance) => self.on_balance_update(balance).await,
                EngineCommand::EscalatedRateLimit => self.on_rate_limit(),
                EngineCommand::EscalatedBuyLimitReached => self.on_buy_limit_reached(),
            }
        }
        warn!("strategy engine mailbox closed, stopping");
    }

    /// spec.md §4.6 steps 1-8, executed in order for every tick.
    async fn on_tick(&mut self, tick: Tick) {
        self.previous_price = self.current_price;
        self.current_price = Some(tick.price);
        let now = Utc::now().timestamp();

        self.risk.roll_day_if_needed(now);

        // 1. train detector takes priority over everything else this tick.
        if self.risk.observe_tick(tick.price, now) {
            self.refresh_risk_snapshot(now).await;
            self.force_close_active_trade(TriggerReason::TrainDetected).await;
            return;
        }
        self.refresh_risk_snapshot(now).await;

        // 2. TP/SL evaluation against the one open contract, if any.
        if let Some(trade) = self.active_trade
            && !self.sell_in_flight
            && let Some(reason) = evaluate_tp_sl(&trade, tick.price)
        {
            self.force_close_active_trade(reason).await;
        }

        // 3. previous_price undefined (first tick this session) — stop here.
        let Some(previous_price) = self.previous_price else {
            return;
        };

        // 4. recompute market_state from the live SMA snapshot.
        self.market_state = MarketState::compute(tick.price, &self.smas);

        // 5. cooldown gate (armed by the crossover guard or a rate limit).
        if now < self.cooldown_until {
            return;
        }

        // 6. PERMISSIVE spike entry.
        if self.market_state.is_permissive()
            && self.active_trade_id.is_none()
            && !self.is_trading
        {
            let delta = tick.price - previous_price;
            if delta > self.config.spike_delta {
                // Re-check market_state after the tick that produced the
                // spike — a spike that itself flips the market RESTRICTED
                // must not be entered on (spec.md §8 scenario 1).
                let post_tick_state = MarketState::compute(tick.price, &self.smas);
                if post_tick_state.is_permissive() {
                    self.try_open_trade(tick.price, now).await;
                }
            }
        }

        // 7. RESTRICTED with an open trade forces an exit.
        if !self.market_state.is_permissive()
            && self.active_trade_id.is_some()
            && !self.sell_in_flight
        {
            self.force_close_active_trade(TriggerReason::RestrictedState).await;
        }
    }

    /// spec.md §4.6 crossover guard: SMA25 crossing above SMA50 or SMA100
    /// closes every open trade and arms a cooldown.
    async fn on_indicators_updated(&mut self, new_smas: IndicatorSet) {
        let previous = self.smas;
        self.smas = new_smas;

        if crossed_above(previous.sma25, new_smas.sma25, previous.sma50, new_smas.sma50)
            || crossed_above(previous.sma25, new_smas.sma25, previous.sma100, new_smas.sma100)
        {
            info!("SMA25 crossed above SMA50/SMA100, closing open trades and arming cooldown");
            self.force_close_active_trade(TriggerReason::CrossoverGuard).await;
            let now = Utc::now().timestamp();
            self.cooldown_until = self
                .cooldown_until
                .max(now + self.config.crossover_cooldown_minutes * 60);
        }
    }

    async fn try_open_trade(&mut self, price: Decimal, now: i64) {
        self.is_trading = true;
        if let Err(refusal) = self.risk.permit_entry(now) {
            info!(%refusal, "entry refused by risk guardian");
            self.is_trading = false;
            return;
        }

        let sl_points = self.config.stop_loss_multiplier * STOP_LOSS_POINTS;
        let amount = self
            .risk
            .risk_sizing(self.account_balance, self.config.multiplier, sl_points);
        let limit_order = Some((
            amount * self.config.take_profit_multiplier,
            amount * self.config.stop_loss_multiplier,
        ));

        let _ = price; // entry price is read back from the buy confirmation.
        match self
            .execution
            .propose_and_buy(
                ContractType::MultDown,
                amount,
                self.config.multiplier,
                limit_order,
                TriggerReason::PermissiveSpike,
            )
            .await
        {
            Ok(_contract_id) => {
                // `TradeOpened` arrives back through the mailbox once
                // Execution's broadcast reaches the forwarder in
                // `application::system` — `is_trading` stays latched until
                // then so a second tick can't race a second entry.
            }
            Err(err) => {
                self.is_trading = false;
                self.handle_execution_error(err);
            }
        }
    }

    async fn force_close_active_trade(&mut self, reason: TriggerReason) {
        let Some(contract_id) = self.active_trade_id.clone() else {
            return;
        };
        if self.sell_in_flight {
            return;
        }
        self.sell_in_flight = true;
        info!(contract_id, ?reason, "closing active trade");
        if let Err(err) = self.execution.sell(&contract_id).await {
            warn!(contract_id, error = %err, "sell request failed");
            self.sell_in_flight = false;
            self.handle_execution_error(err);
        }
    }

    async fn on_trade_opened(&mut self, contract_id: String, entry_price: Decimal, contract_type: ContractType) {
        self.active_trade_id = Some(contract_id.clone());
        self.active_trade = Some(ActiveTrade {
            contract_id_is_open: true,
            entry_price,
            contract_type,
        });
        self.is_trading = false;

        if let Err(e) = self
            .persistence
            .record_entry(&contract_id, &self.config.symbol, entry_price, TriggerReason::PermissiveSpike)
            .await
        {
            warn!(error = %e, "failed to persist trade entry");
        }
        self.event_bus
            .publish(TradingEvent::TradeOpened {
                contract_id,
                symbol: self.config.symbol.clone(),
                entry_price,
                reason: TriggerReason::PermissiveSpike,
            })
            .await;
    }

    async fn on_trade_closed(&mut self, contract_id: String, exit_price: Decimal, profit: Decimal) {
        if self.active_trade_id.as_deref() != Some(contract_id.as_str()) {
            warn!(contract_id, "trade_closed for a contract that wasn't the tracked one");
        }
        self.active_trade_id = None;
        self.active_trade = None;
        self.sell_in_flight = false;

        self.risk.record_trade_exit(profit).await;
        self.refresh_risk_snapshot(Utc::now().timestamp()).await;
        if let Err(e) = self
            .persistence
            .record_exit(&contract_id, exit_price, profit, self.account_balance)
            .await
        {
            warn!(error = %e, "failed to persist trade exit");
        }
        self.event_bus
            .publish(TradingEvent::TradeClosed {
                contract_id,
                exit_price,
                profit,
                balance: self.account_balance,
            })
            .await;

        if self.risk.daily_cap_reached() {
            info!("daily profit cap reached, further entries are refused until UTC rollover");
        }
    }

    async fn on_balance_update(&mut self, balance: Decimal) {
        self.account_balance = balance;
        let now = Utc::now().timestamp();
        self.risk.observe_balance(balance, now);
        self.refresh_risk_snapshot(now).await;
        self.event_bus
            .publish(TradingEvent::BalanceChanged { balance })
            .await;
    }

    /// Copies the risk-derived fields `RiskGuardian` alone knows into the
    /// shared `RuntimeSnapshot` the `MetricsReporter` polls.
    async fn refresh_risk_snapshot(&self, now: i64) {
        let mut snapshot = self.snapshot.write().await;
        snapshot.killswitch_active = self.risk.killswitch_active(now);
        snapshot.daily_cap_reached = self.risk.daily_cap_reached();
        snapshot.daily_profit = self.risk.daily_profit();
        snapshot.trades_taken_today = self.risk.trades_taken_today();
    }

    /// Unsolicited escalation from the Correlator (spec.md §4.2) — no
    /// in-flight call to fail, so the cooldown is the only lever.
    fn on_rate_limit(&mut self) {
        let now = Utc::now().timestamp();
        self.cooldown_until = self.cooldown_until.max(now + 60);
        self.is_trading = false;
        warn!("broker rate limit escalated, cooldown armed");
    }

    fn on_buy_limit_reached(&mut self) {
        error!("buy_limit_reached escalated out of band, terminating");
        std::process::exit(1);
    }

    fn handle_execution_error(&mut self, err: ExecutionError) {
        match err {
            ExecutionError::RateLimit => self.on_rate_limit(),
            ExecutionError::BuyLimitReached => self.on_buy_limit_reached(),
            other => warn!(error = %other, "execution call failed"),
        }
    }
}

/// `prev_fast <= prev_slow` and `new_fast > new_slow`, with both pairs
/// defined. `None` on either side means "no crossover this update".
fn crossed_above(
    prev_fast: Option<Decimal>,
    new_fast: Option<Decimal>,
    prev_slow: Option<Decimal>,
    new_slow: Option<Decimal>,
) -> bool {
    match (prev_fast, new_fast, prev_slow, new_slow) {
        (Some(pf), Some(nf), Some(ps), Some(ns)) => pf <= ps && nf > ns,
        _ => false,
    }
}

fn evaluate_tp_sl(trade: &ActiveTrade, current_price: Decimal) -> Option<TriggerReason> {
    let _ = trade.contract_id_is_open;
    let favorable_move = if trade.contract_type.is_short() {
        trade.entry_price - current_price
    } else {
        current_price - trade.entry_price
    };
    if favorable_move >= TAKE_PROFIT_POINTS {
        Some(TriggerReason::TakeProfit)
    } else if favorable_move <= -STOP_LOSS_POINTS {
        Some(TriggerReason::StopLoss)
    } else {
        None
    }
}
