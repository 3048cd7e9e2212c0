//! Proposal→buy two-phase flow, sell, balance subscription, open-contract
//! tracking (spec.md §4.5). Grounded in the teacher's
//! `BinanceExecutionService`'s `ExecutionService` shape — `execute`,
//! `get_portfolio`, an order-update broadcast — re-targeted at Deriv's
//! `proposal`/`buy`/`sell`/`balance` verbs instead of Binance's signed REST
//! calls. Open-contract tracking guards its map the same way the teacher
//! guards its in-memory portfolio (`Arc<RwLock<_>>`).

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::sync::{RwLock, broadcast};
use tracing::{info, warn};

use crate::domain::errors::ExecutionError;
use crate::domain::types::{ContractType, TriggerReason};
use crate::infrastructure::correlator::{Correlator, DEFAULT_CALL_DEADLINE, StreamKind};

const EVENT_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy)]
pub struct OpenContract {
    pub buy_price: Decimal,
    pub start_time: i64,
}

#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    TradeOpened {
        contract_id: String,
        symbol: String,
        entry_price: Decimal,
        contract_type: ContractType,
        trigger_reason: TriggerReason,
    },
    TradeClosed {
        contract_id: String,
        exit_price: Decimal,
        profit: Decimal,
    },
    BalanceUpdate(Decimal),
    RateLimit,
    /// Fatal per spec.md §4.5 / §7 — the caller terminates the process.
    BuyLimitReached,
}

pub struct Execution {
    correlator: Arc<Correlator>,
    symbol: String,
    currency: String,
    open_contracts: RwLock<HashMap<String, OpenContract>>,
    events_tx: broadcast::Sender<ExecutionEvent>,
}

impl Execution {
    pub fn new(correlator: Arc<Correlator>, symbol: String, currency: String) -> Arc<Self> {
        Arc::new(Self {
            correlator,
            symbol,
            currency,
            open_contracts: RwLock::new(HashMap::new()),
            events_tx: broadcast::channel(EVENT_CHANNEL_CAPACITY).0,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events_tx.subscribe()
    }

    pub async fn open_contract_count(&self) -> usize {
        self.open_contracts.read().await.len()
    }

    /// Subscribes to the session balance stream once (spec.md §4.5). Spawns
    /// a task owned for the runtime's lifetime that republishes every update
    /// as `ExecutionEvent::BalanceUpdate`.
    pub fn spawn_balance_listener(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let execution = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = execution
                .correlator
                .call(json!({"balance": 1, "subscribe": 1}), DEFAULT_CALL_DEADLINE)
                .await
            {
                warn!(error = %e, "initial balance subscribe failed");
                return;
            }
            let mut stream = execution.correlator.subscribe(StreamKind::Balance);
            loop {
                match stream.recv().await {
                    Ok(value) => {
                        if let Some(balance) = value
                            .get("balance")
                            .and_then(|b| b.get("balance"))
                            .and_then(|b| b.as_f64())
                            .and_then(|f| Decimal::try_from(f).ok())
                        {
                            let _ = execution
                                .events_tx
                                .send(ExecutionEvent::BalanceUpdate(balance));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Spawns the listener that finalizes trades from `proposal_open_contract`
    /// pushes carrying `is_sold: true` (spec.md §4.5: either the matched sell
    /// response or this stream closes the trade — this models the stream
    /// side, which is authoritative for realized profit).
    pub fn spawn_contract_update_listener(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let execution = Arc::clone(self);
        tokio::spawn(async move {
            let mut stream = execution.correlator.subscribe(StreamKind::ProposalOpenContract);
            loop {
                match stream.recv().await {
                    Ok(value) => execution.handle_contract_update(&value).await,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn handle_contract_update(&self, value: &Value) {
        let Some(poc) = value.get("proposal_open_contract") else {
            return;
        };
        let is_sold = poc.get("is_sold").and_then(Value::as_bool).unwrap_or(false);
        if !is_sold {
            return;
        }
        let Some(contract_id) = poc.get("contract_id").and_then(Value::as_u64) else {
            return;
        };
        let contract_id = contract_id.to_string();

        let open = self.open_contracts.write().await.remove(&contract_id);
        let Some(open) = open else {
            // Invariant violation per spec.md §7: closing a contract not in
            // active_trades. Logged, not fatal — can happen across restarts.
            warn!(contract_id, "contract_sold for an untracked contract");
            return;
        };

        let sell_price = decimal_field(poc, "sell_price").unwrap_or(open.buy_price);
        let profit = decimal_field(poc, "profit").unwrap_or(sell_price - open.buy_price);

        let _ = self.events_tx.send(ExecutionEvent::TradeClosed {
            contract_id,
            exit_price: sell_price,
            profit,
        });
    }

    /// Two-phase proposal→buy (spec.md §4.5).
    pub async fn propose_and_buy(
        &self,
        contract_type: ContractType,
        amount: Decimal,
        multiplier: Decimal,
        limit_order: Option<(Decimal, Decimal)>,
        trigger_reason: TriggerReason,
    ) -> Result<String, ExecutionError> {
        let mut proposal = json!({
            "proposal": 1,
            "amount": amount.to_string(),
            "basis": "stake",
            "contract_type": contract_type.as_broker_str(),
            "currency": self.currency,
            "symbol": self.symbol,
            "multiplier": multiplier.to_string(),
        });
        if let Some((take_profit, stop_loss)) = limit_order {
            proposal["limit_order"] = json!({
                "take_profit": take_profit.to_string(),
                "stop_loss": stop_loss.to_string(),
            });
        }

        let proposal_response = self
            .correlator
            .call(proposal, DEFAULT_CALL_DEADLINE)
            .await
            .map_err(map_link_error)?;

        let proposal_id = proposal_response
            .get("proposal")
            .and_then(|p| p.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| ExecutionError::ProposalRejected {
                reason: "missing proposal id in response".to_string(),
            })?
            .to_string();

        let buy_response = self
            .correlator
            .call(
                json!({"buy": proposal_id, "price": amount.to_string(), "subscribe": 1}),
                DEFAULT_CALL_DEADLINE,
            )
            .await
            .map_err(map_link_error)?;

        let buy = buy_response
            .get("buy")
            .ok_or_else(|| ExecutionError::ProposalRejected {
                reason: "missing buy confirmation in response".to_string(),
            })?;

        let contract_id = buy
            .get("contract_id")
            .and_then(Value::as_u64)
            .ok_or_else(|| ExecutionError::ProposalRejected {
                reason: "missing contract_id in buy confirmation".to_string(),
            })?
            .to_string();
        let buy_price = decimal_field(buy, "buy_price").unwrap_or(amount);
        let start_time = buy.get("start_time").and_then(Value::as_i64).unwrap_or(0);

        self.open_contracts.write().await.insert(
            contract_id.clone(),
            OpenContract { buy_price, start_time },
        );

        info!(contract_id, %buy_price, ?trigger_reason, "trade opened");
        let _ = self.events_tx.send(ExecutionEvent::TradeOpened {
            contract_id: contract_id.clone(),
            symbol: self.symbol.clone(),
            entry_price: buy_price,
            contract_type,
            trigger_reason,
        });

        Ok(contract_id)
    }

    /// Market sell (spec.md §4.5). Final trade closure is driven by the
    /// `proposal_open_contract` listener; this just confirms the broker
    /// accepted the request.
    pub async fn sell(&self, contract_id: &str) -> Result<(), ExecutionError> {
        self.correlator
            .call(
                json!({"sell": contract_id, "price": 0}),
                DEFAULT_CALL_DEADLINE,
            )
            .await
            .map_err(map_link_error)?;
        Ok(())
    }
}

fn decimal_field(value: &Value, field: &str) -> Option<Decimal> {
    match value.get(field)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64().and_then(|f| Decimal::try_from(f).ok()),
        _ => None,
    }
}

fn map_link_error(err: crate::domain::errors::LinkError) -> ExecutionError {
    use crate::domain::errors::LinkError;
    match &err {
        LinkError::Broker { code, message } => match code.as_str() {
            "RateLimit" => ExecutionError::RateLimit,
            "buy_limit_reached" => ExecutionError::BuyLimitReached,
            _ => ExecutionError::ProposalRejected {
                reason: message.clone(),
            },
        },
        _ => ExecutionError::Link(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::link::BrokerLink;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn execution() -> Arc<Execution> {
        let link = BrokerLink::new("1089", "token");
        let correlator = Correlator::spawn(link);
        Execution::new(correlator, "R_100".to_string(), "USD".to_string())
    }

    #[tokio::test]
    async fn propose_and_buy_fails_fast_without_a_live_link() {
        let execution = execution();
        let err = execution
            .propose_and_buy(ContractType::MultDown, dec!(10), dec!(10), None, TriggerReason::PermissiveSpike)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Link(crate::domain::errors::LinkError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn contract_update_without_is_sold_is_ignored() {
        let execution = execution();
        execution
            .handle_contract_update(&json!({"proposal_open_contract": {"contract_id": 1, "is_sold": false}}))
            .await;
        assert_eq!(execution.open_contract_count().await, 0);
    }

    #[tokio::test]
    async fn contract_update_for_untracked_contract_is_logged_not_fatal() {
        let execution = execution();
        // Must not panic even though contract 999 was never opened here.
        execution
            .handle_contract_update(&json!({
                "proposal_open_contract": {"contract_id": 999, "is_sold": true, "sell_price": "10", "buy_price": "5"}
            }))
            .await;
    }

    #[tokio::test]
    async fn contract_update_closes_a_tracked_contract_and_prefers_broker_profit() {
        let execution = execution();
        execution.open_contracts.write().await.insert(
            "42".to_string(),
            OpenContract {
                buy_price: dec!(10),
                start_time: 1000,
            },
        );
        let mut events = execution.subscribe();
        execution
            .handle_contract_update(&json!({
                "proposal_open_contract": {
                    "contract_id": 42,
                    "is_sold": true,
                    "sell_price": "12",
                    "profit": "2.5",
                }
            }))
            .await;
        assert_eq!(execution.open_contract_count().await, 0);
        match events.try_recv().unwrap() {
            ExecutionEvent::TradeClosed { contract_id, profit, .. } => {
                assert_eq!(contract_id, "42");
                assert_eq!(profit, dec!(2.5));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
