//! Narrow interfaces to the external collaborators named in spec.md §6.
//!
//! These are deliberately out of scope to implement in full (the operator
//! database and UI broadcast channel belong to other subsystems); only the
//! seam the strategy runtime talks to is modeled here, mirroring how the
//! teacher splits `MarketDataService`/`ExecutionService`/`*Repository` into
//! trait objects that `infrastructure::*` implements.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::types::TriggerReason;

/// Append-only sink for trade history and the daily P&L rollup. Both
/// operations must be idempotent on `contract_id` / `date` because a
/// crash-restart may replay in-memory events that were already persisted.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record_entry(
        &self,
        contract_id: &str,
        symbol: &str,
        entry_price: Decimal,
        trigger_reason: TriggerReason,
    ) -> Result<()>;

    async fn record_exit(
        &self,
        contract_id: &str,
        exit_price: Decimal,
        profit: Decimal,
        balance: Decimal,
    ) -> Result<()>;

    /// Atomic `$inc`-equivalent: adds `profit_delta` to today's accumulated
    /// profit and increments `trades_taken` by one.
    async fn upsert_daily_stat(&self, date: NaiveDate, profit_delta: Decimal) -> Result<()>;
}
