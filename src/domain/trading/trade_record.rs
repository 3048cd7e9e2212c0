use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::types::TriggerReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Open,
    Closed,
    Cancelled,
}

/// spec.md §3 `TradeRecord`. `contract_id` is the externally-assigned,
/// globally unique primary key — persistence upserts on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub contract_id: String,
    pub symbol: String,
    pub entry_time: i64,
    pub entry_price: Decimal,
    pub trigger_reason: TriggerReason,
    pub status: TradeStatus,
    pub exit_time: Option<i64>,
    pub exit_price: Option<Decimal>,
    pub profit: Option<Decimal>,
    pub account_balance: Option<Decimal>,
}

impl TradeRecord {
    pub fn opened(
        contract_id: String,
        symbol: String,
        entry_time: i64,
        entry_price: Decimal,
        trigger_reason: TriggerReason,
    ) -> Self {
        Self {
            contract_id,
            symbol,
            entry_time,
            entry_price,
            trigger_reason,
            status: TradeStatus::Open,
            exit_time: None,
            exit_price: None,
            profit: None,
            account_balance: None,
        }
    }

    pub fn close(&mut self, exit_time: i64, exit_price: Decimal, profit: Decimal, balance: Decimal) {
        self.status = TradeStatus::Closed;
        self.exit_time = Some(exit_time);
        self.exit_price = Some(exit_price);
        self.profit = Some(profit);
        self.account_balance = Some(balance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn opened_trade_is_open_with_no_exit_fields() {
        let trade = TradeRecord::opened(
            "C1".to_string(),
            "R_100".to_string(),
            1000,
            dec!(100),
            TriggerReason::PermissiveSpike,
        );
        assert_eq!(trade.status, TradeStatus::Open);
        assert!(trade.exit_price.is_none());
    }

    #[test]
    fn close_sets_all_exit_fields() {
        let mut trade = TradeRecord::opened(
            "C1".to_string(),
            "R_100".to_string(),
            1000,
            dec!(100),
            TriggerReason::PermissiveSpike,
        );
        trade.close(1100, dec!(95), dec!(5), dec!(1005));
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.exit_price, Some(dec!(95)));
        assert_eq!(trade.profit, Some(dec!(5)));
        assert_eq!(trade.account_balance, Some(dec!(1005)));
    }
}
