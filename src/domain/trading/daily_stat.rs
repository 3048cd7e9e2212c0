use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// spec.md §3 `DailyStat`. At most one row per UTC date; updated by
/// `$inc`-equivalent semantics per trade exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStat {
    pub date_utc: NaiveDate,
    pub accumulated_profit: Decimal,
    pub trades_taken: u64,
    pub is_cap_reached: bool,
}

impl DailyStat {
    pub fn new(date_utc: NaiveDate) -> Self {
        Self {
            date_utc,
            accumulated_profit: Decimal::ZERO,
            trades_taken: 0,
            is_cap_reached: false,
        }
    }

    /// Applies a realized trade profit and idempotently flips `is_cap_reached`
    /// once `accumulated_profit` meets or exceeds `cap`.
    pub fn apply_profit(&mut self, profit: Decimal, cap: Decimal) {
        self.accumulated_profit += profit;
        self.trades_taken += 1;
        if self.accumulated_profit >= cap {
            self.is_cap_reached = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 28).unwrap()
    }

    #[test]
    fn apply_profit_increments_trade_count() {
        let mut stat = DailyStat::new(today());
        stat.apply_profit(dec!(2.5), dec!(8.0));
        assert_eq!(stat.trades_taken, 1);
        assert_eq!(stat.accumulated_profit, dec!(2.5));
        assert!(!stat.is_cap_reached);
    }

    #[test]
    fn cap_reached_is_idempotent_once_set() {
        let mut stat = DailyStat::new(today());
        stat.apply_profit(dec!(8.0), dec!(8.0));
        assert!(stat.is_cap_reached);
        // A subsequent loss doesn't un-set the cap.
        stat.apply_profit(dec!(-1.0), dec!(8.0));
        assert!(stat.is_cap_reached);
    }

    #[test]
    fn trade_closed_reflects_plus_one_and_profit_delta() {
        let mut stat = DailyStat::new(today());
        stat.apply_profit(dec!(3.0), dec!(8.0));
        assert_eq!(stat.trades_taken, 1);
        assert_eq!(stat.accumulated_profit, dec!(3.0));
    }
}
