//! Hand-rolled `sum/period` SMAs over `Decimal` closes, the shape of
//! `domain::risk::filters::price_anomaly_validator::calculate_sma` in the
//! teacher — not the `ta`-crate indicators `feature_engineering_service`
//! uses elsewhere, since those are `f64`-typed and never leave a period
//! undefined before enough samples exist (see `DESIGN.md`).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const PERIODS: [(usize, fn(&mut IndicatorSet) -> &mut Option<Decimal>); 4] = [
    (25, |s| &mut s.sma25),
    (50, |s| &mut s.sma50),
    (100, |s| &mut s.sma100),
    (200, |s| &mut s.sma200),
];

/// The derived SMA cluster, computed only over closed candles of the
/// primary timeframe (spec.md §3 — excludes the forming candle to prevent
/// repainting).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub sma25: Option<Decimal>,
    pub sma50: Option<Decimal>,
    pub sma100: Option<Decimal>,
    pub sma200: Option<Decimal>,
}

impl IndicatorSet {
    /// `closes` must be ordered oldest-first and contain only closed candles
    /// (the caller excludes the still-forming one). A period's SMA is left
    /// `None` when fewer than `period` closes are available.
    pub fn recompute(closes: &[Decimal]) -> Self {
        let mut set = IndicatorSet::default();
        for (period, field) in PERIODS {
            if closes.len() >= period {
                let window = &closes[closes.len() - period..];
                let sum: Decimal = window.iter().copied().sum();
                *field(&mut set) = Some(sum / Decimal::from(period as u64));
            }
        }
        set
    }

    pub fn all_defined(&self) -> bool {
        self.sma50.is_some() && self.sma100.is_some() && self.sma200.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn undefined_until_enough_closes() {
        let closes: Vec<Decimal> = (0..24).map(|i| Decimal::from(i)).collect();
        let set = IndicatorSet::recompute(&closes);
        assert!(set.sma25.is_none());
        assert!(set.sma200.is_none());
    }

    #[test]
    fn sma_is_sum_over_period() {
        let closes: Vec<Decimal> = vec![dec!(1); 25];
        let set = IndicatorSet::recompute(&closes);
        assert_eq!(set.sma25, Some(dec!(1)));
        assert!(set.sma50.is_none());
    }

    #[test]
    fn sma200_undefined_keeps_all_defined_false() {
        let closes: Vec<Decimal> = (0..150).map(|_| dec!(10)).collect();
        let set = IndicatorSet::recompute(&closes);
        assert!(set.sma50.is_some());
        assert!(set.sma100.is_some());
        assert!(set.sma200.is_none());
        assert!(!set.all_defined());
    }

    #[test]
    fn forming_candle_close_does_not_affect_smas() {
        // 200 closed candles at price 10, plus a synthetic "forming" candle
        // at an extreme price that the caller must exclude before calling
        // recompute — simulating that exclusion here.
        let mut closes: Vec<Decimal> = (0..200).map(|_| dec!(10)).collect();
        let baseline = IndicatorSet::recompute(&closes);
        closes.push(dec!(99999)); // forming candle, must be excluded by caller
        let excluded = IndicatorSet::recompute(&closes[..closes.len() - 1]);
        assert_eq!(baseline, excluded);
    }
}
