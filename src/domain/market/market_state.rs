use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::indicators::IndicatorSet;

/// spec.md §3: PERMISSIVE iff price is below all three of SMA50/100/200 and
/// all three are defined; RESTRICTED (the safe default) otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketState {
    Restricted,
    Permissive,
}

impl MarketState {
    pub fn compute(price: Decimal, smas: &IndicatorSet) -> MarketState {
        match (smas.sma50, smas.sma100, smas.sma200) {
            (Some(sma50), Some(sma100), Some(sma200)) => {
                if price < sma50 && price < sma100 && price < sma200 {
                    MarketState::Permissive
                } else {
                    MarketState::Restricted
                }
            }
            _ => MarketState::Restricted,
        }
    }

    pub fn is_permissive(&self) -> bool {
        matches!(self, MarketState::Permissive)
    }
}
