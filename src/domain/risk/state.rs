use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const TICK_HISTORY_LEN: usize = 5;

/// RiskGuardian's mutable state (spec.md §3 `RiskState`). Owned exclusively
/// by `application::risk::RiskGuardian`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub tick_history: VecDeque<Decimal>,
    /// Set while the train-detector emergency brake is active.
    pub paused_until: Option<i64>,
    /// Set while the drawdown killswitch is tripped.
    pub killswitch_until: Option<i64>,
    pub starting_balance: Decimal,
    pub highest_balance: Decimal,
}

impl RiskState {
    pub fn new(starting_balance: Decimal) -> Self {
        Self {
            tick_history: VecDeque::with_capacity(TICK_HISTORY_LEN),
            paused_until: None,
            killswitch_until: None,
            starting_balance,
            highest_balance: starting_balance,
        }
    }

    /// Push a new tick price onto the bounded history used by the train
    /// detector, evicting the oldest entry once full.
    pub fn push_tick(&mut self, price: Decimal) {
        if self.tick_history.len() == TICK_HISTORY_LEN {
            self.tick_history.pop_front();
        }
        self.tick_history.push_back(price);
    }

    /// Update the high-water mark on every balance observation. Returns the
    /// current drawdown fraction relative to the new high-water mark.
    pub fn observe_balance(&mut self, balance: Decimal) -> Decimal {
        if balance > self.highest_balance {
            self.highest_balance = balance;
        }
        if self.highest_balance.is_zero() {
            return Decimal::ZERO;
        }
        (self.highest_balance - balance) / self.highest_balance
    }

    pub fn is_paused(&self, now: i64) -> bool {
        self.paused_until.is_some_and(|until| now < until)
    }

    pub fn is_killswitched(&self, now: i64) -> bool {
        self.killswitch_until.is_some_and(|until| now < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn tick_history_evicts_oldest() {
        let mut state = RiskState::new(dec!(1000));
        for i in 0..8 {
            state.push_tick(Decimal::from(i));
        }
        assert_eq!(state.tick_history.len(), TICK_HISTORY_LEN);
        assert_eq!(state.tick_history.front().copied(), Some(dec!(3)));
    }

    #[test]
    fn drawdown_killswitch_scenario_from_spec() {
        // highest_balance=1000, updates 980, 960, 955 -> (1000-955)/1000 = 0.045
        let mut state = RiskState::new(dec!(1000));
        state.observe_balance(dec!(980));
        state.observe_balance(dec!(960));
        let drawdown = state.observe_balance(dec!(955));
        assert_eq!(drawdown, dec!(0.045));
    }

    #[test]
    fn high_water_mark_only_increases() {
        let mut state = RiskState::new(dec!(1000));
        state.observe_balance(dec!(1100));
        state.observe_balance(dec!(1050));
        assert_eq!(state.highest_balance, dec!(1100));
    }

    #[test]
    fn pause_and_killswitch_windows() {
        let mut state = RiskState::new(dec!(1000));
        state.paused_until = Some(100);
        state.killswitch_until = Some(200);
        assert!(state.is_paused(50));
        assert!(!state.is_paused(150));
        assert!(state.is_killswitched(150));
        assert!(!state.is_killswitched(250));
    }
}
