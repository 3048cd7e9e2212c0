//! Composes the five trading guards spec.md §4.4 names, with AND semantics:
//! trading is permitted iff every guard permits. Grounded in the teacher's
//! `SessionManager`/risk-state persistence pattern
//! (`application::risk_management::session_manager`,
//! `domain::risk::state::RiskState`), generalized from Binance's
//! session/drawdown/exposure split to this spec's session/cap/train/
//! drawdown/sizing split.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::domain::errors::RiskRefusal;
use crate::domain::ports::PersistenceSink;
use crate::domain::risk::state::RiskState;
use crate::domain::risk::train_detector;
use crate::domain::trading::DailyStat;

pub const TICK_HISTORY_LEN: usize = 5;

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub daily_cap: Decimal,
    pub train_delta: Decimal,
    pub train_pause: Duration,
    pub killswitch_threshold: Decimal,
    pub killswitch_duration: Duration,
    pub session_start_utc_hour: u32,
    pub session_end_utc_hour: u32,
    pub risk_fraction: Decimal,
}

pub struct RiskGuardian {
    config: RiskConfig,
    state: RiskState,
    daily_stat: DailyStat,
    persistence: Arc<dyn PersistenceSink>,
}

impl RiskGuardian {
    pub fn new(starting_balance: Decimal, config: RiskConfig, persistence: Arc<dyn PersistenceSink>) -> Self {
        Self {
            config,
            state: RiskState::new(starting_balance),
            daily_stat: DailyStat::new(today_utc(Utc::now().timestamp())),
            persistence,
        }
    }

    pub fn killswitch_active(&self, now: i64) -> bool {
        self.state.is_killswitched(now)
    }

    pub fn daily_cap_reached(&self) -> bool {
        self.daily_stat.is_cap_reached
    }

    pub fn daily_profit(&self) -> Decimal {
        self.daily_stat.accumulated_profit
    }

    pub fn trades_taken_today(&self) -> u64 {
        self.daily_stat.trades_taken
    }

    /// Feeds the rolling 5-tick train detector. Returns `true` when the
    /// pattern fires, in which case it also arms the 15-minute pause.
    pub fn observe_tick(&mut self, price: Decimal, now: i64) -> bool {
        self.state.push_tick(price);
        let window: VecDeque<Decimal> = self.state.tick_history.clone();
        let fired = train_detector::train_detected(&window, self.config.train_delta);
        if fired {
            self.state.paused_until = Some(now + self.config.train_pause.as_secs() as i64);
            warn!(until = self.state.paused_until, "train detector tripped, emergency pause armed");
        }
        fired
    }

    /// Updates the drawdown high-water mark; trips the killswitch for the
    /// configured duration once the threshold is crossed.
    pub fn observe_balance(&mut self, balance: Decimal, now: i64) {
        let drawdown = self.state.observe_balance(balance);
        if drawdown >= self.config.killswitch_threshold {
            self.state.killswitch_until = Some(now + self.config.killswitch_duration.as_secs() as i64);
            warn!(?drawdown, until = self.state.killswitch_until, "drawdown killswitch tripped");
        }
    }

    /// Rolls the cached `DailyStat` over to a new UTC day, if `now` has
    /// crossed midnight since the last check.
    pub fn roll_day_if_needed(&mut self, now: i64) {
        let date = today_utc(now);
        if date != self.daily_stat.date_utc {
            info!(%date, "rolling daily stat to new UTC day");
            self.daily_stat = DailyStat::new(date);
        }
    }

    /// All five guards, composed with AND. Returns the first refusal
    /// encountered, in the order spec.md §4.4 lists them.
    pub fn permit_entry(&self, now: i64) -> Result<(), RiskRefusal> {
        self.session_gate(now)?;
        if self.daily_stat.is_cap_reached {
            return Err(RiskRefusal::DailyCapReached {
                date: self.daily_stat.date_utc.to_string(),
            });
        }
        if let Some(until) = self.state.paused_until
            && now < until
        {
            return Err(RiskRefusal::TrainPause { until });
        }
        if let Some(until) = self.state.killswitch_until
            && now < until
        {
            return Err(RiskRefusal::Killswitch { until });
        }
        Ok(())
    }

    fn session_gate(&self, now: i64) -> Result<(), RiskRefusal> {
        let dt = DateTime::<Utc>::from_timestamp(now, 0).unwrap_or_else(Utc::now);
        let hour = dt.hour();
        if hour < self.config.session_start_utc_hour || hour >= self.config.session_end_utc_hour {
            return Err(RiskRefusal::SessionClosed);
        }
        if in_weekend_maintenance_window(dt) {
            return Err(RiskRefusal::SessionClosed);
        }
        Ok(())
    }

    /// `amount = max(0.10, balance * risk_fraction * multiplier / sl_distance_points)`.
    /// Never exceeds 1.5% notional risk per spec.md §4.4 item 5.
    pub fn risk_sizing(&self, balance: Decimal, multiplier: Decimal, sl_distance_points: Decimal) -> Decimal {
        if sl_distance_points.is_zero() {
            return Decimal::new(10, 2); // 0.10 floor
        }
        let sized = balance * self.config.risk_fraction * multiplier / sl_distance_points;
        sized.max(Decimal::new(10, 2))
    }

    /// Applies a realized trade profit to today's stat and persists the
    /// `$inc`-equivalent upsert.
    pub async fn record_trade_exit(&mut self, profit: Decimal) {
        self.daily_stat.apply_profit(profit, self.config.daily_cap);
        if let Err(e) = self
            .persistence
            .upsert_daily_stat(self.daily_stat.date_utc, profit)
            .await
        {
            warn!(error = %e, "failed to persist daily stat upsert");
        }
    }
}

fn today_utc(epoch: i64) -> chrono::NaiveDate {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .unwrap_or_else(Utc::now)
        .date_naive()
}

/// Sat 23:55 UTC through Sun 00:05 UTC (spec.md §4.4 item 1).
fn in_weekend_maintenance_window(dt: DateTime<Utc>) -> bool {
    let minute_of_day = dt.hour() * 60 + dt.minute();
    match dt.weekday() {
        Weekday::Sat => minute_of_day >= 23 * 60 + 55,
        Weekday::Sun => minute_of_day < 5,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::InMemoryPersistenceSink;
    use rust_decimal_macros::dec;

    fn config() -> RiskConfig {
        RiskConfig {
            daily_cap: dec!(8.0),
            train_delta: dec!(4.0),
            train_pause: Duration::from_secs(15 * 60),
            killswitch_threshold: dec!(0.045),
            killswitch_duration: Duration::from_secs(24 * 3600),
            session_start_utc_hour: 8,
            session_end_utc_hour: 21,
            risk_fraction: dec!(0.015),
        }
    }

    fn guardian() -> RiskGuardian {
        RiskGuardian::new(dec!(1000), config(), Arc::new(InMemoryPersistenceSink::new()))
    }

    // A Tuesday 12:00 UTC timestamp inside the default session window.
    const IN_SESSION: i64 = 1_753_790_400;

    #[test]
    fn permit_entry_allows_when_all_guards_pass() {
        let guardian = guardian();
        assert!(guardian.permit_entry(IN_SESSION).is_ok());
    }

    #[test]
    fn permit_entry_refuses_outside_session_hours() {
        let guardian = guardian();
        // Same day, 02:00 UTC: before the 08:00 session start.
        let before_open = IN_SESSION - 10 * 3600;
        assert_eq!(
            guardian.permit_entry(before_open).unwrap_err(),
            RiskRefusal::SessionClosed
        );
    }

    #[test]
    fn daily_cap_reached_blocks_entries() {
        let mut guardian = guardian();
        guardian.daily_stat.apply_profit(dec!(8.0), dec!(8.0));
        assert!(guardian.daily_cap_reached());
        assert!(matches!(
            guardian.permit_entry(IN_SESSION).unwrap_err(),
            RiskRefusal::DailyCapReached { .. }
        ));
    }

    #[test]
    fn train_detector_scenario_from_spec_trips_pause() {
        let mut guardian = guardian();
        for price in [dec!(100), dec!(104.1), dec!(108.3), dec!(112.5)] {
            guardian.observe_tick(price, IN_SESSION);
        }
        assert!(guardian.state.is_paused(IN_SESSION));
        assert!(matches!(
            guardian.permit_entry(IN_SESSION).unwrap_err(),
            RiskRefusal::TrainPause { .. }
        ));
    }

    #[test]
    fn drawdown_killswitch_scenario_from_spec_trips() {
        let mut guardian = guardian();
        guardian.observe_balance(dec!(980), IN_SESSION);
        guardian.observe_balance(dec!(960), IN_SESSION);
        guardian.observe_balance(dec!(955), IN_SESSION);
        assert!(guardian.killswitch_active(IN_SESSION));
    }

    #[test]
    fn risk_sizing_never_below_the_floor() {
        let guardian = guardian();
        let amount = guardian.risk_sizing(dec!(100), dec!(1), dec!(1000));
        assert_eq!(amount, dec!(0.10));
    }

    #[test]
    fn risk_sizing_scales_with_balance_and_multiplier() {
        let guardian = guardian();
        // 1000 * 0.015 * 10 / 5 = 30
        let amount = guardian.risk_sizing(dec!(1000), dec!(10), dec!(5));
        assert_eq!(amount, dec!(30));
    }

    #[test]
    fn roll_day_if_needed_resets_accumulated_profit() {
        let mut guardian = guardian();
        guardian.daily_stat.apply_profit(dec!(5), dec!(8));
        let next_day = guardian.daily_stat.date_utc.succ_opt().unwrap();
        let next_day_epoch = next_day
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp();
        guardian.roll_day_if_needed(next_day_epoch);
        assert_eq!(guardian.daily_profit(), dec!(0));
    }
}
