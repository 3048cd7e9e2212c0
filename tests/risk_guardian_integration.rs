//! End-to-end scenarios from spec.md §8, driven purely through
//! `RiskGuardian`'s public API against a real `InMemoryPersistenceSink`,
//! mirroring the teacher's `tests/drawdown_integration.rs` style of wiring
//! real collaborators together rather than mocking the unit under test.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use synth_strategy_runtime::application::risk_guardian::{RiskConfig, RiskGuardian};
use synth_strategy_runtime::domain::errors::RiskRefusal;
use synth_strategy_runtime::domain::ports::PersistenceSink;
use synth_strategy_runtime::infrastructure::persistence::InMemoryPersistenceSink;

const TUESDAY_NOON_UTC: i64 = 1_753_790_400;

fn risk_config() -> RiskConfig {
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

#[tokio::test]
async fn daily_cap_lockout_persists_through_the_sink_and_blocks_new_entries() {
    // spec.md §8 scenario 4: once today's accumulated profit reaches the
    // cap, every subsequent entry signal is refused until UTC rollover.
    let sink = Arc::new(InMemoryPersistenceSink::new());
    let mut guardian = RiskGuardian::new(dec!(1000), risk_config(), Arc::clone(&sink) as Arc<dyn PersistenceSink>);

    guardian.record_trade_exit(dec!(5.0)).await;
    assert!(guardian.permit_entry(TUESDAY_NOON_UTC).is_ok());

    guardian.record_trade_exit(dec!(3.5)).await;
    assert!(guardian.daily_cap_reached());
    assert!(matches!(
        guardian.permit_entry(TUESDAY_NOON_UTC).unwrap_err(),
        RiskRefusal::DailyCapReached { .. }
    ));
    assert_eq!(guardian.daily_profit(), dec!(8.5));
    assert_eq!(guardian.trades_taken_today(), 2);

    // The sink received both upserts under today's real UTC date.
    let today = chrono::Utc::now().date_naive();
    let stat = sink.daily_stat(today).await.expect("sink recorded today's upsert");
    assert_eq!(stat.accumulated_profit, dec!(8.5));
    assert_eq!(stat.trades_taken, 2);
}

#[tokio::test]
async fn drawdown_killswitch_blocks_entries_for_the_full_duration() {
    // spec.md §8 scenario 6: highest_balance=1000, updates 980, 960, 955
    // trips the killswitch; entries stay refused for the whole window.
    let sink = Arc::new(InMemoryPersistenceSink::new());
    let mut guardian = RiskGuardian::new(dec!(1000), risk_config(), sink as Arc<dyn PersistenceSink>);

    guardian.observe_balance(dec!(980), TUESDAY_NOON_UTC);
    guardian.observe_balance(dec!(960), TUESDAY_NOON_UTC);
    guardian.observe_balance(dec!(955), TUESDAY_NOON_UTC);

    assert!(guardian.killswitch_active(TUESDAY_NOON_UTC));
    assert!(matches!(
        guardian.permit_entry(TUESDAY_NOON_UTC).unwrap_err(),
        RiskRefusal::Killswitch { .. }
    ));
    // Still refused a day minus one second later.
    assert!(guardian.killswitch_active(TUESDAY_NOON_UTC + 24 * 3600 - 1));
    // Expired by the 25th hour.
    assert!(!guardian.killswitch_active(TUESDAY_NOON_UTC + 25 * 3600));
}

#[tokio::test]
async fn train_detector_emergency_pause_overrides_an_otherwise_permissive_session() {
    // spec.md §8 train-detector property: two consecutive deltas over the
    // threshold arm a 15-minute pause during which every entry is refused,
    // even though the session/cap/killswitch guards would otherwise pass.
    let sink = Arc::new(InMemoryPersistenceSink::new());
    let mut guardian = RiskGuardian::new(dec!(1000), risk_config(), sink as Arc<dyn PersistenceSink>);

    assert!(guardian.permit_entry(TUESDAY_NOON_UTC).is_ok());

    for price in [dec!(100), dec!(104.1), dec!(108.3), dec!(112.5)] {
        guardian.observe_tick(price, TUESDAY_NOON_UTC);
    }

    assert!(matches!(
        guardian.permit_entry(TUESDAY_NOON_UTC).unwrap_err(),
        RiskRefusal::TrainPause { .. }
    ));
    assert!(guardian.permit_entry(TUESDAY_NOON_UTC + 16 * 60).is_ok());
}

#[tokio::test]
async fn risk_sizing_never_exceeds_the_configured_fraction_of_balance() {
    let sink = Arc::new(InMemoryPersistenceSink::new());
    let guardian = RiskGuardian::new(dec!(1000), risk_config(), sink as Arc<dyn PersistenceSink>);

    // 1000 * 0.015 * 10 / 5 = 30, well inside the 1.5% risk fraction.
    let amount = guardian.risk_sizing(dec!(1000), dec!(10), dec!(5));
    assert_eq!(amount, dec!(30));

    // A degenerate zero stop-loss distance falls back to the floor rather
    // than dividing by zero.
    let floor = guardian.risk_sizing(dec!(1000), dec!(10), dec!(0));
    assert_eq!(floor, dec!(0.10));
}
