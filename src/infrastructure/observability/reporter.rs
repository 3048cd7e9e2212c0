//! Push-based metrics reporter: periodically renders a JSON snapshot to
//! stdout (prefixed `METRICS_JSON:` so log shippers can filter it), mirroring
//! `infrastructure::observability::reporter::MetricsReporter` in the teacher.
//! No HTTP server, no incoming connections — only outbound log lines.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::infrastructure::observability::metrics::Metrics;

/// Shared, read-mostly snapshot of runtime state the reporter renders each
/// tick. Updated by `application::system::TradingSystem` as events land.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSnapshot {
    pub link_authorized: bool,
    pub account_balance: Decimal,
    pub open_trade_count: u8,
    pub daily_profit: Decimal,
    pub trades_taken_today: u64,
    pub killswitch_active: bool,
    pub daily_cap_reached: bool,
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub link_authorized: bool,
    pub account_balance: f64,
    pub open_trade_count: u8,
    pub daily_profit: f64,
    pub trades_taken_today: u64,
    pub killswitch_active: bool,
    pub daily_cap_reached: bool,
}

pub struct MetricsReporter {
    snapshot: Arc<RwLock<RuntimeSnapshot>>,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(snapshot: Arc<RwLock<RuntimeSnapshot>>, metrics: Metrics, interval_secs: u64) -> Self {
        Self {
            snapshot,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_secs),
        }
    }

    pub async fn run(self) {
        info!(interval = ?self.interval, "metrics reporter started");
        loop {
            tokio::time::sleep(self.interval).await;
            match self.collect_snapshot().await {
                Ok(snapshot) => match serde_json::to_string(&snapshot) {
                    Ok(json) => {
                        println!("METRICS_JSON:{json}");
                        info!(
                            balance = snapshot.account_balance,
                            open_trades = snapshot.open_trade_count,
                            daily_profit = snapshot.daily_profit,
                            "metrics snapshot"
                        );
                    }
                    Err(e) => warn!(error = %e, "failed to serialize metrics snapshot"),
                },
                Err(e) => warn!(error = %e, "failed to collect metrics snapshot"),
            }
        }
    }

    async fn collect_snapshot(&self) -> anyhow::Result<MetricsSnapshot> {
        let state = self.snapshot.read().await;
        let uptime = self.start_time.elapsed().as_secs();

        self.metrics
            .link_state
            .set(if state.link_authorized { 2.0 } else { 0.0 });
        self.metrics
            .open_trades_count
            .set(state.open_trade_count as f64);
        self.metrics
            .daily_pnl_usd
            .set(state.daily_profit.to_f64().unwrap_or(0.0));
        self.metrics
            .account_balance_usd
            .set(state.account_balance.to_f64().unwrap_or(0.0));
        self.metrics
            .killswitch_active
            .set(if state.killswitch_active { 1.0 } else { 0.0 });
        self.metrics
            .daily_cap_reached
            .set(if state.daily_cap_reached { 1.0 } else { 0.0 });
        self.metrics.uptime_seconds.set(uptime as f64);

        Ok(MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            link_authorized: state.link_authorized,
            account_balance: state.account_balance.to_f64().unwrap_or(0.0),
            open_trade_count: state.open_trade_count,
            daily_profit: state.daily_profit.to_f64().unwrap_or(0.0),
            trades_taken_today: state.trades_taken_today,
            killswitch_active: state.killswitch_active,
            daily_cap_reached: state.daily_cap_reached,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn collect_snapshot_reflects_shared_state() {
        let snapshot = Arc::new(RwLock::new(RuntimeSnapshot {
            link_authorized: true,
            account_balance: dec!(1005.25),
            open_trade_count: 1,
            daily_profit: dec!(3.5),
            trades_taken_today: 2,
            killswitch_active: false,
            daily_cap_reached: false,
        }));
        let metrics = Metrics::new().unwrap();
        let reporter = MetricsReporter::new(snapshot, metrics, 60);

        let rendered = reporter.collect_snapshot().await.unwrap();
        assert_eq!(rendered.open_trade_count, 1);
        assert!(rendered.link_authorized);
        assert_eq!(rendered.trades_taken_today, 2);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let snapshot = MetricsSnapshot {
            timestamp: "2026-07-28T00:00:00Z".to_string(),
            uptime_seconds: 60,
            version: "0.1.0".to_string(),
            link_authorized: true,
            account_balance: 1000.0,
            open_trade_count: 0,
            daily_profit: 0.0,
            trades_taken_today: 0,
            killswitch_active: false,
            daily_cap_reached: false,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("account_balance"));
    }
}
