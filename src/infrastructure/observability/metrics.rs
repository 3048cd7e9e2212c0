//! Prometheus metrics definitions for the strategy runtime.
//!
//! All metrics use the `synth_strategy_` prefix and are read-only from the
//! caller's perspective — the runtime only ever sets/increments them.

use prometheus::{
    CounterVec, Gauge, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// 0=Down, 1=Connecting, 2=Authorized, 3=Fatal.
    pub link_state: GenericGauge<AtomicF64>,
    pub reconnects_total: CounterVec,
    pub open_trades_count: GenericGauge<AtomicF64>,
    pub daily_pnl_usd: GenericGauge<AtomicF64>,
    pub account_balance_usd: GenericGauge<AtomicF64>,
    pub trades_total: CounterVec,
    pub killswitch_active: GenericGauge<AtomicF64>,
    pub daily_cap_reached: GenericGauge<AtomicF64>,
    pub rpc_timeouts_total: CounterVec,
    pub uptime_seconds: GenericGauge<AtomicF64>,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let link_state =
            Gauge::with_opts(Opts::new("synth_strategy_link_state", "Broker link state"))?;
        registry.register(Box::new(link_state.clone()))?;

        let reconnects_total = CounterVec::new(
            Opts::new(
                "synth_strategy_reconnects_total",
                "Total broker link reconnect attempts",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(reconnects_total.clone()))?;

        let open_trades_count = Gauge::with_opts(Opts::new(
            "synth_strategy_open_trades_count",
            "Number of currently open contracts (0 or 1)",
        ))?;
        registry.register(Box::new(open_trades_count.clone()))?;

        let daily_pnl_usd = Gauge::with_opts(Opts::new(
            "synth_strategy_daily_pnl_usd",
            "Accumulated realized profit for the current UTC day",
        ))?;
        registry.register(Box::new(daily_pnl_usd.clone()))?;

        let account_balance_usd = Gauge::with_opts(Opts::new(
            "synth_strategy_account_balance_usd",
            "Last observed broker account balance",
        ))?;
        registry.register(Box::new(account_balance_usd.clone()))?;

        let trades_total = CounterVec::new(
            Opts::new("synth_strategy_trades_total", "Closed trades by reason"),
            &["trigger_reason"],
        )?;
        registry.register(Box::new(trades_total.clone()))?;

        let killswitch_active = Gauge::with_opts(Opts::new(
            "synth_strategy_killswitch_active",
            "1 while the drawdown killswitch is tripped",
        ))?;
        registry.register(Box::new(killswitch_active.clone()))?;

        let daily_cap_reached = Gauge::with_opts(Opts::new(
            "synth_strategy_daily_cap_reached",
            "1 while today's profit cap has been reached",
        ))?;
        registry.register(Box::new(daily_cap_reached.clone()))?;

        let rpc_timeouts_total = CounterVec::new(
            Opts::new(
                "synth_strategy_rpc_timeouts_total",
                "Correlator calls that failed with Timeout",
            ),
            &["verb"],
        )?;
        registry.register(Box::new(rpc_timeouts_total.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "synth_strategy_uptime_seconds",
            "Process uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            link_state,
            reconnects_total,
            open_trades_count,
            daily_pnl_usd,
            account_balance_usd,
            trades_total,
            killswitch_active,
            daily_cap_reached,
            rpc_timeouts_total,
            uptime_seconds,
        })
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_reconnects(&self, outcome: &str) {
        self.reconnects_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_trades(&self, trigger_reason: &str) {
        self.trades_total.with_label_values(&[trigger_reason]).inc();
    }

    pub fn inc_rpc_timeouts(&self, verb: &str) {
        self.rpc_timeouts_total.with_label_values(&[verb]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("static metric definitions never fail to register")
    }
}
