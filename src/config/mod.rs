//! Environment-driven configuration (spec.md §6), aggregated the way the
//! teacher's top-level `Config::from_env` composes its per-concern configs.

pub mod broker_env;
pub mod risk_env;
pub mod strategy_env;

use std::time::Duration;

use anyhow::Result;
use dotenvy::dotenv;

pub use broker_env::BrokerEnvConfig;
pub use risk_env::RiskEnvConfig;
pub use strategy_env::StrategyEnvConfig;

use crate::application::risk_guardian::RiskConfig;
use crate::application::strategy_engine::StrategyConfig;

const KILLSWITCH_DURATION: Duration = Duration::from_secs(24 * 3600);
const DEFAULT_METRICS_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub broker: BrokerEnvConfig,
    pub strategy: StrategyEnvConfig,
    pub risk: RiskEnvConfig,
    pub metrics_interval_secs: u64,
}

impl Config {
    /// Loads `.env` if present (a no-op in production where the process
    /// environment is already populated), then reads every setting.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();
        Ok(Self {
            broker: BrokerEnvConfig::from_env()?,
            strategy: StrategyEnvConfig::from_env()?,
            risk: RiskEnvConfig::from_env()?,
            metrics_interval_secs: std::env::var("METRICS_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_METRICS_INTERVAL_SECS),
        })
    }

    pub fn risk_guardian_config(&self) -> RiskConfig {
        RiskConfig {
            daily_cap: self.risk.daily_cap,
            train_delta: self.risk.train_delta,
            train_pause: self.risk.train_pause(),
            killswitch_threshold: self.risk.killswitch_threshold,
            killswitch_duration: KILLSWITCH_DURATION,
            session_start_utc_hour: self.risk.session_start_utc_hour,
            session_end_utc_hour: self.risk.session_end_utc_hour,
            risk_fraction: self.risk.risk_fraction,
        }
    }

    pub fn strategy_config(&self) -> StrategyConfig {
        StrategyConfig {
            symbol: self.broker.symbol.clone(),
            stake_amount: self.strategy.stake_amount,
            multiplier: self.strategy.multiplier,
            take_profit_multiplier: self.strategy.take_profit_multiplier,
            stop_loss_multiplier: self.strategy.stop_loss_multiplier,
            spike_delta: self.strategy.spike_delta,
            crossover_cooldown_minutes: self.strategy.crossover_cooldown_minutes,
        }
    }
}
