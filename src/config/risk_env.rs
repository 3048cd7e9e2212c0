//! Risk guard tuning (spec.md §6), loaded directly into
//! `application::risk_guardian::RiskConfig`'s shape.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct RiskEnvConfig {
    pub daily_cap: Decimal,
    pub train_delta: Decimal,
    pub train_pause_minutes: u64,
    pub killswitch_threshold: Decimal,
    pub session_start_utc_hour: u32,
    pub session_end_utc_hour: u32,
    pub risk_fraction: Decimal,
}

impl RiskEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            daily_cap: parse_decimal_env("DAILY_CAP", "8.00")?,
            train_delta: parse_decimal_env("TRAIN_DELTA", "4.0")?,
            train_pause_minutes: env::var("TRAIN_PAUSE_MINUTES")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("failed to parse TRAIN_PAUSE_MINUTES")?,
            killswitch_threshold: parse_decimal_env("KILLSWITCH_THRESHOLD", "0.045")?,
            session_start_utc_hour: env::var("SESSION_START_UTC_HOUR")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .context("failed to parse SESSION_START_UTC_HOUR")?,
            session_end_utc_hour: env::var("SESSION_END_UTC_HOUR")
                .unwrap_or_else(|_| "21".to_string())
                .parse()
                .context("failed to parse SESSION_END_UTC_HOUR")?,
            risk_fraction: parse_decimal_env("RISK_FRACTION", "0.015")?,
        })
    }

    pub fn train_pause(&self) -> Duration {
        Duration::from_secs(self.train_pause_minutes * 60)
    }
}

fn parse_decimal_env(key: &str, default: &str) -> Result<Decimal> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse()
        .with_context(|| format!("failed to parse {key} as a decimal"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_cleanly() {
        let config = RiskEnvConfig::from_env().unwrap();
        assert_eq!(config.train_pause_minutes, 15);
        assert_eq!(config.train_pause(), Duration::from_secs(900));
    }
}
