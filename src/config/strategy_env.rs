//! Strategy tuning knobs (spec.md §6). `SQUEEZE_THRESHOLD` is read but
//! currently unused: spec.md's Open Questions leave the Bollinger-squeeze
//! entry variant unbuilt, so this just reserves the env var for a future
//! strategy mode rather than erroring on an operator who sets it.

use std::env;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct StrategyEnvConfig {
    pub stake_amount: Decimal,
    pub multiplier: Decimal,
    pub take_profit_multiplier: Decimal,
    pub stop_loss_multiplier: Decimal,
    pub tick_limit: usize,
    pub squeeze_threshold: Decimal,
    pub spike_delta: Decimal,
    pub crossover_cooldown_minutes: i64,
}

impl StrategyEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            stake_amount: parse_decimal_env("STAKE_AMOUNT", "1.0")?,
            multiplier: parse_decimal_env("MULTIPLIER", "300")?,
            take_profit_multiplier: parse_decimal_env("TAKE_PROFIT_MULTIPLIER", "2.0")?,
            stop_loss_multiplier: parse_decimal_env("STOP_LOSS_MULTIPLIER", "1.0")?,
            tick_limit: env::var("TICK_LIMIT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("failed to parse TICK_LIMIT")?,
            squeeze_threshold: parse_decimal_env("SQUEEZE_THRESHOLD", "0.002")?,
            spike_delta: parse_decimal_env("TRAIN_DELTA", "4.0")?,
            crossover_cooldown_minutes: env::var("COOLDOWN_MINUTES_CROSSOVER")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("failed to parse COOLDOWN_MINUTES_CROSSOVER")?,
        })
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
        let config = StrategyEnvConfig::from_env().unwrap();
        assert_eq!(config.tick_limit, 5);
        assert_eq!(config.crossover_cooldown_minutes, 5);
    }
}
