//! Broker connection settings (spec.md §6): the Deriv app id, API token, and
//! the synthetic index symbol/currency this runtime trades. Grounded in the
//! teacher's per-broker `*Config::from_env` shape (`config::broker_config`),
//! collapsed to Deriv's single-broker surface.

use std::env;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct BrokerEnvConfig {
    pub app_id: String,
    pub token: String,
    pub symbol: String,
    pub currency: String,
}

impl BrokerEnvConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            app_id: env::var("APP_ID").unwrap_or_else(|_| "1089".to_string()),
            token: env::var("DERIV_TOKEN").context("DERIV_TOKEN must be set")?,
            symbol: env::var("SYMBOL").unwrap_or_else(|_| "R_100".to_string()),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "USD".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_requires_a_token() {
        // SAFETY: test-only, single-threaded within this process's test harness.
        unsafe {
            env::remove_var("DERIV_TOKEN");
        }
        assert!(BrokerEnvConfig::from_env().is_err());
    }
}
