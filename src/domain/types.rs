//! Primitive value types shared across the strategy runtime.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single quoted price sample from the broker.
///
/// Epochs are monotonic per symbol per session but may jump across a
/// reconnect — consumers must not assume a fixed tick cadence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub epoch: i64,
    pub price: Decimal,
}

/// Broker contract direction for a multiplier position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractType {
    MultUp,
    MultDown,
}

impl ContractType {
    pub fn as_broker_str(&self) -> &'static str {
        match self {
            ContractType::MultUp => "MULTUP",
            ContractType::MultDown => "MULTDOWN",
        }
    }

    /// True if this is a short (down) position.
    pub fn is_short(&self) -> bool {
        matches!(self, ContractType::MultDown)
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_broker_str())
    }
}

/// The reason a position was opened or closed — recorded on `TradeRecord`
/// and surfaced in logs so a human reviewing trades can tell entries from
/// the various guard-driven exits apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReason {
    /// Entry: market flipped PERMISSIVE and the tick-to-tick spike fired.
    PermissiveSpike,
    /// Exit: tick-level take-profit distance reached.
    TakeProfit,
    /// Exit: tick-level stop-loss distance reached.
    StopLoss,
    /// Exit: RiskGuardian's train detector fired an emergency brake.
    TrainDetected,
    /// Exit: market flipped back to RESTRICTED while a trade was open.
    RestrictedState,
    /// Exit: SMA25 crossed above SMA50/SMA100 (crossover guard).
    CrossoverGuard,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerReason::PermissiveSpike => "PERMISSIVE_SPIKE",
            TriggerReason::TakeProfit => "TAKE_PROFIT",
            TriggerReason::StopLoss => "STOP_LOSS",
            TriggerReason::TrainDetected => "TRAIN_DETECTED",
            TriggerReason::RestrictedState => "RESTRICTED_STATE",
            TriggerReason::CrossoverGuard => "CROSSOVER_GUARD",
        };
        write!(f, "{s}")
    }
}

/// Known broker application-error codes the Correlator and Link treat
/// distinctly (spec.md §6). Anything else is a generic business refusal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerErrorCode {
    RateLimit,
    BuyLimitReached,
    InvalidToken,
    AuthorizationRequired,
    MarketIsClosed,
    InvalidSymbol,
    InvalidGranularity,
    Other(String),
}

impl From<&str> for BrokerErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "RateLimit" => BrokerErrorCode::RateLimit,
            "buy_limit_reached" => BrokerErrorCode::BuyLimitReached,
            "InvalidToken" => BrokerErrorCode::InvalidToken,
            "AuthorizationRequired" => BrokerErrorCode::AuthorizationRequired,
            "MarketIsClosed" => BrokerErrorCode::MarketIsClosed,
            "InvalidSymbol" => BrokerErrorCode::InvalidSymbol,
            "InvalidGranularity" => BrokerErrorCode::InvalidGranularity,
            other => BrokerErrorCode::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_type_broker_strings() {
        assert_eq!(ContractType::MultUp.as_broker_str(), "MULTUP");
        assert_eq!(ContractType::MultDown.as_broker_str(), "MULTDOWN");
        assert!(ContractType::MultDown.is_short());
        assert!(!ContractType::MultUp.is_short());
    }

    #[test]
    fn broker_error_code_from_str() {
        assert_eq!(BrokerErrorCode::from("RateLimit"), BrokerErrorCode::RateLimit);
        assert_eq!(
            BrokerErrorCode::from("buy_limit_reached"),
            BrokerErrorCode::BuyLimitReached
        );
        assert_eq!(
            BrokerErrorCode::from("SomethingElse"),
            BrokerErrorCode::Other("SomethingElse".to_string())
        );
    }
}
