//! Domain-specific error taxonomy (spec.md §7).
//!
//! Transport errors are handled inside `infrastructure::link` and never cross
//! the event boundary; these enums are for the errors that legitimately
//! surface to callers within the domain/application layers.

use thiserror::Error;

/// Errors from the Link/Correlator layer.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("not connected to broker")]
    NotConnected,
    #[error("link lost, pending call cancelled")]
    LinkLost,
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("authorization failed: invalid token")]
    InvalidToken,
    #[error("broker error {code}: {message}")]
    Broker { code: String, message: String },
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}

/// Errors from the Execution layer (proposal/buy/sell/balance).
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("broker rate limit hit")]
    RateLimit,
    #[error("buy limit reached, account disqualified from further trading")]
    BuyLimitReached,
    #[error("proposal rejected: {reason}")]
    ProposalRejected { reason: String },
    #[error("sell rejected for contract {contract_id}: {reason}")]
    SellRejected { contract_id: String, reason: String },
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Risk guard refusals (non-fatal; trading is simply withheld).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RiskRefusal {
    #[error("outside trading session window")]
    SessionClosed,
    #[error("daily profit cap already reached for {date}")]
    DailyCapReached { date: String },
    #[error("train-detector emergency pause active until {until}")]
    TrainPause { until: i64 },
    #[error("drawdown killswitch active until {until}")]
    Killswitch { until: i64 },
}
