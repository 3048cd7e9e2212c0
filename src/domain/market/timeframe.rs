use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four candle granularities the broker streams for the primary symbol
/// (spec.md §3, `CandleBook`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    S60,
    S300,
    S900,
    H1,
}

impl Timeframe {
    pub fn all() -> [Timeframe; 4] {
        [Timeframe::S60, Timeframe::S300, Timeframe::S900, Timeframe::H1]
    }

    /// Granularity in seconds, as sent to the broker's `ticks_history` call.
    pub fn seconds(&self) -> i64 {
        match self {
            Timeframe::S60 => 60,
            Timeframe::S300 => 300,
            Timeframe::S900 => 900,
            Timeframe::H1 => 3600,
        }
    }

    /// The candle epoch a tick with the given timestamp belongs to.
    pub fn period_start(&self, epoch: i64) -> i64 {
        let period = self.seconds();
        epoch - epoch.rem_euclid(period)
    }

    /// Maps a broker-reported `granularity` (seconds) onto a `Timeframe`,
    /// `None` for any granularity outside the four this runtime tracks.
    pub fn from_str_seconds(seconds: i64) -> Option<Timeframe> {
        Timeframe::all().into_iter().find(|tf| tf.seconds() == seconds)
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "60" => Ok(Timeframe::S60),
            "300" => Ok(Timeframe::S300),
            "900" => Ok(Timeframe::S900),
            "3600" => Ok(Timeframe::H1),
            other => Err(anyhow!("invalid granularity: {other}")),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_match_granularity() {
        assert_eq!(Timeframe::S60.seconds(), 60);
        assert_eq!(Timeframe::S300.seconds(), 300);
        assert_eq!(Timeframe::S900.seconds(), 900);
        assert_eq!(Timeframe::H1.seconds(), 3600);
    }

    #[test]
    fn period_start_aligns_down() {
        let tf = Timeframe::S300;
        assert_eq!(tf.period_start(1_000), 1_000 - (1_000 % 300));
        assert_eq!(tf.period_start(900), 900);
        assert_eq!(tf.period_start(901), 900);
    }

    #[test]
    fn from_str_roundtrips() {
        assert_eq!(Timeframe::from_str("60").unwrap(), Timeframe::S60);
        assert_eq!(Timeframe::from_str("3600").unwrap(), Timeframe::H1);
        assert!(Timeframe::from_str("42").is_err());
    }
}
