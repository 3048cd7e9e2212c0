use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::timeframe::Timeframe;

/// An OHLC bar. Immutable once `epoch_open` advances past it; the most
/// recent candle in a `CandleBook` is "forming" and may still be overwritten
/// in place (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub epoch_open: i64,
    pub granularity_seconds: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

const MAX_CANDLES: usize = 300;

/// Bounded ordered sequence of candles for one timeframe, most recent last.
/// Invariant: at most one forming (last) candle; every earlier candle is
/// closed.
#[derive(Debug, Clone)]
pub struct CandleBook {
    timeframe: Timeframe,
    candles: VecDeque<Candle>,
}

impl CandleBook {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            candles: VecDeque::with_capacity(MAX_CANDLES),
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn closed_candles(&self) -> impl Iterator<Item = &Candle> {
        let len = self.candles.len();
        self.candles.iter().take(len.saturating_sub(1))
    }

    pub fn forming(&self) -> Option<&Candle> {
        self.candles.back()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Ingest a broker OHLC update. Returns the freshly-closed candle when
    /// the update starts a new epoch (i.e. the previously-forming candle is
    /// now closed); returns `None` when the update only refreshes the
    /// currently-forming candle.
    pub fn ingest(&mut self, update: Candle) -> Option<Candle> {
        debug_assert_eq!(update.granularity_seconds, self.timeframe.seconds());

        match self.candles.back() {
            Some(last) if last.epoch_open == update.epoch_open => {
                *self.candles.back_mut().unwrap() = update;
                None
            }
            Some(last) => {
                let closed = *last;
                self.candles.push_back(update);
                if self.candles.len() > MAX_CANDLES {
                    self.candles.pop_front();
                }
                Some(closed)
            }
            None => {
                self.candles.push_back(update);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(epoch: i64, close: Decimal) -> Candle {
        Candle {
            epoch_open: epoch,
            granularity_seconds: 60,
            open: close,
            high: close,
            low: close,
            close,
        }
    }

    #[test]
    fn forming_candle_overwritten_in_place() {
        let mut book = CandleBook::new(Timeframe::S60);
        assert!(book.ingest(candle(0, dec!(100))).is_none());
        assert!(book.ingest(candle(0, dec!(101))).is_none());
        assert_eq!(book.len(), 1);
        assert_eq!(book.forming().unwrap().close, dec!(101));
    }

    #[test]
    fn new_epoch_closes_previous_candle() {
        let mut book = CandleBook::new(Timeframe::S60);
        book.ingest(candle(0, dec!(100)));
        let closed = book.ingest(candle(60, dec!(105)));
        assert_eq!(closed.unwrap().close, dec!(100));
        assert_eq!(book.len(), 2);
        assert_eq!(book.closed_candles().count(), 1);
        assert_eq!(book.forming().unwrap().epoch_open, 60);
    }

    #[test]
    fn trims_to_max_length() {
        let mut book = CandleBook::new(Timeframe::S60);
        for i in 0..(MAX_CANDLES as i64 + 10) {
            book.ingest(candle(i * 60, dec!(1)));
        }
        assert_eq!(book.len(), MAX_CANDLES);
    }
}
