//! Rolling tick buffer, per-timeframe candle arrays, incremental indicators
//! (spec.md §4.3). Owned exclusively by the task `run` spawns — the single
//! event-processing context spec.md §5 requires — and driven by the
//! Correlator's `tick`/`ohlc` stream subscriptions. No direct teacher file
//! aggregates candles this way (the teacher's `TimeframeCandle` rolls 1-min
//! bars up into higher timeframes; here the broker streams each timeframe
//! natively), so the ingestion logic is original to this module while the
//! emitter shape (typed events, subscribers registered once) follows
//! `infrastructure::event_bus::EventBus`.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::market::candle_book::{Candle, CandleBook};
use crate::domain::market::indicators::IndicatorSet;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::types::Tick;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum MarketEvent {
    Tick(Tick),
    CandleClosed { timeframe: Timeframe, candle: Candle },
    IndicatorsUpdated(IndicatorSet),
}

pub struct MarketBook {
    primary: Timeframe,
    books: HashMap<Timeframe, CandleBook>,
    indicators: IndicatorSet,
    current_price: Option<Decimal>,
    events_tx: broadcast::Sender<MarketEvent>,
}

impl MarketBook {
    pub fn new(primary: Timeframe) -> Self {
        let books = Timeframe::all()
            .into_iter()
            .map(|tf| (tf, CandleBook::new(tf)))
            .collect();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            primary,
            books,
            indicators: IndicatorSet::default(),
            current_price: None,
            events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.events_tx.subscribe()
    }

    pub fn current_price(&self) -> Option<Decimal> {
        self.current_price
    }

    pub fn indicators(&self) -> IndicatorSet {
        self.indicators
    }

    /// Seeds a timeframe's book from the initial `ticks_history` response
    /// (spec.md §4.3, subscriptions issued on every reconnect). `candles`
    /// must be ordered oldest-first with the last entry still forming.
    pub fn seed_historical(&mut self, timeframe: Timeframe, candles: Vec<Candle>) {
        let book = self.books.entry(timeframe).or_insert_with(|| CandleBook::new(timeframe));
        *book = CandleBook::new(timeframe);
        for candle in candles {
            book.ingest(candle);
        }
        if timeframe == self.primary {
            self.recompute_indicators();
        }
    }

    pub fn ingest_tick(&mut self, tick: Tick) {
        self.current_price = Some(tick.price);
        let _ = self.events_tx.send(MarketEvent::Tick(tick));
    }

    pub fn ingest_ohlc(&mut self, timeframe: Timeframe, update: Candle) {
        let Some(book) = self.books.get_mut(&timeframe) else {
            warn!(?timeframe, "ohlc update for unknown timeframe");
            return;
        };
        if let Some(closed) = book.ingest(update) {
            let _ = self.events_tx.send(MarketEvent::CandleClosed {
                timeframe,
                candle: closed,
            });
            if timeframe == self.primary {
                self.recompute_indicators();
            }
        }
    }

    fn recompute_indicators(&mut self) {
        let book = self
            .books
            .get(&self.primary)
            .expect("primary timeframe is always present");
        let closes: Vec<Decimal> = book.closed_candles().map(|c| c.close).collect();
        self.indicators = IndicatorSet::recompute(&closes);
        let _ = self.events_tx.send(MarketEvent::IndicatorsUpdated(self.indicators));
    }

    /// Spawns the single task that owns this `MarketBook` for its lifetime,
    /// feeding it from the Correlator's `tick`/`ohlc` streams.
    pub fn spawn(
        mut self,
        mut tick_rx: broadcast::Receiver<Value>,
        mut ohlc_rx: broadcast::Receiver<Value>,
        mut candles_rx: broadcast::Receiver<Value>,
    ) -> (tokio::task::JoinHandle<()>, broadcast::Receiver<MarketEvent>) {
        let events_rx = self.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    tick = tick_rx.recv() => {
                        match tick {
                            Ok(value) => {
                                if let Some(tick) = parse_tick_frame(&value) {
                                    self.ingest_tick(tick);
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "market book dropped tick frames under load");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    ohlc = ohlc_rx.recv() => {
                        match ohlc {
                            Ok(value) => {
                                if let Some((timeframe, candle)) = parse_ohlc_frame(&value) {
                                    self.ingest_ohlc(timeframe, candle);
                                } else {
                                    debug!("dropping unparseable ohlc frame");
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "market book dropped ohlc frames under load");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    // `ticks_history` responses re-seed a timeframe's book on
                    // every reconnect's resubscription (spec.md §4.3).
                    candles = candles_rx.recv() => {
                        match candles {
                            Ok(value) => {
                                if let Some((timeframe, history)) = parse_candles_history(&value) {
                                    self.seed_historical(timeframe, history);
                                } else {
                                    debug!("dropping unparseable candles history frame");
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "market book dropped candles history frames under load");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });
        (handle, events_rx)
    }
}

/// `StreamKind::Tick` frame shape: `{"msg_type":"tick","tick":{"epoch":...,"quote":...}}`.
pub fn parse_tick_frame(value: &Value) -> Option<Tick> {
    let tick = value.get("tick")?;
    let epoch = tick.get("epoch")?.as_i64()?;
    let price = tick.get("quote")?.as_f64().and_then(Decimal::try_from).ok()?;
    Some(Tick { epoch, price })
}

/// `StreamKind::Ohlc` frame shape: `{"msg_type":"ohlc","ohlc":{open_time, granularity, open, high, low, close}}`.
pub fn parse_ohlc_frame(value: &Value) -> Option<(Timeframe, Candle)> {
    let ohlc = value.get("ohlc")?;
    let granularity = ohlc.get("granularity")?.as_i64()?;
    let timeframe = Timeframe::from_str_seconds(granularity)?;
    let epoch_open = ohlc.get("open_time")?.as_i64()?;
    let open = parse_decimal_field(ohlc, "open")?;
    let high = parse_decimal_field(ohlc, "high")?;
    let low = parse_decimal_field(ohlc, "low")?;
    let close = parse_decimal_field(ohlc, "close")?;
    Some((
        timeframe,
        Candle {
            epoch_open,
            granularity_seconds: granularity,
            open,
            high,
            low,
            close,
        },
    ))
}

/// `StreamKind::Candles` response shape: the `ticks_history` call's answer,
/// `{"candles":[{epoch,open,high,low,close}, ...], "echo_req":{"granularity":...}}`.
pub fn parse_candles_history(value: &Value) -> Option<(Timeframe, Vec<Candle>)> {
    let granularity = value.get("echo_req")?.get("granularity")?.as_i64()?;
    let timeframe = Timeframe::from_str_seconds(granularity)?;
    let candles = value.get("candles")?.as_array()?;
    let parsed = candles
        .iter()
        .filter_map(|c| {
            Some(Candle {
                epoch_open: c.get("epoch")?.as_i64()?,
                granularity_seconds: granularity,
                open: parse_decimal_field(c, "open")?,
                high: parse_decimal_field(c, "high")?,
                low: parse_decimal_field(c, "low")?,
                close: parse_decimal_field(c, "close")?,
            })
        })
        .collect();
    Some((timeframe, parsed))
}

fn parse_decimal_field(value: &Value, field: &str) -> Option<Decimal> {
    match value.get(field)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64().and_then(Decimal::try_from).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn parses_tick_frame() {
        let value = json!({"msg_type": "tick", "tick": {"epoch": 1000, "quote": "104.50"}});
        let tick = parse_tick_frame(&value).unwrap();
        assert_eq!(tick.epoch, 1000);
        assert_eq!(tick.price, dec!(104.5));
    }

    #[test]
    fn parses_ohlc_frame() {
        let value = json!({
            "msg_type": "ohlc",
            "ohlc": {
                "open_time": 60,
                "granularity": 60,
                "open": "100.0",
                "high": "101.0",
                "low": "99.5",
                "close": "100.5",
            }
        });
        let (timeframe, candle) = parse_ohlc_frame(&value).unwrap();
        assert_eq!(timeframe, Timeframe::S60);
        assert_eq!(candle.close, dec!(100.5));
    }

    #[test]
    fn ingest_tick_updates_current_price_and_publishes() {
        let mut book = MarketBook::new(Timeframe::S60);
        let mut events = book.subscribe();
        book.ingest_tick(Tick { epoch: 1, price: dec!(100) });
        assert_eq!(book.current_price(), Some(dec!(100)));
        assert!(matches!(events.try_recv().unwrap(), MarketEvent::Tick(_)));
    }

    #[test]
    fn candle_close_on_primary_timeframe_recomputes_indicators() {
        let mut book = MarketBook::new(Timeframe::S60);
        // 26 candles: the last one is still forming, leaving exactly 25
        // closed closes behind it for SMA25 to become defined.
        let closes: Vec<Decimal> = (0..26).map(|_| dec!(10)).collect();
        book.seed_historical(
            Timeframe::S60,
            closes
                .iter()
                .enumerate()
                .map(|(i, c)| Candle {
                    epoch_open: i as i64 * 60,
                    granularity_seconds: 60,
                    open: *c,
                    high: *c,
                    low: *c,
                    close: *c,
                })
                .collect(),
        );
        assert!(book.indicators().sma25.is_some());
    }

    #[test]
    fn candle_close_on_non_primary_timeframe_leaves_indicators_untouched() {
        let mut book = MarketBook::new(Timeframe::S60);
        book.ingest_ohlc(
            Timeframe::H1,
            Candle {
                epoch_open: 0,
                granularity_seconds: 3600,
                open: dec!(10),
                high: dec!(10),
                low: dec!(10),
                close: dec!(10),
            },
        );
        book.ingest_ohlc(
            Timeframe::H1,
            Candle {
                epoch_open: 3600,
                granularity_seconds: 3600,
                open: dec!(10),
                high: dec!(10),
                low: dec!(10),
                close: dec!(10),
            },
        );
        assert!(book.indicators().sma25.is_none());
    }
}
