pub mod candle_book;
pub mod indicators;
pub mod market_state;
pub mod timeframe;

pub use candle_book::{Candle, CandleBook};
pub use indicators::IndicatorSet;
pub use market_state::MarketState;
pub use timeframe::Timeframe;
