pub mod daily_stat;
pub mod trade_record;

pub use daily_stat::DailyStat;
pub use trade_record::{TradeRecord, TradeStatus};
