pub mod state;
pub mod train_detector;

pub use state::RiskState;
