pub mod correlator;
pub mod event_bus;
pub mod link;
pub mod observability;
pub mod persistence;

pub use event_bus::EventBus;
