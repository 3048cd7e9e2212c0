//! Typed events published to the optional operator broadcast sink
//! (spec.md §6, "Broadcast sink"). This is a closed enumeration — no dynamic
//! event names — dispatched through `infrastructure::event_bus::EventBus`.

use rust_decimal::Decimal;

use crate::domain::types::TriggerReason;

#[derive(Debug, Clone)]
pub enum TradingEvent {
    TradeOpened {
        contract_id: String,
        symbol: String,
        entry_price: Decimal,
        reason: TriggerReason,
    },
    TradeClosed {
        contract_id: String,
        exit_price: Decimal,
        profit: Decimal,
        balance: Decimal,
    },
    BalanceChanged {
        balance: Decimal,
    },
    StatusChanged {
        status: String,
    },
}

/// A fire-and-forget observer of `TradingEvent`s. Receivers register at
/// construction; the bus never blocks publication on a slow listener's logic
/// beyond the synchronous call itself.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &TradingEvent);
}

/// Default listener that just logs — useful when no real operator broadcast
/// sink is wired up (e.g. local runs).
pub struct LoggingListener;

impl EventListener for LoggingListener {
    fn on_event(&self, event: &TradingEvent) {
        tracing::info!(?event, "trading event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl EventListener for Noop {
        fn on_event(&self, _event: &TradingEvent) {}
    }

    #[test]
    fn logging_listener_accepts_all_variants() {
        let listener = LoggingListener;
        listener.on_event(&TradingEvent::BalanceChanged {
            balance: Decimal::ZERO,
        });
        listener.on_event(&TradingEvent::StatusChanged {
            status: "connected".to_string(),
        });
    }
}
