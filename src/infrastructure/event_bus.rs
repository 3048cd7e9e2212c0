use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::events::{EventListener, TradingEvent};

/// Fans a `TradingEvent` out to every registered listener (spec.md §6,
/// "Broadcast sink"). Listeners register once at construction and are never
/// removed — this is a closed, append-only subscriber list, not a dynamic
/// pub/sub registry.
pub struct EventBus {
    listeners: Arc<RwLock<Vec<Arc<dyn EventListener>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().await.push(listener);
    }

    pub async fn publish(&self, event: TradingEvent) {
        let listeners = self.listeners.read().await;
        for listener in listeners.iter() {
            listener.on_event(&event);
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.listeners.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::LoggingListener;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        count: Arc<AtomicUsize>,
    }

    impl EventListener for CountingListener {
        fn on_event(&self, _event: &TradingEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn subscriber_count_tracks_registrations() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count().await, 0);
        bus.subscribe(Arc::new(LoggingListener)).await;
        bus.subscribe(Arc::new(LoggingListener)).await;
        assert_eq!(bus.subscriber_count().await, 2);
    }

    #[tokio::test]
    async fn publish_reaches_every_listener() {
        let bus = EventBus::new();
        let count1 = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingListener {
            count: Arc::clone(&count1),
        }))
        .await;
        bus.subscribe(Arc::new(CountingListener {
            count: Arc::clone(&count2),
        }))
        .await;

        bus.publish(TradingEvent::BalanceChanged {
            balance: Decimal::ZERO,
        })
        .await;

        assert_eq!(count1.load(Ordering::SeqCst), 1);
        assert_eq!(count2.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clone_shares_the_listener_list() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();
        bus1.subscribe(Arc::new(LoggingListener)).await;
        assert_eq!(bus2.subscriber_count().await, 1);
    }
}
