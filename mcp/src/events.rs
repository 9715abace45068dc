//! Event Bus (component H, pub/sub half): synchronous, best-effort, in-process.

use std::{panic::AssertUnwindSafe, sync::Arc};

use parking_lot::RwLock;
use tracing::error;

#[derive(Debug, Clone)]
pub enum Event {
    ServerAdded { name: String },
    ServerRemoved { name: String },
    ToolsUpdated { service: String },
    StatusChanged { service: String, connected: bool },
    ServerRollback { name: String },
    EndpointStatusChanged { url: String, connected: bool },
}

pub type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

/// Dispatches synchronously on the publisher's task. Subscribers that panic
/// are caught and logged rather than poisoning the bus for everyone else.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Subscriber) {
        self.subscribers.write().push(subscriber);
    }

    pub fn publish(&self, event: Event) {
        for subscriber in self.subscribers.read().iter() {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| subscriber(&event)));
            if let Err(panic) = result {
                error!(?panic, "event bus subscriber panicked");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatches_to_every_subscriber() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&count);
        bus.subscribe(Arc::new(move |_event: &Event| {
            c1.fetch_add(1, Ordering::Relaxed);
        }));
        let c2 = Arc::clone(&count);
        bus.subscribe(Arc::new(move |_event: &Event| {
            c2.fetch_add(1, Ordering::Relaxed);
        }));

        bus.publish(Event::ServerAdded { name: "x".into() });

        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn a_panicking_subscriber_does_not_stop_the_rest() {
        let bus = EventBus::new();
        bus.subscribe(Arc::new(|_event: &Event| panic!("boom")));
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        bus.subscribe(Arc::new(move |_event: &Event| {
            ran_clone.fetch_add(1, Ordering::Relaxed);
        }));

        bus.publish(Event::ServerAdded { name: "x".into() });

        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }
}
