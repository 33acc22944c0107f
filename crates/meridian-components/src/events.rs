//! Synchronous component event bus.

use crate::types::ComponentEvent;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// Listener invoked with the component name, the event, and event data.
pub type EventListener = Arc<dyn Fn(&str, ComponentEvent, &serde_json::Value) + Send + Sync>;

/// Multi-listener event dispatch.
///
/// Delivery is synchronous in the emitting call, in registration order per
/// event; a panicking listener is contained and logged, and delivery
/// continues with the next listener.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<AHashMap<ComponentEvent, Vec<EventListener>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read();
        f.debug_struct("EventBus")
            .field("events", &listeners.len())
            .field(
                "listeners",
                &listeners.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for an event.
    pub fn add_listener(&self, event: ComponentEvent, listener: EventListener) {
        self.listeners.write().entry(event).or_default().push(listener);
    }

    /// Remove every listener registered for an event.
    pub fn remove_listeners(&self, event: ComponentEvent) {
        self.listeners.write().remove(&event);
    }

    /// Emit an event to every listener, in registration order.
    pub fn emit(&self, component: &str, event: ComponentEvent, data: &serde_json::Value) {
        let listeners = {
            let map = self.listeners.read();
            map.get(&event).cloned().unwrap_or_default()
        };
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(component, event, data))).is_err() {
                error!(component, ?event, "event listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn listeners_receive_events_in_order() {
        let bus = EventBus::new();
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let sink = log.clone();
            bus.add_listener(
                ComponentEvent::StateChanged,
                Arc::new(move |name, _, _| {
                    sink.lock().push(format!("{tag}:{name}"));
                }),
            );
        }

        bus.emit("camera", ComponentEvent::StateChanged, &serde_json::Value::Null);
        assert_eq!(*log.lock(), vec!["first:camera", "second:camera"]);
    }

    #[test]
    fn unrelated_events_are_not_delivered() {
        let bus = EventBus::new();
        let log: Arc<Mutex<Vec<ComponentEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        bus.add_listener(
            ComponentEvent::PostLoad,
            Arc::new(move |_, event, _| sink.lock().push(event)),
        );

        bus.emit("x", ComponentEvent::PreLoad, &serde_json::Value::Null);
        assert!(log.lock().is_empty());
        bus.emit("x", ComponentEvent::PostLoad, &serde_json::Value::Null);
        assert_eq!(*log.lock(), vec![ComponentEvent::PostLoad]);
    }

    #[test]
    fn panicking_listener_does_not_poison_delivery() {
        let bus = EventBus::new();
        bus.add_listener(
            ComponentEvent::Error,
            Arc::new(|_, _, _| panic!("listener bug")),
        );
        let delivered = Arc::new(Mutex::new(false));
        let sink = delivered.clone();
        bus.add_listener(
            ComponentEvent::Error,
            Arc::new(move |_, _, _| *sink.lock() = true),
        );

        bus.emit("x", ComponentEvent::Error, &serde_json::Value::Null);
        assert!(*delivered.lock());
    }

    #[test]
    fn remove_listeners_clears_event() {
        let bus = EventBus::new();
        let count = Arc::new(Mutex::new(0usize));
        let sink = count.clone();
        bus.add_listener(
            ComponentEvent::ConfigChanged,
            Arc::new(move |_, _, _| *sink.lock() += 1),
        );

        bus.emit("x", ComponentEvent::ConfigChanged, &serde_json::Value::Null);
        bus.remove_listeners(ComponentEvent::ConfigChanged);
        bus.emit("x", ComponentEvent::ConfigChanged, &serde_json::Value::Null);
        assert_eq!(*count.lock(), 1);
    }
}
