//! Event bus: type-tagged pub/sub for run lifecycle events.
//! Generalizes a per-run `broadcast::Sender` map into a per-event-type
//! listener list, since observers here care about a stream across
//! runs, not one run's own events.

use std::collections::HashMap;
use std::sync::Arc;

use arena_domain::event::{Event, EventType};
use parking_lot::RwLock;
use tokio::sync::mpsc;

/// A listener is a boxed closure invoked with a reference to the event.
/// Registered listeners run on the bus's background task, never inline
/// with `publish`, so a slow or panicking listener can't stall the
/// engine — observers must never block it.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscribers {
    by_type: HashMap<EventType, Vec<Listener>>,
    all: Vec<Listener>,
}

impl Subscribers {
    fn new() -> Self {
        Self {
            by_type: HashMap::new(),
            all: Vec::new(),
        }
    }
}

/// Async, panic-isolated, order-preserving-per-subscriber pub/sub.
/// `publish` snapshots the listener set under a read lock and hands the
/// event to a background task; `subscribe` takes the write lock only to
/// append.
pub struct EventBus {
    subscribers: Arc<RwLock<Subscribers>>,
    sender: mpsc::UnboundedSender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let subscribers = Arc::new(RwLock::new(Subscribers::new()));
        let (sender, mut receiver) = mpsc::unbounded_channel::<Event>();

        let dispatch_subscribers = subscribers.clone();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let (typed, all) = {
                    let guard = dispatch_subscribers.read();
                    let typed = guard.by_type.get(&event.event_type).cloned().unwrap_or_default();
                    (typed, guard.all.clone())
                };
                for listener in typed.iter().chain(all.iter()) {
                    let listener = listener.clone();
                    let event = event.clone();
                    // Each invocation gets its own task so a panicking
                    // listener can't take down the dispatch loop or
                    // block delivery to the others.
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(&event)));
                    if let Err(panic) = result {
                        let message = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "listener panicked".to_string());
                        tracing::warn!(event_type = ?event.event_type, error = %message, "event bus listener panicked, isolating");
                    }
                }
            }
        });

        Self { subscribers, sender }
    }

    pub fn subscribe(&self, event_type: EventType, listener: Listener) {
        self.subscribers.write().by_type.entry(event_type).or_default().push(listener);
    }

    pub fn subscribe_all(&self, listener: Listener) {
        self.subscribers.write().all.push(listener);
    }

    /// Snapshot-and-return: queues the event for the background
    /// dispatch task and returns immediately without waiting for any
    /// listener to run.
    pub fn publish(&self, event: Event) {
        // An unbounded channel can only fail to send if the receiver
        // task has been dropped, which happens only if the bus itself
        // was dropped — there is no one left to observe the failure.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts an [`EventBus`] to `arena_pipeline::EventSink` so a pipeline
/// execution can publish lifecycle events into it directly.
pub struct EventBusSink {
    bus: Arc<EventBus>,
}

impl EventBusSink {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl arena_pipeline::EventSink for EventBusSink {
    fn emit(&self, event: Event) {
        self.bus.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn subscribe_by_type_only_receives_matching_events() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        bus.subscribe(
            EventType::RunStarted,
            Arc::new(move |_e| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.publish(Event::new(EventType::RunStarted, "r1", "c1"));
        bus.publish(Event::new(EventType::RunCompleted, "r1", "c1"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribe_all_receives_every_event_type() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        bus.subscribe_all(Arc::new(move |_e| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish(Event::new(EventType::RunStarted, "r1", "c1"));
        bus.publish(Event::new(EventType::TurnStarted, "r1", "c1"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_listener_does_not_block_others() {
        let bus = EventBus::new();
        bus.subscribe_all(Arc::new(|_e| panic!("boom")));
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        bus.subscribe_all(Arc::new(move |_e| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish(Event::new(EventType::RunStarted, "r1", "c1"));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
