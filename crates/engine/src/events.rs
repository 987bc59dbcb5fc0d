//! The in-process event bus.
//!
//! Synchronous, typed publish/subscribe. Publication happens while the
//! publisher still holds the world write lock, so subscribers observe
//! events as part of the same atomic mutation; they must therefore be
//! enqueue-only or read-only and never take the world lock themselves.
//! The bus stamps the process-wide monotonic sequence number.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use grimbox_domain::GameEvent;

type Handler = Box<dyn Fn(&GameEvent) + Send + Sync>;

struct Subscription {
    id: u64,
    /// `None` = wildcard: receive every event kind
    kinds: Option<HashSet<&'static str>>,
    handler: Handler,
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    seq: AtomicU64,
    next_subscription: AtomicU64,
    /// Subscriber list has its own lock; never taken together with the
    /// world lock by subscribers
    subscribers: Mutex<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a set of event kinds, or all of them with `None`.
    pub fn subscribe<F>(&self, kinds: Option<&[&'static str]>, handler: F) -> SubscriptionId
    where
        F: Fn(&GameEvent) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let subscription = Subscription {
            id,
            kinds: kinds.map(|list| list.iter().copied().collect()),
            handler: Box::new(handler),
        };
        self.lock_subscribers().push(subscription);
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.lock_subscribers().retain(|sub| sub.id != id.0);
    }

    /// Stamp and deliver one event to every matching subscriber, in
    /// subscription order.
    pub fn publish(&self, event: &mut GameEvent) {
        event.seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let subscribers = self.lock_subscribers();
        for subscription in subscribers.iter() {
            let wants = subscription
                .kinds
                .as_ref()
                .map(|kinds| kinds.contains(event.kind.name()))
                .unwrap_or(true);
            if wants {
                (subscription.handler)(event);
            }
        }
    }

    /// Publish a batch in emission order.
    pub fn publish_all(&self, events: &mut [GameEvent]) {
        for event in events {
            self.publish(event);
        }
    }

    /// The last stamped sequence number.
    pub fn current_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        // a panicking subscriber must not wedge the bus
        self.subscribers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grimbox_domain::{EventKind, Position};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn moved() -> GameEvent {
        GameEvent::new(EventKind::EntityMoved {
            from: Position::new(0, 0, 0),
            to: Position::new(1, 0, 0),
        })
    }

    #[test]
    fn test_sequence_numbers_strictly_increase() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(None, move |event| {
            sink.lock().expect("sink lock").push(event.seq);
        });

        let mut events = vec![moved(), moved(), moved()];
        bus.publish_all(&mut events);

        let seen = seen.lock().expect("sink lock");
        assert_eq!(*seen, vec![1, 2, 3]);
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_kind_filter() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        bus.subscribe(Some(&["entity_removed"]), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&mut moved());
        bus.publish(&mut GameEvent::new(EventKind::EntityRemoved));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delivery_in_publish_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3u8 {
            let sink = order.clone();
            bus.subscribe(None, move |event| {
                sink.lock().expect("sink lock").push((event.seq, tag));
            });
        }
        let mut events = vec![moved(), moved()];
        bus.publish_all(&mut events);

        let order = order.lock().expect("sink lock");
        // all subscribers see event 1 before anyone sees event 2
        assert_eq!(
            *order,
            vec![(1, 0), (1, 1), (1, 2), (2, 0), (2, 1), (2, 2)]
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let id = bus.subscribe(None, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(&mut moved());
        bus.unsubscribe(id);
        bus.publish(&mut moved());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
