//! In-process change bus.
//!
//! Topic-based, synchronous, no replay. Handlers run inline on the emitting
//! task in subscription order. A panicking handler is caught and logged so
//! the remaining handlers still run and the emitter is never unwound.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use subsync_schemas::{BusEvent, Topic};

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    handlers: Mutex<BTreeMap<Topic, Vec<(u64, Handler)>>>,
}

impl BusInner {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<Topic, Vec<(u64, Handler)>>> {
        self.handlers.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: BTreeMap<&'static str, usize> = self
            .inner
            .lock()
            .iter()
            .map(|(t, hs)| (t.as_str(), hs.len()))
            .collect();
        f.debug_struct("EventBus").field("subscribers", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .lock()
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic,
            id,
        }
    }

    /// Deliver `event` to every handler of its topic. Returns how many
    /// handlers completed without panicking.
    pub fn emit(&self, event: &BusEvent) -> usize {
        let topic = event.topic();
        // Snapshot so handlers may subscribe/unsubscribe without deadlocking.
        let handlers: Vec<Handler> = self
            .inner
            .lock()
            .get(&topic)
            .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for h in handlers {
            match catch_unwind(AssertUnwindSafe(|| h(event))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::warn!(
                    topic = topic.as_str(),
                    user_id = event.user_id(),
                    "bus handler panicked; continuing with remaining handlers"
                ),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner.lock().get(&topic).map_or(0, Vec::len)
    }
}

/// Handle returned by [`EventBus::subscribe`]. Dropping it keeps the
/// subscription; call [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    topic: Topic,
    id: u64,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Returns `false` if the handler was already gone (or the bus dropped).
    pub fn unsubscribe(self) -> bool {
        let Some(bus) = self.bus.upgrade() else {
            return false;
        };
        let mut map = bus.lock();
        let Some(hs) = map.get_mut(&self.topic) else {
            return false;
        };
        let before = hs.len();
        hs.retain(|(id, _)| *id != self.id);
        before != hs.len()
    }
}
