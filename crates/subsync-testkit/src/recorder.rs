use std::sync::{Arc, Mutex};

use subsync_runtime::EventBus;
use subsync_schemas::{BusEvent, Topic};

use crate::Journal;

/// Subscribes to every topic and keeps what it saw, in delivery order.
#[derive(Clone, Debug, Default)]
pub struct EventRecorder {
    seen: Arc<Mutex<Vec<BusEvent>>>,
}

impl EventRecorder {
    pub fn attach(bus: &EventBus, journal: Journal) -> Self {
        let rec = Self::default();
        for topic in [Topic::SubscriptionChanged, Topic::CacheCleared] {
            let seen = Arc::clone(&rec.seen);
            let journal = journal.clone();
            bus.subscribe(topic, move |ev| {
                journal.push(ev.topic().as_str());
                seen.lock().unwrap_or_else(|p| p.into_inner()).push(ev.clone());
            });
        }
        rec
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.seen.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.events().iter().map(BusEvent::topic).collect()
    }

    pub fn count(&self, topic: Topic) -> usize {
        self.events().iter().filter(|e| e.topic() == topic).count()
    }
}
