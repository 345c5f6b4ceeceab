use pkg_types::meta::Resource;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::broadcast;

/// Type of event in the watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

/// A single watch event: `{"type": "ADDED", "object": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent<T> {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub object: T,
}

/// Event paired with the sequence number it was recorded under.
pub type SequencedEvent<T> = (u64, WatchEvent<T>);

/// The requested version has already been evicted from the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TooOld {
    pub requested: u64,
    pub oldest_available: u64,
}

/// In-memory event log that stamps every mutation with a monotonic sequence number.
/// The sequence number doubles as the object's resource version.
#[derive(Clone)]
pub struct EventLog<T> {
    inner: Arc<RwLock<EventLogInner<T>>>,
    sender: broadcast::Sender<SequencedEvent<T>>,
}

struct EventLogInner<T> {
    seq: u64,
    /// Ring buffer of recent events (capped)
    events: VecDeque<SequencedEvent<T>>,
    max_events: usize,
    /// Highest sequence number evicted from the ring buffer
    evicted_through: u64,
}

impl<T: Resource> EventLog<T> {
    /// Create a new event log keeping `max_events` recent events for replay.
    pub fn new(max_events: usize, channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            inner: Arc::new(RwLock::new(EventLogInner {
                seq: 0,
                events: VecDeque::with_capacity(max_events),
                max_events: max_events.max(1),
                evicted_through: 0,
            })),
            sender,
        }
    }

    /// Record a mutation. The object is stamped with the new resource version
    /// and returned.
    pub async fn emit(&self, event_type: EventType, mut object: T) -> T {
        let mut inner = self.inner.write().await;
        inner.seq += 1;
        let seq = inner.seq;
        object.meta_mut().resource_version = Some(seq.to_string());

        if inner.events.len() >= inner.max_events
            && let Some((evicted, _)) = inner.events.pop_front()
        {
            inner.evicted_through = evicted;
        }
        let event = WatchEvent {
            event_type,
            object: object.clone(),
        };
        inner.events.push_back((seq, event.clone()));
        // Nobody watching is fine
        let _ = self.sender.send((seq, event));
        object
    }

    /// Get the current sequence number.
    pub async fn current_seq(&self) -> u64 {
        self.inner.read().await.seq
    }

    /// Get all events recorded after `from_seq`, or [`TooOld`] if some of them
    /// were already evicted.
    pub async fn events_since(&self, from_seq: u64) -> Result<Vec<SequencedEvent<T>>, TooOld> {
        let inner = self.inner.read().await;
        if from_seq < inner.evicted_through {
            return Err(TooOld {
                requested: from_seq,
                oldest_available: inner.evicted_through,
            });
        }
        Ok(inner
            .events
            .iter()
            .filter(|(seq, _)| *seq > from_seq)
            .cloned()
            .collect())
    }

    /// Subscribe to receive new events as they are emitted.
    pub fn subscribe(&self) -> broadcast::Receiver<SequencedEvent<T>> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_types::autoscaler::{Autoscaler, AutoscalerSpec};

    fn hpa(name: &str) -> Autoscaler {
        Autoscaler::new("default", name, AutoscalerSpec::default())
    }

    #[tokio::test]
    async fn emit_stamps_resource_version() {
        let log = EventLog::new(8, 8);
        let a = log.emit(EventType::Added, hpa("a")).await;
        let b = log.emit(EventType::Added, hpa("b")).await;
        assert_eq!(a.metadata.resource_version.as_deref(), Some("1"));
        assert_eq!(b.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(log.current_seq().await, 2);

        let since = log.events_since(1).await.unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].1.object.name(), "b");
    }

    #[tokio::test]
    async fn evicted_history_is_too_old() {
        let log = EventLog::new(2, 8);
        for name in ["a", "b", "c", "d"] {
            log.emit(EventType::Added, hpa(name)).await;
        }
        // seq 1 and 2 were evicted; 3 and 4 remain
        assert!(log.events_since(0).await.is_err());
        assert!(log.events_since(1).await.is_err());
        assert_eq!(log.events_since(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn subscribers_see_live_events() {
        let log = EventLog::new(8, 8);
        let mut rx = log.subscribe();
        log.emit(EventType::Deleted, hpa("a")).await;
        let (seq, event) = rx.recv().await.unwrap();
        assert_eq!(seq, 1);
        assert_eq!(event.event_type, EventType::Deleted);
    }

    #[test]
    fn wire_format_matches_watch_lines() {
        let event = WatchEvent {
            event_type: EventType::Modified,
            object: hpa("a"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "MODIFIED");
        assert_eq!(json["object"]["metadata"]["name"], "a");
    }
}
