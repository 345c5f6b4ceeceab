use pkg_types::meta::Resource;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::cache::LocalCache;

/// Kind of change recorded for an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaType {
    Added,
    Updated,
    Deleted,
    /// Re-emitted by a full re-list
    Synced,
}

impl std::fmt::Display for DeltaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeltaType::Added => write!(f, "Added"),
            DeltaType::Updated => write!(f, "Updated"),
            DeltaType::Deleted => write!(f, "Deleted"),
            DeltaType::Synced => write!(f, "Synced"),
        }
    }
}

/// A single recorded change plus the object snapshot it carried.
#[derive(Debug, Clone)]
pub struct Delta<T> {
    pub delta_type: DeltaType,
    pub object: T,
}

/// Key-partitioned FIFO of deltas.
///
/// Deltas for one key accumulate in arrival order until the consumer pops them
/// as one batch; keys are served in the order they first became pending.
/// Safe for one producer and one consumer.
pub struct DeltaQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    /// Objects the consumer has already applied; consulted by `replace`
    known: Arc<LocalCache<T>>,
}

struct QueueState<T> {
    items: HashMap<String, Vec<Delta<T>>>,
    order: VecDeque<String>,
    closed: bool,
}

impl<T: Resource> DeltaQueue<T> {
    pub fn new(known: Arc<LocalCache<T>>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: HashMap::new(),
                order: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            known,
        }
    }

    pub async fn add(&self, obj: T) {
        self.push(DeltaType::Added, obj).await;
    }

    pub async fn update(&self, obj: T) {
        self.push(DeltaType::Updated, obj).await;
    }

    pub async fn delete(&self, obj: T) {
        self.push(DeltaType::Deleted, obj).await;
    }

    /// Apply a full listing: every listed object gets a `Synced` delta, and every
    /// object known locally (applied or still pending) but missing from the
    /// listing gets a `Deleted` delta carrying its last known snapshot.
    pub async fn replace(&self, list: Vec<T>) {
        let listed: HashSet<String> = list.iter().map(Resource::key).collect();
        let known = self.known.list().await;

        let mut state = self.state.lock().await;
        for obj in list {
            state.push(DeltaType::Synced, obj);
        }

        let mut vanished: HashMap<String, T> = HashMap::new();
        for obj in known {
            let key = obj.key();
            if !listed.contains(&key) {
                vanished.insert(key, obj);
            }
        }
        for (key, deltas) in &state.items {
            if listed.contains(key) {
                continue;
            }
            if let Some(last) = deltas.last() {
                vanished.insert(key.clone(), last.object.clone());
            }
        }
        for (_, obj) in vanished {
            state.push(DeltaType::Deleted, obj);
        }
        drop(state);
        self.notify.notify_one();
    }

    /// Wait for the next batch. Returns `None` once cancelled, or once closed
    /// and drained.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<(String, Vec<Delta<T>>)> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                while let Some(key) = state.order.pop_front() {
                    if let Some(deltas) = state.items.remove(&key) {
                        return Some((key, deltas));
                    }
                }
                if state.closed {
                    return None;
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = notified => {}
            }
        }
    }

    /// Stop accepting deltas; `pop` returns `None` once the backlog is drained.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_one();
    }

    /// Number of keys with pending deltas.
    pub async fn len(&self) -> usize {
        self.state.lock().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn push(&self, delta_type: DeltaType, obj: T) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.push(delta_type, obj);
        drop(state);
        self.notify.notify_one();
    }
}

impl<T: Resource> QueueState<T> {
    fn push(&mut self, delta_type: DeltaType, object: T) {
        let key = object.key();
        if !self.items.contains_key(&key) {
            self.order.push_back(key.clone());
        }
        let deltas = self.items.entry(key).or_default();
        // Two deletions in a row carry no extra information
        if delta_type == DeltaType::Deleted
            && deltas
                .last()
                .is_some_and(|d| d.delta_type == DeltaType::Deleted)
        {
            return;
        }
        deltas.push(Delta { delta_type, object });
    }
}
