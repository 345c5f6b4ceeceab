use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use futures_util::stream;
use pkg_constants::state::{WATCH_CHANNEL_CAPACITY, WATCH_HISTORY_CAPACITY};
use pkg_types::autoscaler::Autoscaler;
use pkg_types::meta::{ListOptions, ObjectList, Resource};
use pkg_types::selector;
use pkg_types::validate::validate_autoscaler;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use uuid::Uuid;

use crate::reflector::{ListerWatcher, WatchStream};
use crate::watch::{EventLog, EventType, WatchEvent};

/// Failures a store reports for well-formed requests.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    /// The write carried a stale resource version.
    #[error("conflict on {key}: expected version {expected}, stored version is {actual}")]
    Conflict {
        key: String,
        expected: String,
        actual: String,
    },

    /// The watch cursor is older than the retained history; re-list.
    #[error("resource version {requested} is too old (oldest available {oldest})")]
    TooOld { requested: String, oldest: u64 },
}

/// Authoritative store of autoscaler objects.
///
/// `namespace: None` addresses all namespaces.
#[async_trait]
pub trait AutoscalerStore: Send + Sync {
    async fn create(&self, hpa: &Autoscaler) -> anyhow::Result<Autoscaler>;

    /// Replace the stored object. A set `resourceVersion` must match the stored one.
    async fn update(&self, hpa: &Autoscaler) -> anyhow::Result<Autoscaler>;

    async fn delete(&self, namespace: &str, name: &str) -> anyhow::Result<()>;

    async fn get(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Autoscaler>>;

    async fn list(
        &self,
        namespace: Option<&str>,
        opts: &ListOptions,
    ) -> anyhow::Result<ObjectList<Autoscaler>>;

    /// Stream changes after `opts.resource_version`.
    async fn watch(
        &self,
        namespace: Option<&str>,
        opts: &ListOptions,
    ) -> anyhow::Result<WatchStream<Autoscaler>>;
}

/// Lists and watches autoscalers of one namespace (or all) matching a selector.
pub struct AutoscalerListWatch {
    store: Arc<dyn AutoscalerStore>,
    namespace: Option<String>,
    selector: selector::LabelSelector,
}

impl AutoscalerListWatch {
    pub fn new(
        store: Arc<dyn AutoscalerStore>,
        namespace: Option<String>,
        selector: selector::LabelSelector,
    ) -> Self {
        Self {
            store,
            namespace,
            selector,
        }
    }
}

#[async_trait]
impl ListerWatcher<Autoscaler> for AutoscalerListWatch {
    async fn list(&self) -> anyhow::Result<ObjectList<Autoscaler>> {
        let opts = ListOptions {
            selector: self.selector.clone(),
            resource_version: None,
        };
        self.store.list(self.namespace.as_deref(), &opts).await
    }

    async fn watch(&self, resource_version: &str) -> anyhow::Result<WatchStream<Autoscaler>> {
        let opts = ListOptions {
            selector: self.selector.clone(),
            resource_version: Some(resource_version.to_string()),
        };
        self.store.watch(self.namespace.as_deref(), &opts).await
    }
}

/// In-memory [`AutoscalerStore`] with a replayable watch history.
#[derive(Clone)]
pub struct MemoryAutoscalerStore {
    objects: Arc<RwLock<BTreeMap<String, Autoscaler>>>,
    log: EventLog<Autoscaler>,
}

impl MemoryAutoscalerStore {
    pub fn new() -> Self {
        Self::with_history(WATCH_HISTORY_CAPACITY)
    }

    /// Keep only `max_events` events for watch replay.
    pub fn with_history(max_events: usize) -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            log: EventLog::new(max_events, WATCH_CHANNEL_CAPACITY),
        }
    }
}

impl Default for MemoryAutoscalerStore {
    fn default() -> Self {
        Self::new()
    }
}

fn object_key(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", namespace, name)
    }
}

fn in_scope(hpa: &Autoscaler, namespace: Option<&str>, opts: &ListOptions) -> bool {
    namespace.is_none_or(|ns| hpa.metadata.namespace == ns)
        && selector::matches(&opts.selector, &hpa.metadata.labels)
}

fn parse_version(rv: &str) -> anyhow::Result<u64> {
    rv.parse()
        .map_err(|_| anyhow::anyhow!("invalid resource version '{}'", rv))
}

#[async_trait]
impl AutoscalerStore for MemoryAutoscalerStore {
    async fn create(&self, hpa: &Autoscaler) -> anyhow::Result<Autoscaler> {
        validate_autoscaler(hpa)?;
        let key = hpa.key();
        let mut objects = self.objects.write().await;
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key).into());
        }

        let mut obj = hpa.clone();
        obj.metadata.uid = Some(Uuid::new_v4().to_string());
        obj.metadata.generation = Some(1);
        obj.metadata.creation_timestamp = Some(Utc::now());
        let obj = self.log.emit(EventType::Added, obj).await;
        objects.insert(key, obj.clone());
        Ok(obj)
    }

    async fn update(&self, hpa: &Autoscaler) -> anyhow::Result<Autoscaler> {
        validate_autoscaler(hpa)?;
        let key = hpa.key();
        let mut objects = self.objects.write().await;
        let Some(current) = objects.get(&key) else {
            return Err(StoreError::NotFound(key).into());
        };

        if let Some(expected) = hpa.resource_version()
            && Some(expected) != current.resource_version()
        {
            return Err(StoreError::Conflict {
                key,
                expected: expected.to_string(),
                actual: current.resource_version().unwrap_or_default().to_string(),
            }
            .into());
        }

        let mut obj = hpa.clone();
        obj.metadata.uid = current.metadata.uid.clone();
        obj.metadata.creation_timestamp = current.metadata.creation_timestamp;
        obj.metadata.resource_version = current.metadata.resource_version.clone();
        obj.metadata.generation = if obj.spec != current.spec {
            Some(current.metadata.generation.unwrap_or(0) + 1)
        } else {
            current.metadata.generation
        };

        if obj == *current {
            debug!("update of {} changed nothing", key);
            return Ok(obj);
        }

        let obj = self.log.emit(EventType::Modified, obj).await;
        objects.insert(key, obj.clone());
        Ok(obj)
    }

    async fn delete(&self, namespace: &str, name: &str) -> anyhow::Result<()> {
        let key = object_key(namespace, name);
        let mut objects = self.objects.write().await;
        let Some(obj) = objects.remove(&key) else {
            return Err(StoreError::NotFound(key).into());
        };
        self.log.emit(EventType::Deleted, obj).await;
        Ok(())
    }

    async fn get(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Autoscaler>> {
        let key = object_key(namespace, name);
        Ok(self.objects.read().await.get(&key).cloned())
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        opts: &ListOptions,
    ) -> anyhow::Result<ObjectList<Autoscaler>> {
        let objects = self.objects.read().await;
        let items = objects
            .values()
            .filter(|hpa| in_scope(hpa, namespace, opts))
            .cloned()
            .collect();
        let rv = self.log.current_seq().await;
        Ok(ObjectList::new(rv.to_string(), items))
    }

    async fn watch(
        &self,
        namespace: Option<&str>,
        opts: &ListOptions,
    ) -> anyhow::Result<WatchStream<Autoscaler>> {
        // Holding the read lock keeps writers out between replay and subscribe.
        let objects = self.objects.read().await;
        let from = match opts.resource_version.as_deref() {
            Some(rv) if !rv.is_empty() => parse_version(rv)?,
            _ => self.log.current_seq().await,
        };
        let rx = self.log.subscribe();
        let replay = self.log.events_since(from).await.map_err(|e| StoreError::TooOld {
            requested: e.requested.to_string(),
            oldest: e.oldest_available,
        })?;
        drop(objects);

        let ns = namespace.map(str::to_string);
        let opts = opts.clone();
        let keep = move |event: &WatchEvent<Autoscaler>| {
            in_scope(&event.object, ns.as_deref(), &opts)
        };
        let keep_live = keep.clone();

        let replay = stream::iter(
            replay
                .into_iter()
                .map(|(_, event)| event)
                .filter(move |event| keep(event))
                .map(Ok),
        );
        let live = BroadcastStream::new(rx).filter_map(move |received| {
            let item = match received {
                Ok((_, event)) if keep_live(&event) => Some(Ok(event)),
                Ok(_) => None,
                Err(e) => Some(Err(anyhow::anyhow!("watch fell behind: {}", e))),
            };
            std::future::ready(item)
        });
        Ok(replay.chain(live).boxed())
    }
}
