use async_trait::async_trait;
use pkg_types::meta::Resource;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::LocalCache;
use crate::delta::{Delta, DeltaQueue, DeltaType};
use crate::reflector::{ListerWatcher, Reflector};

/// Callbacks invoked by the dispatcher, one at a time, in delta order.
#[async_trait]
pub trait ResourceEventHandler<T>: Send + Sync {
    async fn on_add(&self, obj: &T) -> anyhow::Result<()>;

    async fn on_update(&self, old: &T, new: &T) -> anyhow::Result<()>;

    async fn on_delete(&self, obj: &T) -> anyhow::Result<()>;
}

/// Reflector + delta queue + local cache + dispatcher, wired together.
pub struct Informer<T> {
    name: String,
    cache: Arc<LocalCache<T>>,
    queue: Arc<DeltaQueue<T>>,
    reflector: Reflector<T>,
}

impl<T: Resource> Informer<T> {
    pub fn new(name: &str, lw: Arc<dyn ListerWatcher<T>>, resync_period: Duration) -> Self {
        let cache = Arc::new(LocalCache::new());
        let queue = Arc::new(DeltaQueue::new(cache.clone()));
        let reflector = Reflector::new(name, lw, queue.clone(), resync_period);
        Self {
            name: name.to_string(),
            cache,
            queue,
            reflector,
        }
    }

    pub fn with_retry_period(mut self, retry_period: Duration) -> Self {
        self.reflector = self.reflector.with_retry_period(retry_period);
        self
    }

    /// Read-only view of the local cache.
    pub fn store(&self) -> Arc<LocalCache<T>> {
        self.cache.clone()
    }

    /// Run the reflector and the dispatcher as two tasks until `cancel` fires,
    /// then join both.
    pub async fn run(self, handler: Arc<dyn ResourceEventHandler<T>>, cancel: CancellationToken) {
        info!("Informer {} starting", self.name);
        let reflector = tokio::spawn(self.reflector.run(cancel.clone()));
        let dispatcher = tokio::spawn(dispatch(
            self.name.clone(),
            self.queue.clone(),
            self.cache.clone(),
            handler,
            cancel.clone(),
        ));

        let (reflector, dispatcher) = tokio::join!(reflector, dispatcher);
        if let Err(e) = reflector {
            error!("Informer {}: reflector task failed: {}", self.name, e);
        }
        if let Err(e) = dispatcher {
            error!("Informer {}: dispatcher task failed: {}", self.name, e);
        }
        self.queue.close().await;
        info!("Informer {} stopped", self.name);
    }
}

/// Pop one batch at a time and process it to completion before the next.
async fn dispatch<T: Resource>(
    name: String,
    queue: Arc<DeltaQueue<T>>,
    cache: Arc<LocalCache<T>>,
    handler: Arc<dyn ResourceEventHandler<T>>,
    cancel: CancellationToken,
) {
    while let Some((key, deltas)) = queue.pop(&cancel).await {
        let count = deltas.len();
        if let Err(e) = process_deltas(&cache, handler.as_ref(), deltas).await {
            // At-most-once: the batch is dropped, the next resync re-derives it.
            warn!(
                "Informer {}: dropping {} delta(s) for {}: {:#}",
                name, count, key, e
            );
        }
    }
    debug!("Informer {}: dispatcher exiting", name);
}

/// Fold a batch into the cache, invoking the handler after each step.
pub async fn process_deltas<T: Resource>(
    cache: &LocalCache<T>,
    handler: &dyn ResourceEventHandler<T>,
    deltas: Vec<Delta<T>>,
) -> anyhow::Result<()> {
    for delta in deltas {
        match delta.delta_type {
            DeltaType::Added | DeltaType::Updated | DeltaType::Synced => {
                match cache.upsert(delta.object.clone()).await {
                    Some(old) => handler.on_update(&old, &delta.object).await?,
                    None => handler.on_add(&delta.object).await?,
                }
            }
            DeltaType::Deleted => {
                cache.delete(&delta.object.key()).await;
                handler.on_delete(&delta.object).await?;
            }
        }
    }
    Ok(())
}
