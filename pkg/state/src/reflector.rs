use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use pkg_constants::state::RELIST_RETRY_SECS;
use pkg_types::meta::{ObjectList, Resource};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::delta::DeltaQueue;
use crate::watch::{EventType, WatchEvent};

/// Stream of watch events; an `Err` item ends the watch.
pub type WatchStream<T> = BoxStream<'static, anyhow::Result<WatchEvent<T>>>;

/// A remote collection that can be listed and then watched from the listed version.
#[async_trait]
pub trait ListerWatcher<T>: Send + Sync {
    async fn list(&self) -> anyhow::Result<ObjectList<T>>;

    async fn watch(&self, resource_version: &str) -> anyhow::Result<WatchStream<T>>;
}

/// Why a single list+watch cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleEnd {
    Cancelled,
    /// The resync period elapsed; re-list right away
    Resync,
    /// The server closed the watch; re-list after the retry delay
    WatchClosed,
}

/// Mirrors a remote collection into a [`DeltaQueue`] with a list-then-watch loop.
pub struct Reflector<T> {
    name: String,
    lw: Arc<dyn ListerWatcher<T>>,
    queue: Arc<DeltaQueue<T>>,
    resync_period: Duration,
    retry_period: Duration,
}

impl<T: Resource> Reflector<T> {
    /// `resync_period` of zero disables the periodic re-list.
    pub fn new(
        name: &str,
        lw: Arc<dyn ListerWatcher<T>>,
        queue: Arc<DeltaQueue<T>>,
        resync_period: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            lw,
            queue,
            resync_period,
            retry_period: Duration::from_secs(RELIST_RETRY_SECS),
        }
    }

    pub fn with_retry_period(mut self, retry_period: Duration) -> Self {
        self.retry_period = retry_period;
        self
    }

    /// Run until `cancel` fires. Failures are logged and retried, never returned.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Reflector {} started (resync={}s)",
            self.name,
            self.resync_period.as_secs()
        );
        loop {
            let end = match self.list_and_watch(&cancel).await {
                Ok(end) => end,
                Err(e) => {
                    warn!("Reflector {}: list/watch failed: {:#}", self.name, e);
                    CycleEnd::WatchClosed
                }
            };
            match end {
                CycleEnd::Cancelled => break,
                CycleEnd::Resync => continue,
                CycleEnd::WatchClosed => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_period) => {}
                    }
                }
            }
        }
        info!("Reflector {} stopped", self.name);
    }

    async fn list_and_watch(&self, cancel: &CancellationToken) -> anyhow::Result<CycleEnd> {
        let list = tokio::select! {
            _ = cancel.cancelled() => return Ok(CycleEnd::Cancelled),
            list = self.lw.list() => list?,
        };
        let resource_version = list.resource_version().to_string();
        debug!(
            "Reflector {}: listed {} objects at version {}",
            self.name,
            list.items.len(),
            resource_version
        );
        self.queue.replace(list.items).await;

        let period = self.resync_period;
        let resync = async move {
            if period.is_zero() {
                std::future::pending::<()>().await
            } else {
                tokio::time::sleep(period).await
            }
        };
        tokio::pin!(resync);

        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Ok(CycleEnd::Cancelled),
            stream = self.lw.watch(&resource_version) => stream?,
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(CycleEnd::Cancelled),
                _ = &mut resync => {
                    debug!("Reflector {}: resync period elapsed, re-listing", self.name);
                    return Ok(CycleEnd::Resync);
                }
                event = stream.next() => match event {
                    None => {
                        debug!("Reflector {}: watch stream closed", self.name);
                        return Ok(CycleEnd::WatchClosed);
                    }
                    Some(Err(e)) => return Err(e.context("watch stream failed")),
                    Some(Ok(event)) => match event.event_type {
                        EventType::Added => self.queue.add(event.object).await,
                        EventType::Modified => self.queue.update(event.object).await,
                        EventType::Deleted => self.queue.delete(event.object).await,
                    },
                },
            }
        }
    }
}
