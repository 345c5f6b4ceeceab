use async_trait::async_trait;
use chrono::Utc;
use pkg_types::autoscaler::Autoscaler;
use pkg_types::event::{Notification, Severity};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::EventRecorder;
use crate::api::ApiClient;

/// Destination of recorded notifications.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &Notification) -> anyhow::Result<()>;
}

/// Posts notifications as cluster Events under a component name.
pub struct ClusterEventSink {
    client: ApiClient,
    component: String,
}

impl ClusterEventSink {
    pub fn new(client: ApiClient, component: &str) -> Self {
        Self {
            client,
            component: component.to_string(),
        }
    }
}

#[async_trait]
impl EventSink for ClusterEventSink {
    async fn publish(&self, event: &Notification) -> anyhow::Result<()> {
        self.client.create_event(event, &self.component).await
    }
}

/// [`EventRecorder`] that logs each notification and hands it to a background
/// publisher. Never blocks the caller; a full backlog drops the notification.
pub struct EventBroadcaster {
    tx: mpsc::Sender<Notification>,
}

impl EventBroadcaster {
    /// Spawn the publisher task. It exits once every broadcaster handle is dropped.
    pub fn start(
        sink: Arc<dyn EventSink>,
        capacity: usize,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Notification>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = sink.publish(&event).await {
                    warn!(
                        "Failed to publish event {} for {}/{}: {:#}",
                        event.reason,
                        event.involved_object.namespace,
                        event.involved_object.name,
                        e
                    );
                }
            }
            debug!("Event broadcaster stopped");
        });
        (Self { tx }, handle)
    }
}

impl EventRecorder for EventBroadcaster {
    fn record(&self, object: &Autoscaler, severity: Severity, reason: &str, message: String) {
        match severity {
            Severity::Normal => info!(
                "{}/{}: {}: {}",
                object.namespace(),
                object.name(),
                reason,
                message
            ),
            Severity::Warning => warn!(
                "{}/{}: {}: {}",
                object.namespace(),
                object.name(),
                reason,
                message
            ),
        }

        let event = Notification {
            involved_object: object.object_reference(),
            severity,
            reason: reason.to_string(),
            message,
            timestamp: Utc::now(),
        };
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Event backlog full, dropping {} event", event.reason)
            }
            Err(TrySendError::Closed(_)) => debug!("Event publisher gone"),
        }
    }
}
