//! Collaborators the autoscaler controller talks to, plus their cluster adapters.

pub mod api;
pub mod events;
pub mod prometheus;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pkg_types::autoscaler::Autoscaler;
use pkg_types::event::Severity;
use pkg_types::pod::PodSnapshot;
use pkg_types::scale::ScaleTarget;
use pkg_types::selector::LabelSelector;
use std::collections::HashMap;

/// Reads and writes the replica count of a scalable workload.
#[async_trait]
pub trait ScaleAccessor: Send + Sync {
    async fn get(&self, namespace: &str, kind: &str, name: &str) -> anyhow::Result<ScaleTarget>;

    async fn update(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
        replicas: i32,
    ) -> anyhow::Result<()>;
}

/// Lists the pods matching a selector.
#[async_trait]
pub trait PodLister: Send + Sync {
    async fn list(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> anyhow::Result<Vec<PodSnapshot>>;
}

/// Latest memory usage per pod of one workload.
#[derive(Debug, Clone, PartialEq)]
pub struct PodMetrics {
    /// Pod name to bytes in use
    pub usage: HashMap<String, u64>,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn memory_usage(&self, namespace: &str, workload: &str) -> anyhow::Result<PodMetrics>;
}

/// Fire-and-forget sink for notifications about an autoscaler.
pub trait EventRecorder: Send + Sync {
    fn record(&self, object: &Autoscaler, severity: Severity, reason: &str, message: String);
}
