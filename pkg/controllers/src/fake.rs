//! Hand-written collaborators for controller tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pkg_client::{EventRecorder, MetricsProvider, PodLister, PodMetrics, ScaleAccessor};
use pkg_types::autoscaler::Autoscaler;
use pkg_types::event::Severity;
use pkg_types::pod::PodSnapshot;
use pkg_types::scale::ScaleTarget;
use pkg_types::selector::LabelSelector;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct FakeMetrics {
    usage: HashMap<String, u64>,
    pub timestamp: DateTime<Utc>,
    failing: AtomicBool,
}

impl FakeMetrics {
    pub fn new(usage: HashMap<String, u64>) -> Self {
        Self {
            usage,
            timestamp: Utc::now(),
            failing: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let metrics = Self::new(HashMap::new());
        metrics.fail();
        metrics
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetricsProvider for FakeMetrics {
    async fn memory_usage(&self, _namespace: &str, _workload: &str) -> anyhow::Result<PodMetrics> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("metrics backend unreachable");
        }
        Ok(PodMetrics {
            usage: self.usage.clone(),
            timestamp: self.timestamp,
        })
    }
}

pub struct FakePods {
    pods: Vec<PodSnapshot>,
}

impl FakePods {
    pub fn new(pods: Vec<PodSnapshot>) -> Self {
        Self { pods }
    }
}

#[async_trait]
impl PodLister for FakePods {
    async fn list(
        &self,
        _namespace: &str,
        _selector: &LabelSelector,
    ) -> anyhow::Result<Vec<PodSnapshot>> {
        Ok(self.pods.clone())
    }
}

/// Scale subresource whose observed replicas only change through `set`.
pub struct FakeScale {
    target: Mutex<ScaleTarget>,
    updates: Mutex<Vec<i32>>,
    fail_get: AtomicBool,
    fail_update: AtomicBool,
}

impl FakeScale {
    pub fn new(target: ScaleTarget) -> Self {
        Self {
            target: Mutex::new(target),
            updates: Mutex::new(Vec::new()),
            fail_get: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
        }
    }

    pub fn set(&self, target: ScaleTarget) {
        *self.target.lock().unwrap() = target;
    }

    pub fn fail_get(&self) {
        self.fail_get.store(true, Ordering::SeqCst);
    }

    pub fn fail_update(&self) {
        self.fail_update.store(true, Ordering::SeqCst);
    }

    pub fn updates(&self) -> Vec<i32> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScaleAccessor for FakeScale {
    async fn get(&self, _namespace: &str, _kind: &str, _name: &str) -> anyhow::Result<ScaleTarget> {
        if self.fail_get.load(Ordering::SeqCst) {
            anyhow::bail!("scale target not found");
        }
        Ok(self.target.lock().unwrap().clone())
    }

    async fn update(
        &self,
        _namespace: &str,
        _kind: &str,
        _name: &str,
        replicas: i32,
    ) -> anyhow::Result<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            anyhow::bail!("scale update rejected");
        }
        self.target.lock().unwrap().declared_replicas = replicas;
        self.updates.lock().unwrap().push(replicas);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRecorder {
    events: Mutex<Vec<(Severity, String, String)>>,
}

impl FakeRecorder {
    pub fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, reason, _)| reason.clone())
            .collect()
    }

    pub fn last(&self) -> Option<(Severity, String)> {
        self.events
            .lock()
            .unwrap()
            .last()
            .map(|(severity, reason, _)| (*severity, reason.clone()))
    }
}

impl EventRecorder for FakeRecorder {
    fn record(&self, _object: &Autoscaler, severity: Severity, reason: &str, message: String) {
        self.events
            .lock()
            .unwrap()
            .push((severity, reason.to_string(), message));
    }
}
