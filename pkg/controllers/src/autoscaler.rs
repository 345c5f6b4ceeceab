use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use pkg_client::{EventRecorder, ScaleAccessor};
use pkg_constants::autoscaler::{
    DOWNSCALE_FORBIDDEN_WINDOW_SECS, SCALE_UP_LIMIT_FACTOR, SCALE_UP_LIMIT_MINIMUM,
    UPSCALE_FORBIDDEN_WINDOW_SECS,
};
use pkg_state::informer::{Informer, ResourceEventHandler};
use pkg_state::reflector::ListerWatcher;
use pkg_state::store::AutoscalerStore;
use pkg_types::autoscaler::{Autoscaler, AutoscalerStatus};
use pkg_types::event::{Severity, reason};
use pkg_types::scale::ScaleTarget;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ReconcileError;
use crate::replica_calculator::{ReplicaCalculator, ReplicaEstimate};

/// What a completed reconcile pass decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Replicas the workload reported
    pub observed: i32,
    /// Replicas recorded as desired (equal to `observed` unless rescaled)
    pub desired: i32,
    pub utilization: i32,
    pub rescaled: bool,
}

/// Memory-driven autoscaler controller.
/// Sizes each target workload from its pods' memory utilization.
pub struct AutoscalerController {
    store: Arc<dyn AutoscalerStore>,
    scales: Arc<dyn ScaleAccessor>,
    calculator: ReplicaCalculator,
    recorder: Arc<dyn EventRecorder>,
}

impl AutoscalerController {
    pub fn new(
        store: Arc<dyn AutoscalerStore>,
        scales: Arc<dyn ScaleAccessor>,
        calculator: ReplicaCalculator,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            store,
            scales,
            calculator,
            recorder,
        }
    }

    /// Watch autoscalers through `lw` and reconcile every change until `cancel` fires.
    pub fn start(
        self: Arc<Self>,
        lw: Arc<dyn ListerWatcher<Autoscaler>>,
        resync_period: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "AutoscalerController started (resync={}s)",
                resync_period.as_secs()
            );
            let informer = Informer::new("autoscalers", lw, resync_period);
            informer.run(self, cancel).await;
            info!("AutoscalerController stopped");
        })
    }

    pub async fn reconcile(&self, hpa: &Autoscaler) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconcile_at(hpa, Utc::now()).await
    }

    /// One reconcile pass, with `now` as the wall-clock time of the pass.
    pub async fn reconcile_at(
        &self,
        hpa: &Autoscaler,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let mut hpa = hpa.clone();
        let corrections = hpa.spec.validate();
        for correction in &corrections {
            self.recorder.record(
                &hpa,
                Severity::Normal,
                reason::VALIDATION_POLICY,
                correction.to_string(),
            );
        }
        let reference = hpa.target_reference();
        let target = hpa.spec.scale_target_ref.clone();

        let scale = match self
            .scales
            .get(hpa.namespace(), &target.kind, &target.name)
            .await
        {
            Ok(scale) => scale,
            Err(cause) => {
                // Spec corrections are persisted even when the target is unreachable
                if !corrections.is_empty() {
                    let prev = hpa.status.clone();
                    let _ = self
                        .update_status(
                            &mut hpa,
                            prev.current_replicas,
                            prev.desired_replicas,
                            prev.current_utilization_percentage,
                            None,
                        )
                        .await;
                }
                warn!(
                    "Failed to get scale subresource of {}: {:#}",
                    reference, cause
                );
                return Err(ReconcileError::DependencyFetchFailed {
                    what: format!("scale subresource of {}", reference),
                    cause,
                });
            }
        };

        let current = scale.observed_replicas;
        let min = hpa.spec.min_replicas();
        let max = hpa.spec.max_replicas;
        let mut desired = current;
        let mut utilization = hpa.status.current_utilization_percentage;
        let mut rescale_reason = "";

        let rescale = if scale.declared_replicas == 0 {
            // Scaled to zero on purpose; leave it alone
            false
        } else if current > max {
            desired = max;
            rescale_reason = "Current number is greater than .spec.maxReplicas";
            true
        } else if current < min {
            desired = min;
            rescale_reason = "Current number is less than .spec.minReplicas";
            true
        } else {
            let estimate = match self.compute_replicas(&hpa, &scale, now).await {
                Ok(estimate) => estimate,
                Err(err) => {
                    let prev = hpa.status.clone();
                    let _ = self
                        .update_status(
                            &mut hpa,
                            current,
                            prev.desired_replicas,
                            prev.current_utilization_percentage,
                            None,
                        )
                        .await;
                    warn!("Failed to calculate desired replicas of {}: {}", reference, err);
                    return Err(err);
                }
            };

            rescale_reason = match estimate.replicas.cmp(&current) {
                std::cmp::Ordering::Greater => "Utilization is greater than target",
                std::cmp::Ordering::Less => "Utilization is less than target",
                std::cmp::Ordering::Equal => "",
            };
            desired = estimate.replicas.max(min).min(max);
            if desired > current {
                desired = desired.min(scale_up_limit(current));
            }
            utilization = estimate.utilization;
            should_scale(hpa.status.last_scale_time, current, desired, estimate.timestamp)
        };

        if rescale {
            if let Err(cause) = self
                .scales
                .update(hpa.namespace(), &target.kind, &target.name, desired)
                .await
            {
                self.recorder.record(
                    &hpa,
                    Severity::Warning,
                    reason::FAILED_RESCALE,
                    format!(
                        "New size: {}; reason: {}; error: {:#}",
                        desired, rescale_reason, cause
                    ),
                );
                error!("Failed to rescale {}: {:#}", reference, cause);
                return Err(ReconcileError::PersistFailed {
                    what: format!("rescale {}", reference),
                    cause,
                });
            }
            self.recorder.record(
                &hpa,
                Severity::Normal,
                reason::SUCCESSFUL_RESCALE,
                format!("New size: {}; reason: {}", desired, rescale_reason),
            );
            info!(
                "Successful rescale of {}, old size: {}, new size: {}, reason: {}",
                hpa.name(),
                current,
                desired,
                rescale_reason
            );
        } else {
            desired = current;
        }

        self.update_status(&mut hpa, current, desired, utilization, rescale.then_some(now))
            .await?;

        Ok(ReconcileOutcome {
            observed: current,
            desired,
            utilization,
            rescaled: rescale,
        })
    }

    async fn compute_replicas(
        &self,
        hpa: &Autoscaler,
        scale: &ScaleTarget,
        now: DateTime<Utc>,
    ) -> Result<ReplicaEstimate, ReconcileError> {
        let current = scale.observed_replicas;
        if scale.selector.is_empty() {
            let msg = "selector is required";
            self.recorder.record(
                hpa,
                Severity::Warning,
                reason::SELECTOR_REQUIRED,
                msg.to_string(),
            );
            return Err(ReconcileError::NoUsableMetrics(msg.to_string()));
        }

        let estimate = match self
            .calculator
            .get_replicas(
                current,
                hpa.spec.target_utilization(),
                hpa.namespace(),
                &hpa.spec.scale_target_ref.name,
                &scale.selector,
            )
            .await
        {
            Ok(estimate) => estimate,
            Err(err) => {
                let since = hpa
                    .status
                    .last_scale_time
                    .or(hpa.metadata.creation_timestamp);
                let settled = since.is_none_or(|t| {
                    now > t + TimeDelta::seconds(UPSCALE_FORBIDDEN_WINDOW_SECS)
                });
                let (severity, why) = if settled {
                    (Severity::Warning, reason::FAILED_GET_METRICS)
                } else {
                    (Severity::Normal, reason::METRICS_NOT_AVAILABLE_YET)
                };
                self.recorder.record(hpa, severity, why, err.to_string());
                return Err(err.into());
            }
        };

        if estimate.replicas != current {
            self.recorder.record(
                hpa,
                Severity::Normal,
                reason::DESIRED_REPLICAS_COMPUTED,
                format!(
                    "Computed the desired num of replicas: {} (avgUtil: {}, current replicas: {})",
                    estimate.replicas, estimate.utilization, current
                ),
            );
        }
        Ok(estimate)
    }

    /// Persist the observed state, keeping the previous scale time unless `scaled_at` is set.
    async fn update_status(
        &self,
        hpa: &mut Autoscaler,
        current: i32,
        desired: i32,
        utilization: i32,
        scaled_at: Option<DateTime<Utc>>,
    ) -> Result<(), ReconcileError> {
        hpa.status = AutoscalerStatus {
            observed_generation: hpa.metadata.generation,
            last_scale_time: scaled_at.or(hpa.status.last_scale_time),
            current_replicas: current,
            desired_replicas: desired,
            current_utilization_percentage: utilization,
        };

        if let Err(cause) = self.store.update(hpa).await {
            self.recorder.record(
                hpa,
                Severity::Warning,
                reason::FAILED_UPDATE_STATUS,
                format!("{:#}", cause),
            );
            warn!(
                "Failed to update status of {}/{}: {:#}",
                hpa.namespace(),
                hpa.name(),
                cause
            );
            return Err(ReconcileError::PersistFailed {
                what: format!("update status of {}/{}", hpa.namespace(), hpa.name()),
                cause,
            });
        }
        debug!("Updated status of {}/{}", hpa.namespace(), hpa.name());
        Ok(())
    }

    async fn handle(&self, hpa: &Autoscaler) {
        match self.reconcile(hpa).await {
            Ok(outcome) => debug!(
                "Reconciled {}/{}: observed={} desired={} utilization={}% rescaled={}",
                hpa.namespace(),
                hpa.name(),
                outcome.observed,
                outcome.desired,
                outcome.utilization,
                outcome.rescaled
            ),
            Err(e) => warn!(
                "Reconcile of {}/{} failed: {}",
                hpa.namespace(),
                hpa.name(),
                e
            ),
        }
    }
}

/// Whether a move from `current` to `desired` may happen at `at`, given the
/// time of the previous rescale.
pub fn should_scale(
    last_scale_time: Option<DateTime<Utc>>,
    current: i32,
    desired: i32,
    at: DateTime<Utc>,
) -> bool {
    if desired == current {
        return false;
    }
    let Some(last) = last_scale_time else {
        return true;
    };

    let elapsed = at - last;
    if desired < current && elapsed >= TimeDelta::seconds(DOWNSCALE_FORBIDDEN_WINDOW_SECS) {
        return true;
    }
    if desired > current && elapsed >= TimeDelta::seconds(UPSCALE_FORBIDDEN_WINDOW_SECS) {
        return true;
    }
    debug!(
        "Rescale {} -> {} suppressed, last scale {}s ago",
        current,
        desired,
        elapsed.num_seconds()
    );
    false
}

/// Largest replica count a single pass may grow `current` to.
pub fn scale_up_limit(current: i32) -> i32 {
    SCALE_UP_LIMIT_FACTOR
        .saturating_mul(current)
        .max(SCALE_UP_LIMIT_MINIMUM)
}

#[async_trait]
impl ResourceEventHandler<Autoscaler> for AutoscalerController {
    async fn on_add(&self, hpa: &Autoscaler) -> anyhow::Result<()> {
        self.handle(hpa).await;
        Ok(())
    }

    async fn on_update(&self, _old: &Autoscaler, new: &Autoscaler) -> anyhow::Result<()> {
        self.handle(new).await;
        Ok(())
    }

    async fn on_delete(&self, hpa: &Autoscaler) -> anyhow::Result<()> {
        info!("Autoscaler {}/{} deleted", hpa.namespace(), hpa.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeMetrics, FakePods, FakeRecorder, FakeScale};
    use pkg_state::store::{AutoscalerListWatch, MemoryAutoscalerStore};
    use pkg_types::autoscaler::{AutoscalerSpec, CrossVersionObjectReference};
    use pkg_types::pod::{ContainerLimits, PodPhase, PodSnapshot};
    use pkg_types::selector::{self, LabelSelector};
    use std::collections::HashMap;

    struct Harness {
        store: MemoryAutoscalerStore,
        scales: Arc<FakeScale>,
        metrics: Arc<FakeMetrics>,
        recorder: Arc<FakeRecorder>,
        controller: Arc<AutoscalerController>,
    }

    fn pods(n: usize) -> Vec<PodSnapshot> {
        (0..n)
            .map(|i| PodSnapshot {
                name: format!("web-{}", i),
                phase: PodPhase::Running,
                ready: true,
                containers: vec![ContainerLimits {
                    name: "app".to_string(),
                    memory_limit_bytes: Some(1000),
                }],
            })
            .collect()
    }

    fn uniform(n: usize, bytes: u64) -> HashMap<String, u64> {
        (0..n).map(|i| (format!("web-{}", i), bytes)).collect()
    }

    fn app_selector() -> LabelSelector {
        selector::parse("app=web").unwrap()
    }

    /// `replicas` running pods, each using `bytes` of a 1000-byte limit.
    fn harness(replicas: i32, bytes: u64) -> Harness {
        let store = MemoryAutoscalerStore::new();
        let scales = Arc::new(FakeScale::new(ScaleTarget {
            declared_replicas: replicas,
            observed_replicas: replicas,
            selector: app_selector(),
        }));
        let n = replicas.max(0) as usize;
        let metrics = Arc::new(FakeMetrics::new(uniform(n, bytes)));
        let recorder = Arc::new(FakeRecorder::default());
        let calculator = ReplicaCalculator::new(metrics.clone(), Arc::new(FakePods::new(pods(n))));
        let controller = Arc::new(AutoscalerController::new(
            Arc::new(store.clone()),
            scales.clone(),
            calculator,
            recorder.clone(),
        ));
        Harness {
            store,
            scales,
            metrics,
            recorder,
            controller,
        }
    }

    fn spec(min: Option<i32>, max: i32, target: Option<i32>) -> AutoscalerSpec {
        AutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                kind: "Deployment".to_string(),
                name: "web".to_string(),
                api_version: None,
            },
            min_replicas: min,
            max_replicas: max,
            target_utilization_percentage: target,
        }
    }

    async fn create(h: &Harness, spec: AutoscalerSpec, status: AutoscalerStatus) -> Autoscaler {
        let mut hpa = Autoscaler::new("prod", "web", spec);
        hpa.status = status;
        h.store.create(&hpa).await.unwrap()
    }

    async fn stored(h: &Harness) -> Autoscaler {
        h.store.get("prod", "web").await.unwrap().unwrap()
    }

    #[test]
    fn should_scale_rules() {
        let now = Utc::now();
        assert!(!should_scale(None, 3, 3, now));
        assert!(!should_scale(Some(now - TimeDelta::hours(1)), 3, 3, now));
        assert!(should_scale(None, 3, 4, now));
        assert!(should_scale(None, 3, 2, now));

        let recent = Some(now - TimeDelta::seconds(UPSCALE_FORBIDDEN_WINDOW_SECS));
        assert!(should_scale(recent, 3, 4, now));
        assert!(!should_scale(recent, 3, 2, now));

        let old = Some(now - TimeDelta::seconds(DOWNSCALE_FORBIDDEN_WINDOW_SECS));
        assert!(should_scale(old, 3, 2, now));

        let fresh = Some(now - TimeDelta::seconds(10));
        assert!(!should_scale(fresh, 3, 4, now));
    }

    #[test]
    fn scale_up_limit_has_floor() {
        assert_eq!(scale_up_limit(0), 4);
        assert_eq!(scale_up_limit(1), 4);
        assert_eq!(scale_up_limit(2), 4);
        assert_eq!(scale_up_limit(5), 10);
    }

    #[tokio::test]
    async fn scales_up_and_records_status() {
        // 2 pods at 100% against a 50% target
        let h = harness(2, 1000);
        let hpa = create(&h, spec(Some(1), 10, Some(50)), AutoscalerStatus::default()).await;
        let now = h.metrics.timestamp;

        let outcome = h.controller.reconcile_at(&hpa, now).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome {
                observed: 2,
                desired: 4,
                utilization: 100,
                rescaled: true
            }
        );
        assert_eq!(h.scales.updates(), vec![4]);

        let status = stored(&h).await.status;
        assert_eq!(status.current_replicas, 2);
        assert_eq!(status.desired_replicas, 4);
        assert_eq!(status.current_utilization_percentage, 100);
        assert_eq!(status.last_scale_time, Some(now));
        assert_eq!(status.observed_generation, Some(1));

        let reasons = h.recorder.reasons();
        assert!(reasons.contains(&reason::DESIRED_REPLICAS_COMPUTED.to_string()));
        assert!(reasons.contains(&reason::SUCCESSFUL_RESCALE.to_string()));
    }

    #[tokio::test]
    async fn scale_up_is_capped_per_pass() {
        // 2 pods at 150% against 50% would ask for 6
        let h = harness(2, 1500);
        let hpa = create(&h, spec(Some(1), 10, Some(50)), AutoscalerStatus::default()).await;

        let outcome = h.controller.reconcile_at(&hpa, h.metrics.timestamp).await.unwrap();
        assert_eq!(outcome.desired, 4);
        assert_eq!(h.scales.updates(), vec![4]);
    }

    #[tokio::test]
    async fn recent_rescale_suppresses_change() {
        let h = harness(2, 1000);
        let last = h.metrics.timestamp - TimeDelta::seconds(60);
        let status = AutoscalerStatus {
            last_scale_time: Some(last),
            ..Default::default()
        };
        let hpa = create(&h, spec(Some(1), 10, Some(50)), status).await;

        let outcome = h.controller.reconcile_at(&hpa, h.metrics.timestamp).await.unwrap();
        assert!(!outcome.rescaled);
        assert_eq!(outcome.desired, 2);
        assert!(h.scales.updates().is_empty());

        let status = stored(&h).await.status;
        assert_eq!(status.desired_replicas, 2);
        assert_eq!(status.last_scale_time, Some(last));
    }

    #[tokio::test]
    async fn steady_pass_changes_nothing() {
        // 3 pods right at the 50% target
        let h = harness(3, 500);
        let last = h.metrics.timestamp - TimeDelta::hours(1);
        let status = AutoscalerStatus {
            observed_generation: Some(1),
            last_scale_time: Some(last),
            current_replicas: 3,
            desired_replicas: 3,
            current_utilization_percentage: 50,
        };
        let hpa = create(&h, spec(Some(1), 10, Some(50)), status).await;

        let outcome = h.controller.reconcile_at(&hpa, h.metrics.timestamp).await.unwrap();
        assert!(!outcome.rescaled);

        let after = stored(&h).await;
        assert_eq!(after.status.last_scale_time, Some(last));
        assert_eq!(after.metadata.resource_version, hpa.metadata.resource_version);
        assert!(h.recorder.reasons().is_empty());
    }

    #[tokio::test]
    async fn stopped_workload_is_left_alone() {
        let h = harness(0, 0);
        h.scales.set(ScaleTarget {
            declared_replicas: 0,
            observed_replicas: 0,
            selector: app_selector(),
        });
        let hpa = create(&h, spec(Some(2), 10, Some(50)), AutoscalerStatus::default()).await;

        let outcome = h.controller.reconcile(&hpa).await.unwrap();
        assert!(!outcome.rescaled);
        assert_eq!(outcome.desired, 0);
        assert!(h.scales.updates().is_empty());
    }

    #[tokio::test]
    async fn bounds_are_enforced_despite_recent_rescale() {
        let h = harness(12, 500);
        let status = AutoscalerStatus {
            last_scale_time: Some(Utc::now()),
            ..Default::default()
        };
        let hpa = create(&h, spec(Some(1), 10, Some(50)), status).await;

        let outcome = h.controller.reconcile(&hpa).await.unwrap();
        assert!(outcome.rescaled);
        assert_eq!(outcome.desired, 10);
        assert_eq!(h.scales.updates(), vec![10]);
    }

    #[tokio::test]
    async fn invalid_spec_is_healed_even_without_target() {
        let h = harness(2, 1000);
        h.scales.fail_get();
        let hpa = create(&h, spec(Some(0), 0, Some(150)), AutoscalerStatus::default()).await;

        let err = h.controller.reconcile(&hpa).await.unwrap_err();
        assert!(matches!(err, ReconcileError::DependencyFetchFailed { .. }));

        let healed = stored(&h).await.spec;
        assert_eq!(healed.min_replicas, Some(1));
        assert_eq!(healed.max_replicas, 5);
        assert_eq!(healed.target_utilization_percentage, Some(80));
        assert_eq!(
            h.recorder.reasons(),
            vec![reason::VALIDATION_POLICY.to_string(); 3]
        );
    }

    #[tokio::test]
    async fn metrics_failure_is_soft_during_startup() {
        let h = harness(2, 1000);
        h.metrics.fail();
        let hpa = create(&h, spec(Some(1), 10, Some(50)), AutoscalerStatus::default()).await;
        let created = hpa.metadata.creation_timestamp.unwrap();

        let err = h.controller.reconcile_at(&hpa, created).await.unwrap_err();
        assert!(matches!(err, ReconcileError::DependencyFetchFailed { .. }));
        assert_eq!(
            h.recorder.last(),
            Some((Severity::Normal, reason::METRICS_NOT_AVAILABLE_YET.to_string()))
        );
        assert_eq!(stored(&h).await.status.current_replicas, 2);

        let hpa = stored(&h).await;
        let later = created + TimeDelta::minutes(10);
        h.controller.reconcile_at(&hpa, later).await.unwrap_err();
        assert_eq!(
            h.recorder.last(),
            Some((Severity::Warning, reason::FAILED_GET_METRICS.to_string()))
        );
    }

    #[tokio::test]
    async fn empty_selector_is_rejected() {
        let h = harness(2, 1000);
        h.scales.set(ScaleTarget {
            declared_replicas: 2,
            observed_replicas: 2,
            selector: LabelSelector::new(),
        });
        let hpa = create(&h, spec(Some(1), 10, Some(50)), AutoscalerStatus::default()).await;

        let err = h.controller.reconcile(&hpa).await.unwrap_err();
        assert!(matches!(err, ReconcileError::NoUsableMetrics(_)));
        assert!(
            h.recorder
                .reasons()
                .contains(&reason::SELECTOR_REQUIRED.to_string())
        );
    }

    #[tokio::test]
    async fn failed_rescale_does_not_advance_status() {
        let h = harness(2, 1000);
        h.scales.fail_update();
        let hpa = create(&h, spec(Some(1), 10, Some(50)), AutoscalerStatus::default()).await;

        let err = h.controller.reconcile_at(&hpa, h.metrics.timestamp).await.unwrap_err();
        assert!(matches!(err, ReconcileError::PersistFailed { .. }));
        assert_eq!(
            h.recorder.last(),
            Some((Severity::Warning, reason::FAILED_RESCALE.to_string()))
        );
        let after = stored(&h).await;
        assert_eq!(after.status, AutoscalerStatus::default());
    }

    #[tokio::test]
    async fn stale_snapshot_reports_failed_status_update() {
        let h = harness(3, 500);
        let hpa = create(&h, spec(Some(1), 10, Some(50)), AutoscalerStatus::default()).await;
        let mut newer = hpa.clone();
        newer.spec.max_replicas = 8;
        h.store.update(&newer).await.unwrap();

        let err = h.controller.reconcile(&hpa).await.unwrap_err();
        assert!(matches!(err, ReconcileError::PersistFailed { .. }));
        assert_eq!(
            h.recorder.last(),
            Some((Severity::Warning, reason::FAILED_UPDATE_STATUS.to_string()))
        );
    }

    #[tokio::test]
    async fn watches_store_and_scales_new_autoscalers() {
        let h = harness(2, 1000);
        let cancel = CancellationToken::new();
        let lw = Arc::new(AutoscalerListWatch::new(
            Arc::new(h.store.clone()),
            None,
            LabelSelector::new(),
        ));
        let task = h
            .controller
            .clone()
            .start(lw, Duration::from_secs(0), cancel.clone());

        create(&h, spec(Some(1), 10, Some(50)), AutoscalerStatus::default()).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while h.scales.updates().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(h.scales.updates()[0], 4);

        cancel.cancel();
        task.await.unwrap();
    }
}
