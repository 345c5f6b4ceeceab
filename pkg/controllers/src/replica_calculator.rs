use chrono::{DateTime, Utc};
use pkg_client::{MetricsProvider, PodLister};
use pkg_constants::autoscaler::TOLERANCE_PERCENT;
use pkg_types::pod::PodSnapshot;
use pkg_types::selector::LabelSelector;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::CalculatorError;

/// Outcome of one sizing computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaEstimate {
    pub replicas: i32,
    /// Utilization of the pods that reported usage, in percent of their limits
    pub utilization: i32,
    /// When the usage samples were taken
    pub timestamp: DateTime<Utc>,
}

/// Turns memory usage and limits into a desired replica count.
pub struct ReplicaCalculator {
    metrics: Arc<dyn MetricsProvider>,
    pods: Arc<dyn PodLister>,
}

impl ReplicaCalculator {
    pub fn new(metrics: Arc<dyn MetricsProvider>, pods: Arc<dyn PodLister>) -> Self {
        Self { metrics, pods }
    }

    pub async fn get_replicas(
        &self,
        current_replicas: i32,
        target_utilization: i32,
        namespace: &str,
        workload: &str,
        selector: &LabelSelector,
    ) -> Result<ReplicaEstimate, CalculatorError> {
        let metrics = self
            .metrics
            .memory_usage(namespace, workload)
            .await
            .map_err(|cause| CalculatorError::MetricsUnavailable {
                workload: format!("{}/{}", namespace, workload),
                cause,
            })?;
        let pods = self
            .pods
            .list(namespace, selector)
            .await
            .map_err(|cause| CalculatorError::PodListFailed { cause })?;

        let (replicas, utilization) =
            calculate(current_replicas, target_utilization, &pods, &metrics.usage)?;
        Ok(ReplicaEstimate {
            replicas,
            utilization,
            timestamp: metrics.timestamp,
        })
    }
}

/// Usage and limit of one pod, in bytes.
#[derive(Debug, Clone, Copy)]
struct PodUsage {
    usage: u64,
    limit: u64,
}

fn utilization(pods: &[PodUsage]) -> i64 {
    let (usage, limit) = pods.iter().fold((0u128, 0u128), |(u, l), p| {
        (u + p.usage as u128, l + p.limit as u128)
    });
    if limit == 0 {
        return 0;
    }
    (usage * 100 / limit).min(i64::MAX as u128) as i64
}

/// `|1 - utilization/target| <= tolerance`, in integer percent.
fn within_tolerance(utilization: i64, target: i64) -> bool {
    (utilization - target).abs() * 100 <= target * TOLERANCE_PERCENT
}

/// `ceil(utilization / target * count)`.
fn scaled_replicas(utilization: i64, target: i64, count: i64) -> i32 {
    let replicas = (utilization * count + target - 1) / target;
    replicas.clamp(0, i32::MAX as i64) as i32
}

/// Desired replica count and observed utilization for `pods` given `usage`
/// (pod name to bytes).
///
/// Pods without a usage sample and pods that are not ready are rebalanced
/// pessimistically: if counting them could reverse or cancel the proposed
/// change, the current replica count is kept.
pub fn calculate(
    current_replicas: i32,
    target_utilization: i32,
    pods: &[PodSnapshot],
    usage: &HashMap<String, u64>,
) -> Result<(i32, i32), CalculatorError> {
    if pods.is_empty() {
        return Err(CalculatorError::NoPods);
    }

    let mut valid = Vec::new();
    let mut missing = Vec::new();
    let mut unready = Vec::new();
    for pod in pods {
        let mut limit = 0u64;
        for c in &pod.containers {
            match c.memory_limit_bytes {
                Some(l) if l > 0 => limit = limit.saturating_add(l),
                _ => {
                    return Err(CalculatorError::MissingMemoryLimit {
                        pod: pod.name.clone(),
                        container: c.name.clone(),
                    });
                }
            }
        }

        if !pod.is_ready() {
            unready.push(PodUsage { usage: 0, limit });
            continue;
        }
        match usage.get(&pod.name) {
            Some(&bytes) => valid.push(PodUsage { usage: bytes, limit }),
            None => missing.push(PodUsage { usage: 0, limit }),
        }
    }

    if valid.is_empty() {
        return Err(CalculatorError::NoValidMetrics);
    }

    let target = i64::from(target_utilization.max(1));
    let observed = utilization(&valid);
    let valid_count = valid.len() as i64;
    let direction = observed.cmp(&target);
    let observed_pct = observed.min(i32::MAX as i64) as i32;

    let rebalance_unready = !unready.is_empty() && direction == Ordering::Greater;
    if missing.is_empty() && !rebalance_unready {
        if within_tolerance(observed, target) {
            return Ok((current_replicas, observed_pct));
        }
        return Ok((scaled_replicas(observed, target, valid_count), observed_pct));
    }

    let mut adjusted = valid;
    match direction {
        // Would the pods we cannot see still push us up if they were idle?
        Ordering::Greater => adjusted.extend(missing.iter().copied()),
        // Would they still let us shrink if they were at their limits?
        Ordering::Less => adjusted.extend(missing.iter().map(|p| PodUsage {
            usage: p.limit,
            limit: p.limit,
        })),
        Ordering::Equal => {}
    }
    if rebalance_unready {
        adjusted.extend(unready.iter().copied());
    }

    let rebalanced = utilization(&adjusted);
    debug!(
        "Rebalanced utilization {}% -> {}% ({} missing, {} unready)",
        observed,
        rebalanced,
        missing.len(),
        unready.len()
    );
    if within_tolerance(rebalanced, target) || rebalanced.cmp(&target) != direction {
        return Ok((current_replicas, observed_pct));
    }
    Ok((scaled_replicas(rebalanced, target, valid_count), observed_pct))
}
