use chrono::{DateTime, Utc};
use pkg_constants::api::{GROUP, KIND, VERSION};
use pkg_constants::autoscaler::{
    DEFAULT_MIN_REPLICAS, DEFAULT_TARGET_UTILIZATION_PERCENT, MAX_TARGET_UTILIZATION_PERCENT,
    SCALE_UP_LIMIT_MINIMUM,
};
use serde::{Deserialize, Serialize};

use crate::event::ObjectReference;
use crate::meta::{ObjectMeta, Resource};

// --- Scale target reference ---

/// Names the workload whose scale subresource is driven by the autoscaler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossVersionObjectReference {
    /// Kind of the referent, e.g. "Deployment"
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

// --- Autoscaler spec ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerSpec {
    pub scale_target_ref: CrossVersionObjectReference,
    /// Lower replica bound; absent means "use the default"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,
    #[serde(default)]
    pub max_replicas: i32,
    /// Target average memory utilization relative to the declared limits (percent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_utilization_percentage: Option<i32>,
}

/// A field that [`AutoscalerSpec::validate`] had to rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecCorrection {
    MinReplicas(i32),
    MaxReplicas(i32),
    TargetUtilization(i32),
}

impl std::fmt::Display for SpecCorrection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecCorrection::MinReplicas(v) => {
                write!(f, ".spec.minReplicas is invalid and will be set to {}", v)
            }
            SpecCorrection::MaxReplicas(v) => {
                write!(f, ".spec.maxReplicas is invalid and will be set to {}", v)
            }
            SpecCorrection::TargetUtilization(v) => write!(
                f,
                ".spec.targetUtilizationPercentage is invalid and will be set to {}",
                v
            ),
        }
    }
}

impl AutoscalerSpec {
    /// Effective lower bound (defaulted when absent).
    pub fn min_replicas(&self) -> i32 {
        self.min_replicas.unwrap_or(DEFAULT_MIN_REPLICAS)
    }

    /// Effective utilization target (defaulted when absent).
    pub fn target_utilization(&self) -> i32 {
        self.target_utilization_percentage
            .unwrap_or(DEFAULT_TARGET_UTILIZATION_PERCENT)
    }

    /// Heal the replica bounds and the utilization target in place.
    ///
    /// After this returns, `1 <= minReplicas <= maxReplicas` and
    /// `1 <= targetUtilizationPercentage <= 100` hold. Every rewritten field is
    /// reported once, in field order.
    pub fn validate(&mut self) -> Vec<SpecCorrection> {
        let mut corrections = Vec::new();

        let min = match self.min_replicas {
            Some(min) if min >= 1 => min,
            _ => {
                self.min_replicas = Some(DEFAULT_MIN_REPLICAS);
                corrections.push(SpecCorrection::MinReplicas(DEFAULT_MIN_REPLICAS));
                DEFAULT_MIN_REPLICAS
            }
        };

        if self.max_replicas < min {
            self.max_replicas = min.saturating_add(SCALE_UP_LIMIT_MINIMUM);
            corrections.push(SpecCorrection::MaxReplicas(self.max_replicas));
        }

        match self.target_utilization_percentage {
            Some(t) if (1..=MAX_TARGET_UTILIZATION_PERCENT).contains(&t) => {}
            _ => {
                self.target_utilization_percentage = Some(DEFAULT_TARGET_UTILIZATION_PERCENT);
                corrections.push(SpecCorrection::TargetUtilization(
                    DEFAULT_TARGET_UTILIZATION_PERCENT,
                ));
            }
        }

        corrections
    }
}

// --- Autoscaler status ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Time of the last successful rescale; drives the hysteresis windows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scale_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_replicas: i32,
    #[serde(default)]
    pub desired_replicas: i32,
    #[serde(default, alias = "currentCPUUtilizationPercentage")]
    pub current_utilization_percentage: i32,
}

// --- Autoscaler ---

/// Memory-driven horizontal autoscaler (`MemHpa`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Autoscaler {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: AutoscalerSpec,
    #[serde(default)]
    pub status: AutoscalerStatus,
}

fn default_api_version() -> String {
    format!("{}/{}", GROUP, VERSION)
}

fn default_kind() -> String {
    KIND.to_string()
}

impl Autoscaler {
    pub fn new(namespace: &str, name: &str, spec: AutoscalerSpec) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: namespace.to_string(),
                ..Default::default()
            },
            spec,
            status: AutoscalerStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// Human-readable `target/namespace(Kind)` used in logs.
    pub fn target_reference(&self) -> String {
        format!(
            "{}/{}({})",
            self.spec.scale_target_ref.name,
            self.metadata.namespace,
            self.spec.scale_target_ref.kind
        )
    }

    pub fn object_reference(&self) -> ObjectReference {
        ObjectReference {
            kind: self.kind.clone(),
            namespace: self.metadata.namespace.clone(),
            name: self.metadata.name.clone(),
            uid: self.metadata.uid.clone(),
            api_version: Some(self.api_version.clone()),
        }
    }
}

impl Resource for Autoscaler {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
