use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a notification attached to an autoscaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Normal,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Normal => write!(f, "Normal"),
            Severity::Warning => write!(f, "Warning"),
        }
    }
}

/// Reasons attached to notifications emitted by the controller.
pub mod reason {
    pub const VALIDATION_POLICY: &str = "ValidationPolicy";
    pub const SELECTOR_REQUIRED: &str = "SelectorRequired";
    pub const FAILED_GET_METRICS: &str = "FailedGetMetrics";
    pub const METRICS_NOT_AVAILABLE_YET: &str = "MetricsNotAvailableYet";
    pub const DESIRED_REPLICAS_COMPUTED: &str = "DesiredReplicasComputed";
    pub const SUCCESSFUL_RESCALE: &str = "SuccessfulRescale";
    pub const FAILED_RESCALE: &str = "FailedRescale";
    pub const FAILED_UPDATE_STATUS: &str = "FailedUpdateStatus";
}

/// Reference to the object a notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// A single recorded notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub involved_object: ObjectReference,
    pub severity: Severity,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
