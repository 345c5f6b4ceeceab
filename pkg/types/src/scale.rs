use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Replica counts and pod selector of a scalable workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleTarget {
    /// Replica count the workload is asked to run (`spec.replicas`)
    pub declared_replicas: i32,
    /// Replica count the workload currently reports (`status.replicas`)
    pub observed_replicas: i32,
    /// Label selector matching the workload's pods
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
}
