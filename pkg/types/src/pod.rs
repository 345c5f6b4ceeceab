use serde::{Deserialize, Serialize};

// --- Pod phase ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl std::fmt::Display for PodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PodPhase::Pending => write!(f, "Pending"),
            PodPhase::Running => write!(f, "Running"),
            PodPhase::Succeeded => write!(f, "Succeeded"),
            PodPhase::Failed => write!(f, "Failed"),
            PodPhase::Unknown => write!(f, "Unknown"),
        }
    }
}

impl PodPhase {
    /// Parse a phase reported by the cluster; anything unrecognised is `Unknown`.
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

// --- Container limits ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLimits {
    pub name: String,
    /// Declared memory limit in bytes (`None` when the container sets no limit)
    #[serde(default)]
    pub memory_limit_bytes: Option<u64>,
}

// --- Pod snapshot ---

/// Point-in-time view of a pod, as much as the replica calculator needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSnapshot {
    pub name: String,
    pub phase: PodPhase,
    /// Value of the `Ready` condition
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub containers: Vec<ContainerLimits>,
}

impl PodSnapshot {
    /// Running with a true readiness condition.
    pub fn is_ready(&self) -> bool {
        self.phase == PodPhase::Running && self.ready
    }

    /// Sum of the container memory limits, or the first container without one.
    pub fn memory_limit(&self) -> Result<u64, &str> {
        self.containers.iter().try_fold(0u64, |sum, c| {
            c.memory_limit_bytes
                .map(|l| sum.saturating_add(l))
                .ok_or(c.name.as_str())
        })
    }
}
