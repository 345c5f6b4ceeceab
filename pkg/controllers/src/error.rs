use thiserror::Error;

/// Why the replica calculator could not produce an estimate.
#[derive(Debug, Error)]
pub enum CalculatorError {
    #[error("unable to get memory metrics for {workload}: {cause:#}")]
    MetricsUnavailable {
        workload: String,
        cause: anyhow::Error,
    },

    #[error("unable to list pods: {cause:#}")]
    PodListFailed { cause: anyhow::Error },

    #[error("no pods returned by selector while calculating replica count")]
    NoPods,

    #[error("memory limit is not set on container {container} of pod {pod}")]
    MissingMemoryLimit { pod: String, container: String },

    #[error("did not receive metrics for any ready pods")]
    NoValidMetrics,
}

/// Why a reconcile pass stopped short.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The scale target, the metrics or the pod list could not be fetched.
    #[error("failed to get {what}: {cause:#}")]
    DependencyFetchFailed { what: String, cause: anyhow::Error },

    /// Data was fetched but cannot drive a scaling decision.
    #[error("no usable metrics: {0}")]
    NoUsableMetrics(String),

    /// A write to the workload or to the autoscaler was rejected.
    #[error("failed to {what}: {cause:#}")]
    PersistFailed { what: String, cause: anyhow::Error },
}

impl From<CalculatorError> for ReconcileError {
    fn from(err: CalculatorError) -> Self {
        match err {
            CalculatorError::MetricsUnavailable { workload, cause } => {
                ReconcileError::DependencyFetchFailed {
                    what: format!("memory metrics of {}", workload),
                    cause,
                }
            }
            CalculatorError::PodListFailed { cause } => ReconcileError::DependencyFetchFailed {
                what: "pod list".to_string(),
                cause,
            },
            other => ReconcileError::NoUsableMetrics(other.to_string()),
        }
    }
}
