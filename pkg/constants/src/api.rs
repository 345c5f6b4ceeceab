//! Cluster API identifiers for the autoscaler resource.

/// API group of the custom resource.
pub const GROUP: &str = "memhpa.io";

/// Served version of the custom resource.
pub const VERSION: &str = "v1";

/// Kind of the custom resource.
pub const KIND: &str = "MemHpa";

/// Plural resource name used in URL paths.
pub const PLURAL: &str = "memhpas";

/// Full name of the CustomResourceDefinition (`<plural>.<group>`).
pub const DEFINITION_NAME: &str = "memhpas.memhpa.io";

/// Path prefix of the CustomResourceDefinition API.
pub const DEFINITIONS_PATH: &str = "/apis/apiextensions.k8s.io/v1/customresourcedefinitions";

/// Default component name attached to emitted events.
pub const DEFAULT_COMPONENT: &str = "memhpa-controller";

/// Default Prometheus endpoint (in-cluster service).
pub const DEFAULT_PROMETHEUS_URL: &str = "http://prometheus-monitor.kube-system:9090";

/// Default API server endpoint (in-cluster service).
pub const DEFAULT_API_SERVER: &str = "https://kubernetes.default.svc";

/// Service account token mounted into every pod.
pub const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
