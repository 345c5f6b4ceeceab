use serde::{Deserialize, Serialize};

/// Controller configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// api-server: https://10.0.0.1:6443
/// token-file: /var/run/secrets/kubernetes.io/serviceaccount/token
/// prometheus-url: http://prometheus-monitor.kube-system:9090
/// namespace: prod
/// label-selector: team=web
/// resync-period-secs: 30
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfigFile {
    #[serde(default, alias = "api-server")]
    pub api_server: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, alias = "token-file")]
    pub token_file: Option<String>,
    #[serde(default, alias = "insecure-skip-tls-verify")]
    pub insecure_skip_tls_verify: Option<bool>,
    #[serde(default, alias = "prometheus-url")]
    pub prometheus_url: Option<String>,
    /// Watch a single namespace instead of the whole cluster
    #[serde(default)]
    pub namespace: Option<String>,
    /// Only manage autoscalers carrying these labels (`a=b,c=d`)
    #[serde(default, alias = "label-selector")]
    pub label_selector: Option<String>,
    #[serde(default, alias = "resync-period-secs")]
    pub resync_period_secs: Option<u64>,
    #[serde(default, alias = "request-timeout-secs")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default, alias = "log-json")]
    pub log_json: Option<bool>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}
