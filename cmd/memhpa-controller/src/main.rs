use anyhow::Context;
use clap::Parser;
use pkg_client::api::ApiClient;
use pkg_client::events::{ClusterEventSink, EventBroadcaster};
use pkg_client::prometheus::PrometheusClient;
use pkg_constants::api::{
    DEFAULT_API_SERVER, DEFAULT_COMPONENT, DEFAULT_PROMETHEUS_URL, SERVICE_ACCOUNT_TOKEN_PATH,
};
use pkg_constants::paths::DEFAULT_CONTROLLER_CONFIG;
use pkg_constants::state::{
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RESYNC_PERIOD_SECS, EVENT_CHANNEL_CAPACITY,
};
use pkg_controllers::autoscaler::AutoscalerController;
use pkg_controllers::replica_calculator::ReplicaCalculator;
use pkg_state::store::AutoscalerListWatch;
use pkg_types::config::{ControllerConfigFile, load_config_file};
use pkg_types::selector;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "memhpa-controller",
    about = "Horizontal autoscaler driven by pod memory utilization"
)]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_CONTROLLER_CONFIG)]
    config: String,

    /// API server endpoint
    #[arg(long)]
    api_server: Option<String>,

    /// Bearer token for the API server
    #[arg(long)]
    token: Option<String>,

    /// File holding the bearer token (defaults to the service account token)
    #[arg(long)]
    token_file: Option<String>,

    /// Skip TLS certificate verification of the API server
    #[arg(long)]
    insecure_skip_tls_verify: bool,

    /// Prometheus endpoint serving container memory metrics
    #[arg(long)]
    prometheus_url: Option<String>,

    /// Only manage autoscalers in this namespace
    #[arg(long)]
    namespace: Option<String>,

    /// Only manage autoscalers matching this label selector (`a=b,c=d`)
    #[arg(long)]
    label_selector: Option<String>,

    /// Period of the forced full re-list, in seconds (0 disables it)
    #[arg(long)]
    resync_period_secs: Option<u64>,

    /// HTTP request timeout, in seconds
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// Component name attached to emitted events
    #[arg(long)]
    component: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

/// Effective settings after merging CLI args > config file > defaults.
#[derive(Debug)]
struct Settings {
    api_server: String,
    token: Option<String>,
    insecure: bool,
    prometheus_url: String,
    namespace: Option<String>,
    label_selector: selector::LabelSelector,
    resync_period: Duration,
    request_timeout: Duration,
    component: String,
    log_json: bool,
}

impl Settings {
    fn merge(cli: Cli, file: ControllerConfigFile) -> anyhow::Result<Self> {
        let token = match cli.token.or(file.token) {
            Some(token) => Some(token),
            None => read_token(cli.token_file.or(file.token_file))?,
        };
        let label_selector = cli
            .label_selector
            .or(file.label_selector)
            .map(|s| selector::parse(&s))
            .transpose()
            .context("parsing label selector")?
            .unwrap_or_default();

        Ok(Self {
            api_server: cli
                .api_server
                .or(file.api_server)
                .unwrap_or_else(|| DEFAULT_API_SERVER.to_string()),
            token,
            insecure: cli.insecure_skip_tls_verify || file.insecure_skip_tls_verify.unwrap_or(false),
            prometheus_url: cli
                .prometheus_url
                .or(file.prometheus_url)
                .unwrap_or_else(|| DEFAULT_PROMETHEUS_URL.to_string()),
            namespace: cli.namespace.or(file.namespace).filter(|ns| !ns.is_empty()),
            label_selector,
            resync_period: Duration::from_secs(
                cli.resync_period_secs
                    .or(file.resync_period_secs)
                    .unwrap_or(DEFAULT_RESYNC_PERIOD_SECS),
            ),
            request_timeout: Duration::from_secs(
                cli.request_timeout_secs
                    .or(file.request_timeout_secs)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            component: cli
                .component
                .or(file.component)
                .unwrap_or_else(|| DEFAULT_COMPONENT.to_string()),
            log_json: cli.log_json || file.log_json.unwrap_or(false),
        })
    }
}

/// Read the bearer token from `path`, or from the service account mount when
/// no path is given and the mount exists.
fn read_token(path: Option<String>) -> anyhow::Result<Option<String>> {
    let path = match path {
        Some(path) => path,
        None if std::path::Path::new(SERVICE_ACCOUNT_TOKEN_PATH).exists() => {
            SERVICE_ACCOUNT_TOKEN_PATH.to_string()
        }
        None => return Ok(None),
    };
    let token = std::fs::read_to_string(&path)
        .with_context(|| format!("reading token file {}", path))?;
    Ok(Some(token.trim().to_string()))
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let config_path = cli.config.clone();
    let file_cfg: ControllerConfigFile = load_config_file(&config_path)
        .with_context(|| format!("loading config file {}", config_path))?;
    let settings = Settings::merge(cli, file_cfg)?;
    init_logging(settings.log_json);

    info!("Starting memhpa-controller");
    info!("  Config file: {}", config_path);
    info!("  API server:  {}", settings.api_server);
    info!("  Prometheus:  {}", settings.prometheus_url);
    info!(
        "  Namespace:   {}",
        settings.namespace.as_deref().unwrap_or("(all)")
    );
    info!("  Resync:      {}s", settings.resync_period.as_secs());

    let api = ApiClient::new(
        &settings.api_server,
        settings.token.clone(),
        settings.insecure,
        settings.request_timeout,
    )?;
    api.ensure_resource_definition()
        .await
        .context("registering the autoscaler resource type")?;

    let prometheus = PrometheusClient::new(&settings.prometheus_url, settings.request_timeout)?;
    let (events, events_task) = EventBroadcaster::start(
        Arc::new(ClusterEventSink::new(api.clone(), &settings.component)),
        EVENT_CHANNEL_CAPACITY,
    );

    let api = Arc::new(api);
    let calculator = ReplicaCalculator::new(Arc::new(prometheus), api.clone());
    let controller = Arc::new(AutoscalerController::new(
        api.clone(),
        api.clone(),
        calculator,
        Arc::new(events),
    ));
    let lw = Arc::new(AutoscalerListWatch::new(
        api,
        settings.namespace.clone(),
        settings.label_selector.clone(),
    ));

    let cancel = CancellationToken::new();
    let controller_task = controller.start(lw, settings.resync_period, cancel.clone());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down memhpa-controller");
    cancel.cancel();
    if let Err(e) = controller_task.await {
        warn!("Controller task ended abnormally: {}", e);
    }
    // The controller held the last event broadcaster handle
    if let Err(e) = events_task.await {
        warn!("Event publisher ended abnormally: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_file_which_overrides_defaults() {
        let cli = Cli::parse_from([
            "memhpa-controller",
            "--token",
            "t0k3n",
            "--namespace",
            "prod",
        ]);
        let file = ControllerConfigFile {
            namespace: Some("dev".to_string()),
            prometheus_url: Some("http://prom:9090".to_string()),
            label_selector: Some("team=web".to_string()),
            resync_period_secs: Some(0),
            ..Default::default()
        };
        let settings = Settings::merge(cli, file).unwrap();
        assert_eq!(settings.token.as_deref(), Some("t0k3n"));
        assert_eq!(settings.namespace.as_deref(), Some("prod"));
        assert_eq!(settings.prometheus_url, "http://prom:9090");
        assert_eq!(settings.api_server, DEFAULT_API_SERVER);
        assert_eq!(settings.label_selector.get("team").map(String::as_str), Some("web"));
        assert_eq!(settings.resync_period, Duration::ZERO);
        assert_eq!(
            settings.request_timeout,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        );
        assert_eq!(settings.component, DEFAULT_COMPONENT);
    }

    #[test]
    fn bad_selector_is_a_bootstrap_error() {
        let cli = Cli::parse_from(["memhpa-controller", "--token", "x", "--label-selector", "oops"]);
        assert!(Settings::merge(cli, ControllerConfigFile::default()).is_err());
    }
}
