use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::{MetricsProvider, PodMetrics};

/// Metrics provider backed by a Prometheus instant query over cAdvisor series.
pub struct PrometheusClient {
    http: reqwest::Client,
    url: String,
}

impl PrometheusClient {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building Prometheus client")?;
        Ok(Self {
            http,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

/// Per-container memory usage of a workload's pods, averaged over the last minute.
/// Pause containers are excluded.
pub fn memory_query(namespace: &str, workload: &str) -> String {
    format!(
        r#"avg_over_time(container_memory_usage_bytes{{namespace="{}",pod_name=~"{}-.*",image!~".*/pause-amd64.*"}}[1m])"#,
        namespace, workload
    )
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Sample {
    #[serde(default)]
    metric: HashMap<String, String>,
    /// `[unix_seconds, "value"]`
    value: (f64, String),
}

/// Sum an instant-vector response into usage per pod.
pub fn parse_vector(body: &[u8]) -> anyhow::Result<PodMetrics> {
    let resp: QueryResponse = serde_json::from_slice(body).context("decoding query response")?;
    if resp.status != "success" {
        bail!(
            "query failed: {}",
            resp.error.unwrap_or_else(|| resp.status.clone())
        );
    }
    let Some(data) = resp.data else {
        bail!("query response carries no data");
    };
    if data.result_type != "vector" {
        bail!("expected a vector result, got {}", data.result_type);
    }
    let samples: Vec<Sample> =
        serde_json::from_value(data.result).context("decoding vector samples")?;
    let Some(first) = samples.first() else {
        bail!("no memory samples returned");
    };
    let timestamp = DateTime::<Utc>::from_timestamp_millis((first.value.0 * 1000.0) as i64)
        .context("sample timestamp out of range")?;

    let mut usage: HashMap<String, u64> = HashMap::new();
    for sample in &samples {
        let Some(pod) = sample
            .metric
            .get("pod_name")
            .or_else(|| sample.metric.get("pod"))
        else {
            continue;
        };
        let bytes: f64 = sample
            .value
            .1
            .parse()
            .with_context(|| format!("sample value '{}' for pod {}", sample.value.1, pod))?;
        *usage.entry(pod.clone()).or_default() += bytes.max(0.0).round() as u64;
    }
    Ok(PodMetrics { usage, timestamp })
}

#[async_trait]
impl MetricsProvider for PrometheusClient {
    async fn memory_usage(&self, namespace: &str, workload: &str) -> anyhow::Result<PodMetrics> {
        let query = memory_query(namespace, workload);
        debug!("Prometheus query: {}", query);
        let url = reqwest::Url::parse_with_params(
            &format!("{}/api/v1/query", self.url),
            &[("query", query.as_str())],
        )
        .context("building query URL")?;
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        let body = resp.bytes().await.context("reading query response")?;
        if !status.is_success() && body.is_empty() {
            bail!("query failed: {}", status);
        }
        parse_vector(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_targets_workload_pods() {
        assert_eq!(
            memory_query("prod", "web"),
            r#"avg_over_time(container_memory_usage_bytes{namespace="prod",pod_name=~"web-.*",image!~".*/pause-amd64.*"}[1m])"#
        );
    }

    #[test]
    fn containers_are_summed_per_pod() {
        let body = br#"{
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    {"metric": {"pod_name": "web-1", "container_name": "app"}, "value": [1700000000.5, "100"]},
                    {"metric": {"pod_name": "web-1", "container_name": "sidecar"}, "value": [1700000001, "50.4"]},
                    {"metric": {"pod": "web-2"}, "value": [1700000002, "2.5e2"]}
                ]
            }
        }"#;
        let metrics = parse_vector(body).unwrap();
        assert_eq!(metrics.usage["web-1"], 150);
        assert_eq!(metrics.usage["web-2"], 250);
        assert_eq!(metrics.timestamp.timestamp_millis(), 1_700_000_000_500);
    }

    #[test]
    fn empty_or_non_vector_results_are_errors() {
        let empty = br#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
        assert!(parse_vector(empty).is_err());

        let matrix = br#"{"status":"success","data":{"resultType":"matrix","result":[]}}"#;
        assert!(parse_vector(matrix).is_err());

        let failed = br#"{"status":"error","error":"bad query"}"#;
        let err = parse_vector(failed).unwrap_err();
        assert!(err.to_string().contains("bad query"));
    }
}
