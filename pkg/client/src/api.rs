use anyhow::{Context, bail};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use pkg_constants::api::{DEFINITION_NAME, DEFINITIONS_PATH, GROUP, KIND, PLURAL, VERSION};
use pkg_constants::state::WATCH_TIMEOUT_SECS;
use pkg_state::reflector::WatchStream;
use pkg_state::store::{AutoscalerStore, StoreError};
use pkg_state::watch::WatchEvent;
use pkg_types::autoscaler::Autoscaler;
use pkg_types::event::Notification;
use pkg_types::meta::{ListOptions, ObjectList};
use pkg_types::pod::{ContainerLimits, PodPhase, PodSnapshot};
use pkg_types::quantity;
use pkg_types::scale::ScaleTarget;
use pkg_types::selector::{self, LabelSelector};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::{PodLister, ScaleAccessor};

/// Thin REST client for the cluster API server.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    server: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(
        server: &str,
        token: Option<String>,
        insecure: bool,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            server: server.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.http.request(method, format!("{}{}", self.server, path));
        match &self.token {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }

    /// Post a notification as a cluster Event.
    pub async fn create_event(&self, event: &Notification, component: &str) -> anyhow::Result<()> {
        let ns = &event.involved_object.namespace;
        let body = json!({
            "apiVersion": "v1",
            "kind": "Event",
            "metadata": {
                "generateName": format!("{}.", event.involved_object.name),
                "namespace": ns,
            },
            "involvedObject": event.involved_object,
            "reason": event.reason,
            "message": event.message,
            "type": event.severity.to_string(),
            "source": { "component": component },
            "firstTimestamp": event.timestamp,
            "lastTimestamp": event.timestamp,
            "count": 1,
        });
        let resp = self
            .request(Method::POST, &format!("/api/v1/namespaces/{}/events", ns))
            .json(&body)
            .send()
            .await?;
        expect_success(resp, "create event").await?;
        Ok(())
    }

    /// Register the autoscaler resource type unless the cluster already knows it.
    pub async fn ensure_resource_definition(&self) -> anyhow::Result<()> {
        let path = format!("{}/{}", DEFINITIONS_PATH, DEFINITION_NAME);
        let resp = self.request(Method::GET, &path).send().await?;
        match resp.status() {
            s if s.is_success() => {
                debug!("Resource definition {} already registered", DEFINITION_NAME);
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                let resp = self
                    .request(Method::POST, DEFINITIONS_PATH)
                    .json(&resource_definition())
                    .send()
                    .await?;
                expect_success(resp, "create resource definition").await?;
                info!("Registered resource definition {}", DEFINITION_NAME);
                Ok(())
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                bail!(
                    "looking up resource definition {}: {} - {}",
                    DEFINITION_NAME,
                    status,
                    body
                )
            }
        }
    }
}

/// CustomResourceDefinition body for the autoscaler type.
pub fn resource_definition() -> serde_json::Value {
    json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": { "name": DEFINITION_NAME },
        "spec": {
            "group": GROUP,
            "scope": "Namespaced",
            "names": {
                "kind": KIND,
                "plural": PLURAL,
                "singular": KIND.to_lowercase(),
                "shortNames": ["mhpa"],
            },
            "versions": [{
                "name": VERSION,
                "served": true,
                "storage": true,
                "schema": {
                    "openAPIV3Schema": {
                        "type": "object",
                        "properties": {
                            "spec": {
                                "type": "object",
                                "required": ["scaleTargetRef", "maxReplicas"],
                                "properties": {
                                    "scaleTargetRef": {
                                        "type": "object",
                                        "required": ["kind", "name"],
                                        "properties": {
                                            "kind": { "type": "string" },
                                            "name": { "type": "string" },
                                            "apiVersion": { "type": "string" },
                                        },
                                    },
                                    "minReplicas": { "type": "integer" },
                                    "maxReplicas": { "type": "integer" },
                                    "targetUtilizationPercentage": { "type": "integer" },
                                },
                            },
                            "status": {
                                "type": "object",
                                "x-kubernetes-preserve-unknown-fields": true,
                            },
                        },
                    },
                },
            }],
        },
    })
}

async fn expect_success(resp: Response, what: &str) -> anyhow::Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    bail!("{} failed: {} - {}", what, status, body)
}

async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> anyhow::Result<T> {
    let resp = expect_success(resp, what).await?;
    resp.json()
        .await
        .with_context(|| format!("decoding {} response", what))
}

fn autoscalers_path(namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => {
            format!("/apis/{}/{}/namespaces/{}/{}", GROUP, VERSION, ns, PLURAL)
        }
        _ => format!("/apis/{}/{}/{}", GROUP, VERSION, PLURAL),
    }
}

fn autoscaler_path(namespace: &str, name: &str) -> String {
    format!("{}/{}", autoscalers_path(Some(namespace)), name)
}

fn list_query(opts: &ListOptions, watch: bool) -> String {
    let mut params = Vec::new();
    if watch {
        params.push("watch=true".to_string());
        params.push(format!("timeoutSeconds={}", WATCH_TIMEOUT_SECS));
    }
    if let Some(rv) = opts.resource_version.as_deref().filter(|rv| !rv.is_empty()) {
        params.push(format!("resourceVersion={}", rv));
    }
    if !opts.selector.is_empty() {
        params.push(format!("labelSelector={}", selector::to_query(&opts.selector)));
    }
    if params.is_empty() {
        String::new()
    } else {
        format!("?{}", params.join("&"))
    }
}

/// Split a chunked body into newline-delimited JSON watch events.
pub fn decode_watch_lines<S, B, E, T>(chunks: S) -> BoxStream<'static, anyhow::Result<WatchEvent<T>>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<anyhow::Error> + Send + 'static,
    T: DeserializeOwned + Send + 'static,
{
    stream::unfold((chunks.boxed(), Vec::<u8>::new()), |(mut chunks, mut buf)| async move {
        loop {
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let line = line.trim_ascii();
                if line.is_empty() {
                    continue;
                }
                let event = serde_json::from_slice::<WatchEvent<T>>(line).context("decoding watch event");
                return Some((event, (chunks, buf)));
            }
            match chunks.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => return Some((Err(e.into()), (chunks, buf))),
                None => {
                    let rest = std::mem::take(&mut buf);
                    let rest = rest.trim_ascii();
                    if rest.is_empty() {
                        return None;
                    }
                    let event = serde_json::from_slice::<WatchEvent<T>>(rest).context("decoding watch event");
                    return Some((event, (chunks, buf)));
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl AutoscalerStore for ApiClient {
    async fn create(&self, hpa: &Autoscaler) -> anyhow::Result<Autoscaler> {
        let resp = self
            .request(Method::POST, &autoscalers_path(Some(hpa.namespace())))
            .json(hpa)
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            return Err(StoreError::AlreadyExists(hpa.metadata.key()).into());
        }
        decode(resp, "create autoscaler").await
    }

    async fn update(&self, hpa: &Autoscaler) -> anyhow::Result<Autoscaler> {
        let resp = self
            .request(Method::PUT, &autoscaler_path(hpa.namespace(), hpa.name()))
            .json(hpa)
            .send()
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(hpa.metadata.key()).into()),
            StatusCode::CONFLICT => Err(StoreError::Conflict {
                key: hpa.metadata.key(),
                expected: hpa.metadata.resource_version.clone().unwrap_or_default(),
                actual: resp.text().await.unwrap_or_default(),
            }
            .into()),
            _ => decode(resp, "update autoscaler").await,
        }
    }

    async fn delete(&self, namespace: &str, name: &str) -> anyhow::Result<()> {
        let resp = self
            .request(Method::DELETE, &autoscaler_path(namespace, name))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(format!("{}/{}", namespace, name)).into());
        }
        expect_success(resp, "delete autoscaler").await?;
        Ok(())
    }

    async fn get(&self, namespace: &str, name: &str) -> anyhow::Result<Option<Autoscaler>> {
        let resp = self
            .request(Method::GET, &autoscaler_path(namespace, name))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(resp, "get autoscaler").await.map(Some)
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        opts: &ListOptions,
    ) -> anyhow::Result<ObjectList<Autoscaler>> {
        let path = format!("{}{}", autoscalers_path(namespace), list_query(opts, false));
        let resp = self.request(Method::GET, &path).send().await?;
        decode(resp, "list autoscalers").await
    }

    async fn watch(
        &self,
        namespace: Option<&str>,
        opts: &ListOptions,
    ) -> anyhow::Result<WatchStream<Autoscaler>> {
        let path = format!("{}{}", autoscalers_path(namespace), list_query(opts, true));
        let resp = self
            .request(Method::GET, &path)
            .timeout(Duration::from_secs(WATCH_TIMEOUT_SECS + 10))
            .send()
            .await?;
        if resp.status() == StatusCode::GONE {
            return Err(StoreError::TooOld {
                requested: opts.resource_version.clone().unwrap_or_default(),
                oldest: 0,
            }
            .into());
        }
        let resp = expect_success(resp, "watch autoscalers").await?;
        Ok(decode_watch_lines(resp.bytes_stream()))
    }
}

// --- Scale subresource ---

/// API path prefix and plural of a scalable workload kind.
fn workload_path(kind: &str) -> anyhow::Result<(&'static str, &'static str)> {
    Ok(match kind {
        "Deployment" => ("/apis/apps/v1", "deployments"),
        "ReplicaSet" => ("/apis/apps/v1", "replicasets"),
        "StatefulSet" => ("/apis/apps/v1", "statefulsets"),
        "ReplicationController" => ("/api/v1", "replicationcontrollers"),
        other => bail!("unsupported scale target kind '{}'", other),
    })
}

fn scale_path(namespace: &str, kind: &str, name: &str) -> anyhow::Result<String> {
    let (prefix, plural) = workload_path(kind)?;
    Ok(format!(
        "{}/namespaces/{}/{}/{}/scale",
        prefix, namespace, plural, name
    ))
}

#[derive(Debug, Default, Deserialize)]
struct Scale {
    #[serde(default)]
    spec: ScaleSpec,
    #[serde(default)]
    status: ScaleStatus,
}

#[derive(Debug, Default, Deserialize)]
struct ScaleSpec {
    #[serde(default)]
    replicas: i32,
}

#[derive(Debug, Default, Deserialize)]
struct ScaleStatus {
    #[serde(default)]
    replicas: i32,
    #[serde(default)]
    selector: String,
}

impl Scale {
    fn into_target(self) -> anyhow::Result<ScaleTarget> {
        Ok(ScaleTarget {
            declared_replicas: self.spec.replicas,
            observed_replicas: self.status.replicas,
            selector: selector::parse(&self.status.selector)?,
        })
    }
}

#[async_trait]
impl ScaleAccessor for ApiClient {
    async fn get(&self, namespace: &str, kind: &str, name: &str) -> anyhow::Result<ScaleTarget> {
        let path = scale_path(namespace, kind, name)?;
        let resp = self.request(Method::GET, &path).send().await?;
        let scale: Scale = decode(resp, "get scale").await?;
        scale.into_target()
    }

    async fn update(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
        replicas: i32,
    ) -> anyhow::Result<()> {
        let path = scale_path(namespace, kind, name)?;
        let body = serde_json::to_vec(&json!({ "spec": { "replicas": replicas } }))?;
        let resp = self
            .request(Method::PATCH, &path)
            .header("Content-Type", "application/merge-patch+json")
            .body(body)
            .send()
            .await?;
        expect_success(resp, "update scale").await?;
        Ok(())
    }
}

// --- Pods ---

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: PodMeta,
    #[serde(default)]
    spec: PodSpec,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize)]
struct PodMeta {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<Container>,
}

#[derive(Debug, Deserialize)]
struct Container {
    name: String,
    #[serde(default)]
    resources: Resources,
}

#[derive(Debug, Default, Deserialize)]
struct Resources {
    #[serde(default)]
    limits: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(default)]
    phase: String,
    #[serde(default)]
    conditions: Vec<PodCondition>,
}

#[derive(Debug, Deserialize)]
struct PodCondition {
    #[serde(rename = "type")]
    condition_type: String,
    status: String,
}

impl Pod {
    fn into_snapshot(self) -> anyhow::Result<PodSnapshot> {
        let ready = self
            .status
            .conditions
            .iter()
            .any(|c| c.condition_type == "Ready" && c.status == "True");
        let containers = self
            .spec
            .containers
            .into_iter()
            .map(|c| {
                let memory_limit_bytes = c
                    .resources
                    .limits
                    .get("memory")
                    .map(|q| quantity::parse_bytes(q))
                    .transpose()
                    .with_context(|| {
                        format!("pod {} container {}: memory limit", self.metadata.name, c.name)
                    })?;
                Ok(ContainerLimits {
                    name: c.name,
                    memory_limit_bytes,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(PodSnapshot {
            name: self.metadata.name,
            phase: PodPhase::parse(&self.status.phase),
            ready,
            containers,
        })
    }
}

/// Decode a `PodList` body into snapshots.
pub fn parse_pod_list(body: &[u8]) -> anyhow::Result<Vec<PodSnapshot>> {
    let list: PodList = serde_json::from_slice(body).context("decoding pod list")?;
    list.items.into_iter().map(Pod::into_snapshot).collect()
}

#[async_trait]
impl PodLister for ApiClient {
    async fn list(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> anyhow::Result<Vec<PodSnapshot>> {
        let mut path = format!("/api/v1/namespaces/{}/pods", namespace);
        if !selector.is_empty() {
            path.push_str(&format!("?labelSelector={}", selector::to_query(selector)));
        }
        let resp = self.request(Method::GET, &path).send().await?;
        let resp = expect_success(resp, "list pods").await?;
        let body = resp.bytes().await.context("reading pod list")?;
        parse_pod_list(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_state::watch::EventType;

    #[test]
    fn paths_are_namespace_scoped() {
        assert_eq!(
            autoscalers_path(Some("prod")),
            "/apis/memhpa.io/v1/namespaces/prod/memhpas"
        );
        assert_eq!(autoscalers_path(None), "/apis/memhpa.io/v1/memhpas");
        assert_eq!(
            scale_path("prod", "Deployment", "web").unwrap(),
            "/apis/apps/v1/namespaces/prod/deployments/web/scale"
        );
        assert!(scale_path("prod", "CronJob", "web").is_err());
    }

    #[test]
    fn watch_query_carries_version_and_selector() {
        let opts = ListOptions {
            selector: selector::parse("app=web").unwrap(),
            resource_version: Some("42".to_string()),
        };
        assert_eq!(
            list_query(&opts, true),
            format!(
                "?watch=true&timeoutSeconds={}&resourceVersion=42&labelSelector=app=web",
                WATCH_TIMEOUT_SECS
            )
        );
        assert_eq!(list_query(&ListOptions::default(), false), "");
    }

    #[tokio::test]
    async fn watch_lines_survive_chunk_boundaries() {
        let body = concat!(
            r#"{"type":"ADDED","object":{"metadata":{"name":"web","namespace":"prod"}}}"#,
            "\n\n",
            r#"{"type":"DELETED","object":{"metadata":{"name":"web","namespace":"prod"}}}"#,
        );
        let (head, tail) = body.as_bytes().split_at(30);
        let chunks = stream::iter(vec![
            Ok::<_, std::io::Error>(head.to_vec()),
            Ok(tail.to_vec()),
        ]);

        let events: Vec<_> = decode_watch_lines::<_, _, _, Autoscaler>(chunks)
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        let first = events[0].as_ref().unwrap();
        assert_eq!(first.event_type, EventType::Added);
        assert_eq!(first.object.kind, "MemHpa");
        assert_eq!(events[1].as_ref().unwrap().event_type, EventType::Deleted);
    }

    #[tokio::test]
    async fn watch_error_events_fail_the_stream() {
        let line = br#"{"type":"ERROR","object":{"kind":"Status","code":410}}
"#;
        let chunks = stream::iter(vec![Ok::<_, std::io::Error>(line.to_vec())]);
        let mut events = decode_watch_lines::<_, _, _, Autoscaler>(chunks);
        assert!(events.next().await.unwrap().is_err());
        assert!(events.next().await.is_none());
    }

    #[test]
    fn pod_list_parses_limits_and_readiness() {
        let body = br#"{
            "items": [
                {
                    "metadata": {"name": "web-1"},
                    "spec": {"containers": [
                        {"name": "app", "resources": {"limits": {"memory": "128Mi"}}},
                        {"name": "sidecar", "resources": {}}
                    ]},
                    "status": {"phase": "Running", "conditions": [{"type": "Ready", "status": "True"}]}
                },
                {
                    "metadata": {"name": "web-2"},
                    "spec": {"containers": [{"name": "app", "resources": {"limits": {"memory": "1G"}}}]},
                    "status": {"phase": "Pending"}
                }
            ]
        }"#;
        let pods = parse_pod_list(body).unwrap();
        assert_eq!(pods.len(), 2);
        assert!(pods[0].is_ready());
        assert_eq!(pods[0].containers[0].memory_limit_bytes, Some(128 * 1024 * 1024));
        assert_eq!(pods[0].containers[1].memory_limit_bytes, None);
        assert_eq!(pods[0].memory_limit(), Err("sidecar"));
        assert_eq!(pods[1].phase, PodPhase::Pending);
        assert!(!pods[1].is_ready());
        assert_eq!(pods[1].memory_limit(), Ok(1_000_000_000));
    }

    #[test]
    fn scale_selector_is_parsed() {
        let scale: Scale = serde_json::from_str(
            r#"{"spec":{"replicas":3},"status":{"replicas":2,"selector":"app=web,tier=fe"}}"#,
        )
        .unwrap();
        let target = scale.into_target().unwrap();
        assert_eq!(target.declared_replicas, 3);
        assert_eq!(target.observed_replicas, 2);
        assert_eq!(target.selector.len(), 2);
    }

    #[test]
    fn resource_definition_names_the_type() {
        let crd = resource_definition();
        assert_eq!(crd["metadata"]["name"], DEFINITION_NAME);
        assert_eq!(crd["spec"]["names"]["kind"], KIND);
    }
}
