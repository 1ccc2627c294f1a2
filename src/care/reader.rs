//! Read access to the seed and shoot clusters.
//!
//! Health checks only read cluster state. The traits in this module are the
//! seams between the checks and the Kubernetes API; the kube-backed
//! implementations are used in production and fakes in tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Node, Pod, Secret};
use kube::api::{DynamicObject, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};

use super::required::KUBE_APISERVER;
use super::tunnel;
use crate::crd::{Etcd, ExtensionKind, ExtensionObject, ManagedResource, Worker};
use crate::error::{Error, Result};

/// Secret in the control plane namespace holding the shoot's kubeconfig.
pub const SHOOT_ACCESS_SECRET: &str = "gardener";
/// Data key of the kubeconfig in [`SHOOT_ACCESS_SECRET`].
pub const KUBECONFIG_KEY: &str = "kubeconfig";

/// Objects of a shoot's control plane namespace in the seed.
#[async_trait]
pub trait SeedReader: Send + Sync {
    async fn deployments(&self, namespace: &str) -> Result<Vec<Deployment>>;

    async fn stateful_sets(&self, namespace: &str) -> Result<Vec<StatefulSet>>;

    async fn etcds(&self, namespace: &str) -> Result<Vec<Etcd>>;

    async fn managed_resources(&self, namespace: &str) -> Result<Vec<ManagedResource>>;

    /// The shoot's worker extension object, if it exists.
    async fn worker(&self, namespace: &str, name: &str) -> Result<Option<Worker>>;

    async fn extension_objects(
        &self,
        namespace: &str,
        kind: &ExtensionKind,
    ) -> Result<Vec<ExtensionObject>>;
}

/// Objects and endpoints of the shoot cluster itself.
#[async_trait]
pub trait ShootReader: Send + Sync {
    /// Status code returned by the API server's `/healthz` endpoint.
    ///
    /// Transport failures are errors; any HTTP answer is a status code.
    async fn healthz(&self) -> Result<u16>;

    async fn nodes(&self) -> Result<Vec<Node>>;

    async fn pods(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Pod>>;

    async fn daemon_sets(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DaemonSet>>;

    /// Open and close a port-forward to `pod` through the tunnel.
    async fn probe_tunnel(&self, namespace: &str, pod: &str, port: u16) -> Result<()>;
}

/// Creates access to the shoot cluster.
#[async_trait]
pub trait ShootClientInit: Send + Sync {
    /// `Ok(None)` when the API server is not running, so there is nothing to
    /// connect to; an error when it runs but cannot be reached.
    async fn init(&self) -> Result<Option<Arc<dyn ShootReader>>>;
}

/// Format labels as a label selector string.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Seed access through the Kubernetes API.
#[derive(Clone)]
pub struct KubeSeedReader {
    client: Client,
}

impl KubeSeedReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SeedReader for KubeSeedReader {
    async fn deployments(&self, namespace: &str) -> Result<Vec<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn stateful_sets(&self, namespace: &str) -> Result<Vec<StatefulSet>> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn etcds(&self, namespace: &str) -> Result<Vec<Etcd>> {
        let api: Api<Etcd> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn managed_resources(&self, namespace: &str) -> Result<Vec<ManagedResource>> {
        let api: Api<ManagedResource> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn worker(&self, namespace: &str, name: &str) -> Result<Option<Worker>> {
        let api: Api<Worker> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn extension_objects(
        &self,
        namespace: &str,
        kind: &ExtensionKind,
    ) -> Result<Vec<ExtensionObject>> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource());
        api.list(&ListParams::default())
            .await?
            .items
            .iter()
            .map(|object| ExtensionObject::from_dynamic(&kind.kind, object))
            .collect()
    }
}

/// Shoot access through the shoot's API server.
#[derive(Clone)]
pub struct KubeShootReader {
    client: Client,
    probe_timeout: Duration,
}

impl KubeShootReader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            probe_timeout: tunnel::DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

#[async_trait]
impl ShootReader for KubeShootReader {
    async fn healthz(&self) -> Result<u16> {
        let request = http::Request::get("/healthz")
            .body(Vec::new())
            .map_err(|e| Error::Permanent(e.to_string()))?;
        match self.client.request_text(request).await {
            Ok(_) => Ok(200),
            Err(kube::Error::Api(e)) => Ok(e.code),
            Err(e) => Err(e.into()),
        }
    }

    async fn nodes(&self) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn pods(&self, namespace: &str, labels: &BTreeMap<String, String>) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(labels));
        Ok(api.list(&params).await?.items)
    }

    async fn daemon_sets(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DaemonSet>> {
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(labels));
        Ok(api.list(&params).await?.items)
    }

    async fn probe_tunnel(&self, namespace: &str, pod: &str, port: u16) -> Result<()> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        tunnel::probe(&api, pod, port, self.probe_timeout).await?;
        Ok(())
    }
}

/// Builds a shoot client from the kubeconfig stored in the seed.
#[derive(Clone)]
pub struct KubeShootClientInit {
    seed: Client,
    namespace: String,
}

impl KubeShootClientInit {
    pub fn new(seed: Client, namespace: impl Into<String>) -> Self {
        Self {
            seed,
            namespace: namespace.into(),
        }
    }

    async fn api_server_running(&self) -> Result<bool> {
        let api: Api<Deployment> = Api::namespaced(self.seed.clone(), &self.namespace);
        let running = api.get_opt(KUBE_APISERVER).await?.is_some_and(|d| {
            d.spec.and_then(|s| s.replicas).unwrap_or(1) > 0
        });
        Ok(running)
    }
}

#[async_trait]
impl ShootClientInit for KubeShootClientInit {
    async fn init(&self) -> Result<Option<Arc<dyn ShootReader>>> {
        if !self.api_server_running().await? {
            return Ok(None);
        }

        let secrets: Api<Secret> = Api::namespaced(self.seed.clone(), &self.namespace);
        let secret = secrets.get(SHOOT_ACCESS_SECRET).await?;
        let raw = secret
            .data
            .and_then(|mut data| data.remove(KUBECONFIG_KEY))
            .ok_or_else(|| {
                Error::MissingField(format!("{SHOOT_ACCESS_SECRET}.data.{KUBECONFIG_KEY}"))
            })?;
        let yaml = String::from_utf8(raw.0)
            .map_err(|e| Error::Validation(format!("kubeconfig is not valid UTF-8: {e}")))?;

        let kubeconfig =
            Kubeconfig::from_yaml(&yaml).map_err(|e| Error::Validation(e.to_string()))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::Validation(e.to_string()))?;
        let client = Client::try_from(config)?;

        Ok(Some(Arc::new(KubeShootReader::new(client))))
    }
}
