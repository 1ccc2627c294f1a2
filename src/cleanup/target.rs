//! Resource kinds the cleaner can operate on.
//!
//! [`Cleanable`] is implemented once per kind of backend. The cleaner only
//! sees [`ObjectRef`]s, so it never needs to know which kind it is working on.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use jiff::Timestamp;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::{DeleteParams, ListParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;

use super::finalizer::{finalize_namespace, strip_finalizers};
use super::selector::Selector;
use crate::error::Result;

/// The parts of an object the cleaner looks at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectRef {
    pub name: String,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub creation_timestamp: Option<Timestamp>,
    pub deletion_timestamp: Option<Timestamp>,
    pub finalizers: Vec<String>,
}

impl ObjectRef {
    /// Project a Kubernetes object.
    pub fn from_resource<K: Resource>(object: &K) -> Self {
        let meta = object.meta();
        Self {
            name: object.name_any(),
            namespace: object.namespace(),
            labels: object.labels().clone(),
            creation_timestamp: meta.creation_timestamp.as_ref().and_then(to_timestamp),
            deletion_timestamp: meta.deletion_timestamp.as_ref().and_then(to_timestamp),
            finalizers: object.finalizers().to_vec(),
        }
    }

    /// `namespace/name` or just `name` for cluster-scoped objects
    pub fn key(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}/{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

/// Convert an API server time into a [`Timestamp`].
pub fn to_timestamp(time: &Time) -> Option<Timestamp> {
    let nanos = i32::try_from(time.0.timestamp_subsec_nanos()).ok()?;
    Timestamp::new(time.0.timestamp(), nanos).ok()
}

/// Builds [`Api`]s for kinds of one resource scope.
pub trait ApiScope: Sized {
    /// Api over objects in `namespace`, or over all objects.
    fn api<K>(client: Client, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>;
}

impl ApiScope for NamespaceResourceScope {
    fn api<K>(client: Client, namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>,
    {
        match namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        }
    }
}

impl ApiScope for ClusterResourceScope {
    fn api<K>(client: Client, _namespace: Option<&str>) -> Api<K>
    where
        K: Resource<Scope = Self, DynamicType = ()>,
    {
        Api::all(client)
    }
}

/// A kind of object that can be listed, deleted and forcibly finalized.
#[async_trait]
pub trait Cleanable: Send + Sync {
    /// Kind name used in logs and errors
    fn kind(&self) -> &str;

    /// Objects matching `selector`.
    async fn list(&self, selector: &Selector) -> Result<Vec<ObjectRef>>;

    /// Delete an object; deleting an object that is already gone succeeds.
    async fn delete(&self, object: &ObjectRef, grace_period_seconds: Option<u32>) -> Result<()>;

    /// Remove whatever keeps a deleted object from disappearing.
    async fn finalize(&self, object: &ObjectRef) -> Result<()>;

    /// Whether write conflicts are expected and should be retried
    fn tolerates_conflicts(&self) -> bool {
        false
    }
}

/// Objects of one typed Kubernetes kind, across all namespaces or in one.
pub struct KubeTarget<K> {
    client: Client,
    namespace: Option<String>,
    kind: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeTarget<K>
where
    K: Resource<DynamicType = ()>,
{
    /// Objects of `K` in all namespaces, or cluster-scoped objects
    pub fn all(client: Client) -> Self {
        Self {
            client,
            namespace: None,
            kind: K::kind(&()).to_string(),
            _kind: PhantomData,
        }
    }

    /// Objects of `K` in a single namespace
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            ..Self::all(client)
        }
    }
}

impl<K> KubeTarget<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
    K::Scope: ApiScope,
{
    fn list_api(&self) -> Api<K> {
        <K::Scope as ApiScope>::api(self.client.clone(), self.namespace.as_deref())
    }

    fn object_api(&self, object: &ObjectRef) -> Api<K> {
        <K::Scope as ApiScope>::api(self.client.clone(), object.namespace.as_deref())
    }
}

#[async_trait]
impl<K> Cleanable for KubeTarget<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::Scope: ApiScope,
{
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn list(&self, selector: &Selector) -> Result<Vec<ObjectRef>> {
        let mut params = ListParams::default();
        if !selector.labels.is_empty() {
            params = params.labels(&selector.labels.to_string());
        }
        if !selector.fields.is_empty() {
            params = params.fields(&selector.fields.to_string());
        }
        let list = self.list_api().list(&params).await?;
        Ok(list.items.iter().map(ObjectRef::from_resource).collect())
    }

    async fn delete(&self, object: &ObjectRef, grace_period_seconds: Option<u32>) -> Result<()> {
        let params = DeleteParams {
            grace_period_seconds,
            ..DeleteParams::default()
        };
        match self.object_api(object).delete(&object.name, &params).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn finalize(&self, object: &ObjectRef) -> Result<()> {
        strip_finalizers(&self.object_api(object), &object.name).await
    }
}

/// Namespaces, whose deletion is additionally blocked by spec finalizers.
pub struct NamespaceTarget {
    inner: KubeTarget<Namespace>,
}

impl NamespaceTarget {
    pub fn new(client: Client) -> Self {
        Self {
            inner: KubeTarget::all(client),
        }
    }
}

#[async_trait]
impl Cleanable for NamespaceTarget {
    fn kind(&self) -> &str {
        self.inner.kind()
    }

    async fn list(&self, selector: &Selector) -> Result<Vec<ObjectRef>> {
        self.inner.list(selector).await
    }

    async fn delete(&self, object: &ObjectRef, grace_period_seconds: Option<u32>) -> Result<()> {
        self.inner.delete(object, grace_period_seconds).await
    }

    async fn finalize(&self, object: &ObjectRef) -> Result<()> {
        self.inner.finalize(object).await?;
        finalize_namespace(&self.inner.list_api(), &object.name).await
    }

    fn tolerates_conflicts(&self) -> bool {
        true
    }
}
