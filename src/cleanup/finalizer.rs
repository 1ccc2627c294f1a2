//! Forced removal of finalizers from objects stuck in deletion.

use k8s_openapi::api::core::v1::{Namespace, NamespaceSpec};
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;

use crate::error::Result;

/// Remove all finalizers from an object.
///
/// Objects that are already gone or carry no finalizers are left alone.
pub async fn strip_finalizers<T>(api: &Api<T>, name: &str) -> Result<()>
where
    T: Resource + Clone + DeserializeOwned + std::fmt::Debug,
    <T as Resource>::DynamicType: Default,
{
    let resource = match api.get(name).await {
        Ok(r) => r,
        Err(kube::Error::Api(e)) if e.code == 404 => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if resource.finalizers().is_empty() {
        return Ok(());
    }

    let patch = serde_json::json!({
        "metadata": {
            "finalizers": Vec::<String>::new()
        }
    });
    match api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Clear the `spec.finalizers` of a namespace through its `finalize`
/// subresource.
///
/// These finalizers belong to the namespace controller and cannot be
/// changed by a regular update.
pub async fn finalize_namespace(api: &Api<Namespace>, name: &str) -> Result<()> {
    let mut namespace = match api.get(name).await {
        Ok(ns) => ns,
        Err(kube::Error::Api(e)) if e.code == 404 => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let has_spec_finalizers = namespace
        .spec
        .as_ref()
        .and_then(|s| s.finalizers.as_ref())
        .is_some_and(|f| !f.is_empty());
    if !has_spec_finalizers {
        return Ok(());
    }

    namespace.spec = Some(NamespaceSpec { finalizers: None });
    let data = serde_json::to_vec(&namespace)?;
    match api
        .replace_subresource("finalize", name, &PostParams::default(), data)
        .await
    {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}
