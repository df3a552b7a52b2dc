//! Kubernetes wiring for Applications: client, typed store over the dynamic
//! API and the watch-driven event source.

#![forbid(unsafe_code)]

mod source;

use acr_core::{model, AcrError, AcrResult, Application};
use acr_patch::PatchDocument;
use acr_store::{decode_application, ApplicationStore};
use anyhow::{Context, Result};
use kube::{
    api::{Api, Patch, PatchParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use metrics::counter;
use tracing::debug;

pub use source::{decode_event, run_event_source, EventTranslator, Notification};

/// Kube client from the ambient kubeconfig or in-cluster service account.
pub async fn get_kube_client() -> Result<Client> {
    Client::try_default().await.context("building kube client")
}

/// `argoproj.io/v1alpha1` Application resource description.
pub fn application_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk(model::GROUP, model::VERSION, model::KIND);
    ApiResource::from_gvk_with_plural(&gvk, model::PLURAL)
}

/// Dynamic API over Applications, either in one namespace or cluster-wide.
pub fn application_api(client: Client, namespace: Option<&str>) -> Api<DynamicObject> {
    let ar = application_resource();
    match namespace {
        Some(ns) => Api::namespaced_with(client, ns, &ar),
        None => Api::all_with(client, &ar),
    }
}

fn strip_managed_fields(v: &mut serde_json::Value) {
    if let Some(meta) = v.get_mut("metadata") {
        if let Some(obj) = meta.as_object_mut() {
            obj.remove("managedFields");
        }
    }
}

/// Convert a dynamic object into the Application model.
pub fn to_application(obj: &DynamicObject) -> AcrResult<Application> {
    let mut raw = serde_json::to_value(obj).map_err(|e| AcrError::Decode(format!("serializing DynamicObject: {}", e)))?;
    strip_managed_fields(&mut raw);
    decode_application(raw)
}

fn map_kube_err(e: kube::Error, namespace: &str, name: &str) -> AcrError {
    match e {
        kube::Error::Api(ae) if ae.code == 404 => AcrError::NotFound(format!("{}/{}", namespace, name)),
        other => AcrError::Store(other.to_string()),
    }
}

/// Application store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeApplicationStore {
    client: Client,
    resource: ApiResource,
}

impl KubeApplicationStore {
    pub fn new(client: Client) -> Self {
        Self { client, resource: application_resource() }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

#[async_trait::async_trait]
impl ApplicationStore for KubeApplicationStore {
    async fn get(&self, namespace: &str, name: &str) -> AcrResult<Application> {
        let obj = self.api(namespace).get(name).await.map_err(|e| map_kube_err(e, namespace, name))?;
        to_application(&obj)
    }

    async fn merge_patch(&self, namespace: &str, name: &str, patch: &PatchDocument) -> AcrResult<Application> {
        let pp = PatchParams::default();
        let obj = match self.api(namespace).patch(name, &pp, &Patch::Merge(patch)).await {
            Ok(o) => o,
            Err(e) => {
                counter!("acr_patch_total", 1u64, "result" => "err");
                return Err(map_kube_err(e, namespace, name));
            }
        };
        counter!("acr_patch_total", 1u64, "result" => "ok");
        debug!(ns = %namespace, name = %name, rv = ?obj.metadata.resource_version, "application patched");
        to_application(&obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_resource_points_at_argo_crd() {
        let ar = application_resource();
        assert_eq!(ar.group, "argoproj.io");
        assert_eq!(ar.version, "v1alpha1");
        assert_eq!(ar.kind, "Application");
        assert_eq!(ar.plural, "applications");
        assert_eq!(ar.api_version, "argoproj.io/v1alpha1");
    }

    #[test]
    fn dynamic_object_converts_and_drops_managed_fields() {
        let mut obj = DynamicObject::new("guestbook", &application_resource()).within("argocd");
        obj.metadata.managed_fields = Some(vec![Default::default()]);
        obj.data = serde_json::json!({
            "operation": { "sync": { "revision": "R1" } },
            "status": { "history": [ { "revision": "R0" } ] }
        });
        let app = to_application(&obj).expect("convert");
        assert_eq!(app.name(), "guestbook");
        assert_eq!(app.namespace(), "argocd");
        assert!(app.metadata.managed_fields.is_none());
        assert_eq!(app.desired_sync().map(|s| s.revision.as_str()), Some("R1"));
        assert_eq!(app.status.history[0].revision, "R0");
    }
}
