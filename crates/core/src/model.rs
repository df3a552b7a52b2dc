//! Application model, limited to the fields the controller reads or patches.
//!
//! Everything else on the object is ignored on decode. These are value
//! snapshots: code never mutates a fetched Application to write it back, it
//! builds a patch instead.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "argoproj.io";
pub const VERSION: &str = "v1alpha1";
pub const KIND: &str = "Application";
pub const PLURAL: &str = "applications";

/// Identity of an Application inside the cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppKey {
    pub namespace: String,
    pub name: String,
}

impl AppKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for AppKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Desired operation, set by whoever requests a sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    #[serde(default)]
    pub status: ApplicationStatus,
}

impl Application {
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("")
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or("")
    }

    pub fn key(&self) -> AppKey {
        AppKey::new(self.namespace(), self.name())
    }

    pub fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.annotations.as_ref()
    }

    /// Sync sub-operation of the desired operation.
    pub fn desired_sync(&self) -> Option<&SyncOperation> {
        self.operation.as_ref().and_then(|op| op.sync.as_ref())
    }

    /// Sync sub-operation mirrored into `status.operationState`.
    pub fn running_sync(&self) -> Option<&SyncOperation> {
        self.status.operation_state.as_ref().and_then(|st| st.operation.sync.as_ref())
    }

    /// Change revision already recorded for the running operation, if any.
    pub fn resolved_change_revision(&self) -> Option<&str> {
        self.running_sync().and_then(SyncOperation::change_revision)
    }

    /// Revision the last completed sync actually deployed.
    pub fn sync_result_revision(&self) -> Option<&str> {
        self.status
            .operation_state
            .as_ref()
            .and_then(|st| st.sync_result.as_ref())
            .map(|r| r.revision.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncOperation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Target revision of the sync.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,
    /// Target revisions for multi-source applications.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub revisions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub change_revisions: Vec<String>,
}

impl SyncOperation {
    /// The single change revision when set, otherwise the head of the list.
    pub fn change_revision(&self) -> Option<&str> {
        match self.change_revision.as_deref() {
            Some(rev) if !rev.is_empty() => Some(rev),
            _ => self.change_revisions.first().map(String::as_str).filter(|rev| !rev.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    #[serde(default)]
    pub sync: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_state: Option<OperationState>,
    /// Completed deployments, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<RevisionHistory>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    #[serde(default)]
    pub status: SyncStatusCode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatusCode {
    Synced,
    OutOfSync,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationState {
    #[serde(default)]
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_result: Option<SyncOperationResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperationResult {
    #[serde(default)]
    pub revision: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub revisions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionHistory {
    #[serde(default)]
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Application",
            "metadata": {
                "name": "guestbook",
                "namespace": "argocd",
                "annotations": { "team": "web" },
                "resourceVersion": "42"
            },
            "spec": { "project": "default" },
            "operation": { "sync": { "revision": "R2" } },
            "status": {
                "sync": { "status": "OutOfSync" },
                "health": { "status": "Healthy" },
                "operationState": {
                    "phase": "Running",
                    "operation": { "sync": { "revision": "R2", "changeRevisions": ["C9"] } }
                },
                "history": [ { "revision": "R1", "id": 0, "deployedAt": "2024-01-01T00:00:00Z" } ]
            }
        })
    }

    #[test]
    fn decodes_argo_application_ignoring_unknown_fields() {
        let app: Application = serde_json::from_value(sample()).expect("decode");
        assert_eq!(app.key(), AppKey::new("argocd", "guestbook"));
        assert_eq!(app.key().to_string(), "argocd/guestbook");
        assert_eq!(app.status.sync.status, SyncStatusCode::OutOfSync);
        assert_eq!(app.desired_sync().map(|s| s.revision.as_str()), Some("R2"));
        assert_eq!(app.status.history.len(), 1);
        assert_eq!(app.annotations().and_then(|a| a.get("team")).map(String::as_str), Some("web"));
    }

    #[test]
    fn resolved_change_revision_falls_back_to_list_head() {
        let app: Application = serde_json::from_value(sample()).expect("decode");
        assert_eq!(app.resolved_change_revision(), Some("C9"));

        let mut single = app.clone();
        if let Some(st) = single.status.operation_state.as_mut() {
            if let Some(sync) = st.operation.sync.as_mut() {
                sync.change_revision = Some("C1".into());
            }
        }
        assert_eq!(single.resolved_change_revision(), Some("C1"));
    }

    #[test]
    fn empty_change_revision_counts_as_unresolved() {
        let sync = SyncOperation { change_revision: Some(String::new()), change_revisions: vec![String::new()], ..Default::default() };
        assert_eq!(sync.change_revision(), None);
        assert_eq!(Application::default().resolved_change_revision(), None);
    }

    #[test]
    fn unknown_sync_status_maps_to_unknown() {
        let st: SyncStatus = serde_json::from_value(serde_json::json!({ "status": "Progressing" })).expect("decode");
        assert_eq!(st.status, SyncStatusCode::Unknown);
        let st: SyncStatus = serde_json::from_value(serde_json::json!({})).expect("decode");
        assert_eq!(st.status, SyncStatusCode::Unknown);
    }
}
