//! Merge-patch construction for change-revision updates.
//!
//! Pure functions only. A patch holds just the sub-trees being changed
//! (`operation`, `status.operationState`, `metadata.annotations`) so that
//! applying it never clobbers unrelated fields written by other actors.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use acr_core::{annotations, AcrError, AcrResult};
use serde::Serialize;
use serde_json::{json, Map, Value as Json};

/// Where the change revision is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchTarget {
    /// `operation.sync`: the sync is still pending.
    Operation,
    /// `status.operationState.operation.sync`: the sync is already running.
    OperationState,
}

impl PatchTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchTarget::Operation => "operation",
            PatchTarget::OperationState => "status.operationState",
        }
    }
}

/// JSON merge patch restricted to the keys that changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PatchDocument {
    root: Map<String, Json>,
}

impl PatchDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Json> {
        self.root.get(key)
    }

    pub fn as_value(&self) -> Json {
        Json::Object(self.root.clone())
    }

    /// Record the change revisions under `target`. Nothing is written for an
    /// empty list.
    pub fn set_change_revisions(&mut self, target: PatchTarget, revisions: &[String]) {
        let sync = match revisions {
            [] => return,
            [single] => json!({ "changeRevision": single }),
            many => json!({ "changeRevisions": many }),
        };
        let operation = json!({ "sync": sync });
        match target {
            PatchTarget::Operation => {
                self.root.insert("operation".into(), operation);
            }
            PatchTarget::OperationState => {
                self.root.insert("status".into(), json!({ "operationState": { "operation": operation } }));
            }
        }
    }

    /// Set `metadata.annotations` to exactly `changed`. An empty map leaves
    /// the document untouched.
    pub fn set_annotations(&mut self, changed: BTreeMap<String, String>) {
        if changed.is_empty() {
            return;
        }
        self.root.insert("metadata".into(), json!({ "annotations": changed }));
    }
}

impl fmt::Display for PatchDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.root) {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("<unencodable patch>"),
        }
    }
}

/// Patch carrying only the change revision(s) under `target`.
pub fn change_revision_patch(target: PatchTarget, revisions: &[String]) -> PatchDocument {
    let mut doc = PatchDocument::new();
    doc.set_change_revisions(target, revisions);
    doc
}

/// Annotation values mirrored onto the Application alongside the patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorAnnotations {
    pub change_revision: String,
    pub change_revisions: Vec<String>,
    pub git_revision: String,
    pub git_revisions: Vec<String>,
}

impl MirrorAnnotations {
    /// `change_revision` is the computed revision (absent when indeterminate),
    /// `current_revision` the input the computation started from.
    pub fn new(change_revision: Option<&str>, current_revision: &str) -> Self {
        let change_revision = change_revision.unwrap_or_default().to_string();
        let change_revisions = if change_revision.is_empty() { Vec::new() } else { vec![change_revision.clone()] };
        Self {
            change_revision,
            change_revisions,
            git_revision: current_revision.to_string(),
            git_revisions: vec![current_revision.to_string()],
        }
    }

    /// Render the full proposed annotation set.
    pub fn encode(&self) -> AcrResult<BTreeMap<String, String>> {
        let change_revisions = encode_list("changeRevisions", &self.change_revisions)?;
        let git_revisions = encode_list("gitRevisions", &self.git_revisions)?;
        let mut out = BTreeMap::new();
        out.insert(annotations::CHANGE_REVISION.to_string(), self.change_revision.clone());
        out.insert(annotations::CHANGE_REVISIONS.to_string(), change_revisions);
        out.insert(annotations::GIT_REVISION.to_string(), self.git_revision.clone());
        out.insert(annotations::GIT_REVISIONS.to_string(), git_revisions);
        Ok(out)
    }
}

fn encode_list(what: &str, values: &[String]) -> AcrResult<String> {
    serde_json::to_string(values).map_err(|e| AcrError::Encoding(format!("failed to marshal {} {:?}: {}", what, values, e)))
}

/// Keep only the proposed annotations whose value differs from `current`.
pub fn annotation_changes(
    proposed: &BTreeMap<String, String>,
    current: Option<&BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    proposed
        .iter()
        .filter(|(k, v)| current.and_then(|c| c.get(*k)) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Apply an RFC 7386 merge patch onto `target` in place.
pub fn merge_patch(target: &mut Json, patch: &PatchDocument) {
    json_patch::merge(target, &patch.as_value());
}
