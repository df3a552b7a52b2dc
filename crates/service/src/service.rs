use std::sync::Arc;
use std::time::Instant;

use acr_core::{AcrResult, Application};
use acr_patch::{annotation_changes, MirrorAnnotations, PatchDocument, PatchTarget};
use acr_store::ApplicationStore;
use metrics::{counter, histogram};
use tracing::{debug, info};

use crate::computer::RevisionComputer;
use crate::locks::{LockScope, ResolutionLocks};
use crate::revisions::{derive_inputs, RevisionInputs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The object has no desired sync operation.
    NoSyncOperation,
    /// The running operation already carries a change revision.
    AlreadyResolved,
}

/// Outcome of one resolution attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Skipped(SkipReason),
    /// Computed, but nothing differed from the stored object.
    Unchanged { inputs: RevisionInputs },
    Patched { inputs: RevisionInputs, revision: Option<String>, patch: PatchDocument },
}

impl Resolution {
    pub fn outcome(&self) -> &'static str {
        match self {
            Resolution::Skipped(SkipReason::NoSyncOperation) => "no_sync_operation",
            Resolution::Skipped(SkipReason::AlreadyResolved) => "already_resolved",
            Resolution::Unchanged { .. } => "unchanged",
            Resolution::Patched { .. } => "patched",
        }
    }
}

/// Resolves and records the change revision of an Application's sync.
#[async_trait::async_trait]
pub trait RevisionResolver: Send + Sync {
    async fn change_revision(&self, app: &Application, use_annotations: bool) -> AcrResult<Resolution>;
}

pub struct AcrService {
    store: Arc<dyn ApplicationStore>,
    computer: Arc<dyn RevisionComputer>,
    locks: ResolutionLocks,
}

impl AcrService {
    pub fn new(store: Arc<dyn ApplicationStore>, computer: Arc<dyn RevisionComputer>) -> Self {
        Self { store, computer, locks: ResolutionLocks::default() }
    }

    pub fn with_lock_scope(mut self, scope: LockScope) -> Self {
        self.locks = ResolutionLocks::new(scope);
        self
    }

    pub fn lock_scope(&self) -> LockScope {
        self.locks.scope()
    }

    async fn resolve_locked(&self, app: &Application, use_annotations: bool) -> AcrResult<Resolution> {
        let key = app.key();
        let fetched = self.store.get(&key.namespace, &key.name).await?;
        if fetched.desired_sync().is_none() {
            debug!(app = %key, "no sync operation; nothing to resolve");
            return Ok(Resolution::Skipped(SkipReason::NoSyncOperation));
        }
        if let Some(existing) = fetched.resolved_change_revision() {
            info!(app = %key, change_revision = %existing, "change revision already calculated");
            return Ok(Resolution::Skipped(SkipReason::AlreadyResolved));
        }

        let inputs = derive_inputs(&fetched);
        info!(app = %key, current = %inputs.current, previous = %inputs.previous, source = ?inputs.source, "calculating change revision");
        let revision = self
            .computer
            .resolve(&key.name, &key.namespace, &inputs.current, &inputs.previous)
            .await?
            .filter(|r| !r.is_empty());
        match &revision {
            Some(rev) => {
                counter!("acr_revision_compute_total", 1u64, "result" => "resolved");
                info!(app = %key, change_revision = %rev, "change revision computed");
            }
            None => {
                counter!("acr_revision_compute_total", 1u64, "result" => "empty");
                info!(app = %key, "change revision is empty");
            }
        }
        let revisions: Vec<String> = revision.iter().cloned().collect();

        // State may have moved on while the computer ran; patch against the latest.
        let latest = self.store.get(&key.namespace, &key.name).await?;
        let mut patch = PatchDocument::new();
        if !revisions.is_empty() {
            let target = if latest.running_sync().is_some() { PatchTarget::OperationState } else { PatchTarget::Operation };
            debug!(app = %key, target = target.as_str(), "patch target selected");
            patch.set_change_revisions(target, &revisions);
        }
        if use_annotations {
            let proposed = MirrorAnnotations::new(revision.as_deref(), &inputs.current).encode()?;
            let changed = annotation_changes(&proposed, latest.annotations());
            if changed.is_empty() {
                debug!(app = %key, "annotations already up to date");
            }
            patch.set_annotations(changed);
        }

        if patch.is_empty() {
            info!(app = %key, "no patch needed");
            return Ok(Resolution::Unchanged { inputs });
        }
        info!(app = %key, patch = %patch, "patching application");
        self.store.merge_patch(&key.namespace, &key.name, &patch).await?;
        Ok(Resolution::Patched { inputs, revision, patch })
    }
}

#[async_trait::async_trait]
impl RevisionResolver for AcrService {
    async fn change_revision(&self, app: &Application, use_annotations: bool) -> AcrResult<Resolution> {
        let t0 = Instant::now();
        let key = app.key();
        let _guard = self.locks.acquire(&key).await;
        let res = self.resolve_locked(app, use_annotations).await;
        histogram!("acr_resolve_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
        if let Ok(r) = &res {
            debug!(app = %key, outcome = r.outcome(), took_ms = %t0.elapsed().as_millis(), "resolution finished");
        }
        res
    }
}
