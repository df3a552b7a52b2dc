//! Application object store: the get/merge-patch seam the resolver talks to,
//! plus an in-RAM implementation holding raw JSON objects.

#![forbid(unsafe_code)]

use std::sync::Mutex;

use acr_core::{AcrError, AcrResult, AppKey, Application};
use acr_patch::{merge_patch, PatchDocument};
use rustc_hash::FxHashMap;
use serde_json::Value as Json;
use tracing::debug;

/// Point reads and JSON merge patches of Applications.
#[async_trait::async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Fetch by identity. A missing object is `AcrError::NotFound`.
    async fn get(&self, namespace: &str, name: &str) -> AcrResult<Application>;

    /// Apply `patch` with merge-patch semantics and return the updated object.
    async fn merge_patch(&self, namespace: &str, name: &str, patch: &PatchDocument) -> AcrResult<Application>;
}

/// Decode a raw object into the Application model.
pub fn decode_application(raw: Json) -> AcrResult<Application> {
    serde_json::from_value(raw).map_err(|e| AcrError::Decode(format!("application: {}", e)))
}

#[derive(Default)]
struct Inner {
    objects: FxHashMap<AppKey, Json>,
    patches: Vec<(AppKey, Json)>,
    gets: u64,
    fail_patch: Option<String>,
    next_rv: u64,
}

/// In-RAM store. Objects are kept as raw JSON so merge patches behave like
/// the API server's: unknown fields survive and only patched keys change.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object.
    pub fn insert(&self, app: &Application) {
        match serde_json::to_value(app) {
            Ok(raw) => self.insert_raw(raw),
            Err(e) => debug!(error = %e, "memory store: application not encodable; skipped"),
        }
    }

    /// Insert or replace a raw object; identity is read from its metadata.
    pub fn insert_raw(&self, raw: Json) {
        let meta = raw.get("metadata");
        let name = meta.and_then(|m| m.get("name")).and_then(|v| v.as_str()).unwrap_or("").to_string();
        let namespace = meta.and_then(|m| m.get("namespace")).and_then(|v| v.as_str()).unwrap_or("").to_string();
        let mut inner = self.lock();
        inner.objects.insert(AppKey { namespace, name }, raw);
    }

    pub fn get_raw(&self, namespace: &str, name: &str) -> Option<Json> {
        self.lock().objects.get(&AppKey::new(namespace, name)).cloned()
    }

    /// Patches applied so far, in order.
    pub fn patches(&self) -> Vec<(AppKey, Json)> {
        self.lock().patches.clone()
    }

    pub fn get_count(&self) -> u64 {
        self.lock().gets
    }

    /// Make every subsequent patch fail with `message`; `None` restores normal behaviour.
    pub fn fail_patches(&self, message: Option<&str>) {
        self.lock().fail_patch = message.map(str::to_string);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned map is still structurally valid; keep serving it.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait::async_trait]
impl ApplicationStore for MemoryStore {
    async fn get(&self, namespace: &str, name: &str) -> AcrResult<Application> {
        let raw = {
            let mut inner = self.lock();
            inner.gets += 1;
            inner.objects.get(&AppKey::new(namespace, name)).cloned()
        };
        match raw {
            Some(raw) => decode_application(raw),
            None => Err(AcrError::NotFound(format!("{}/{}", namespace, name))),
        }
    }

    async fn merge_patch(&self, namespace: &str, name: &str, patch: &PatchDocument) -> AcrResult<Application> {
        let key = AppKey::new(namespace, name);
        let updated = {
            let mut inner = self.lock();
            if let Some(msg) = inner.fail_patch.clone() {
                return Err(AcrError::Store(msg));
            }
            inner.next_rv += 1;
            let rv = inner.next_rv;
            let obj = inner.objects.get_mut(&key).ok_or_else(|| AcrError::NotFound(key.to_string()))?;
            merge_patch(obj, patch);
            if let Some(meta) = obj.get_mut("metadata").and_then(|m| m.as_object_mut()) {
                meta.insert("resourceVersion".into(), Json::String(rv.to_string()));
            }
            let updated = obj.clone();
            inner.patches.push((key.clone(), patch.as_value()));
            updated
        };
        debug!(app = %key, "memory store: patched");
        decode_application(updated)
    }
}
