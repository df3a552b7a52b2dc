//! Serialization of resolutions, either globally or per Application.

use std::sync::{Arc, Mutex};

use acr_core::AppKey;
use rustc_hash::FxHashMap;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, OwnedMutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockScope {
    /// One resolution at a time across all Applications.
    #[default]
    Global,
    /// One resolution at a time per Application identity.
    PerApplication,
}

type Table = FxHashMap<AppKey, Arc<AsyncMutex<()>>>;

pub struct ResolutionLocks {
    scope: LockScope,
    global: AsyncMutex<()>,
    table: Mutex<Table>,
}

/// Held for the whole fetch/compute/patch sequence.
pub enum ResolutionGuard<'a> {
    Global(MutexGuard<'a, ()>),
    Keyed(KeyedGuard<'a>),
}

pub struct KeyedGuard<'a> {
    table: &'a Mutex<Table>,
    key: AppKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(|p| p.into_inner());
        drop(self.guard.take());
        // Entries are cloned only under the table lock, so a count of one
        // means nobody else holds or waits on it.
        if table.get(&self.key).is_some_and(|m| Arc::strong_count(m) == 1) {
            table.remove(&self.key);
        }
    }
}

impl ResolutionLocks {
    pub fn new(scope: LockScope) -> Self {
        Self { scope, global: AsyncMutex::new(()), table: Mutex::new(FxHashMap::default()) }
    }

    pub fn scope(&self) -> LockScope {
        self.scope
    }

    pub async fn acquire(&self, key: &AppKey) -> ResolutionGuard<'_> {
        match self.scope {
            LockScope::Global => ResolutionGuard::Global(self.global.lock().await),
            LockScope::PerApplication => {
                let entry = {
                    let mut table = self.table.lock().unwrap_or_else(|p| p.into_inner());
                    // Waiters cancelled mid-acquire leave idle entries behind.
                    table.retain(|k, m| k == key || Arc::strong_count(m) > 1);
                    Arc::clone(table.entry(key.clone()).or_default())
                };
                let guard = entry.lock_owned().await;
                ResolutionGuard::Keyed(KeyedGuard { table: &self.table, key: key.clone(), guard: Some(guard) })
            }
        }
    }

    /// Number of per-application entries currently tracked.
    pub fn tracked(&self) -> usize {
        self.table.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl Default for ResolutionLocks {
    fn default() -> Self {
        Self::new(LockScope::Global)
    }
}
