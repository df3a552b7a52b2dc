#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use acr_core::{
    AcrError, AcrResult, Application, Operation, OperationState, RevisionHistory, SyncOperation, SyncOperationResult,
    SyncStatusCode,
};
use acr_service::RevisionComputer;
use acr_store::MemoryStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub app: String,
    pub namespace: String,
    pub current: String,
    pub previous: String,
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// Revision computer returning a fixed answer and recording every call.
pub struct ScriptedComputer {
    reply: Mutex<AcrResult<Option<String>>>,
    calls: Mutex<Vec<Call>>,
    on_call: Mutex<Option<Hook>>,
}

impl ScriptedComputer {
    pub fn returning(rev: Option<&str>) -> Arc<Self> {
        Arc::new(Self { reply: Mutex::new(Ok(rev.map(str::to_string))), calls: Mutex::new(Vec::new()), on_call: Mutex::new(None) })
    }

    pub fn failing(msg: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Err(AcrError::RevisionComputer(msg.to_string()))),
            calls: Mutex::new(Vec::new()),
            on_call: Mutex::new(None),
        })
    }

    /// Run `hook` while the computation is "in flight".
    pub fn on_call(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_call.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RevisionComputer for ScriptedComputer {
    async fn resolve(&self, app_name: &str, namespace: &str, current: &str, previous: &str) -> AcrResult<Option<String>> {
        self.calls.lock().unwrap().push(Call {
            app: app_name.to_string(),
            namespace: namespace.to_string(),
            current: current.to_string(),
            previous: previous.to_string(),
        });
        if let Some(hook) = self.on_call.lock().unwrap().as_ref() {
            hook();
        }
        match &*self.reply.lock().unwrap() {
            Ok(v) => Ok(v.clone()),
            Err(e) => Err(AcrError::RevisionComputer(e.to_string())),
        }
    }
}

/// Fluent builder for Applications in the shapes the resolver cares about.
pub struct AppBuilder {
    app: Application,
}

pub fn app(name: &str) -> AppBuilder {
    let mut app = Application::default();
    app.metadata.name = Some(name.to_string());
    app.metadata.namespace = Some("argocd".to_string());
    AppBuilder { app }
}

impl AppBuilder {
    pub fn desired(mut self, revision: &str) -> Self {
        self.app.operation =
            Some(Operation { sync: Some(SyncOperation { revision: revision.to_string(), ..Default::default() }) });
        self
    }

    pub fn empty_operation(mut self) -> Self {
        self.app.operation = Some(Operation::default());
        self
    }

    pub fn history(mut self, revisions: &[&str]) -> Self {
        self.app.status.history = revisions
            .iter()
            .enumerate()
            .map(|(i, r)| RevisionHistory { revision: r.to_string(), id: Some(i as i64), ..Default::default() })
            .collect();
        self
    }

    pub fn synced(mut self) -> Self {
        self.app.status.sync.status = SyncStatusCode::Synced;
        self
    }

    pub fn out_of_sync(mut self) -> Self {
        self.app.status.sync.status = SyncStatusCode::OutOfSync;
        self
    }

    /// Mirror the desired sync into `status.operationState`.
    pub fn running(mut self, revision: &str) -> Self {
        let st = self.app.status.operation_state.get_or_insert_with(OperationState::default);
        st.operation.sync = Some(SyncOperation { revision: revision.to_string(), ..Default::default() });
        st.phase = Some("Running".into());
        self
    }

    pub fn sync_result(mut self, revision: &str) -> Self {
        let st = self.app.status.operation_state.get_or_insert_with(OperationState::default);
        st.sync_result = Some(SyncOperationResult { revision: revision.to_string(), ..Default::default() });
        st.phase = Some("Succeeded".into());
        self
    }

    pub fn running_change_revision(mut self, rev: &str) -> Self {
        let st = self.app.status.operation_state.get_or_insert_with(OperationState::default);
        let sync = st.operation.sync.get_or_insert_with(SyncOperation::default);
        sync.change_revision = Some(rev.to_string());
        self
    }

    pub fn running_change_revisions(mut self, revs: &[&str]) -> Self {
        let st = self.app.status.operation_state.get_or_insert_with(OperationState::default);
        let sync = st.operation.sync.get_or_insert_with(SyncOperation::default);
        sync.change_revisions = revs.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.app.metadata.annotations.get_or_insert_with(BTreeMap::new).insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> Application {
        self.app
    }
}

pub fn store_with(app: &Application) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert(app);
    store
}
