use serde::{Deserialize, Serialize};

use crate::model::Application;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Modified => "modified",
            EventKind::Deleted => "deleted",
            EventKind::Bookmark => "bookmark",
            EventKind::Error => "error",
        }
    }
}

/// Snapshot of an Application as seen by the watch, tagged with what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationEvent {
    pub kind: EventKind,
    pub application: Application,
}

impl ApplicationEvent {
    pub fn new(kind: EventKind, application: Application) -> Self {
        Self { kind, application }
    }
}

/// Receiver of watch notifications.
///
/// The event source calls these serially from its own task; implementations
/// may await (for example to apply backpressure) but must not assume any
/// particular watch runtime.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    async fn on_add(&self, app: Application);
    async fn on_update(&self, app: Application);
    async fn on_delete(&self, app: Application);
}
