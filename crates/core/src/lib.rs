//! Core types for the change-revision controller: the Application model,
//! watch events, the event sink seam and the shared error type.

#![forbid(unsafe_code)]

pub mod error;
pub mod event;
pub mod model;

pub use error::{AcrError, AcrResult};
pub use event::{ApplicationEvent, EventKind, EventSink};
pub use model::{
    AppKey, Application, ApplicationStatus, Operation, OperationState, RevisionHistory, SyncOperation,
    SyncOperationResult, SyncStatus, SyncStatusCode,
};

/// Annotation keys mirrored onto Applications when annotation mode is on.
pub mod annotations {
    pub const CHANGE_REVISION: &str = "mrp-controller.argoproj.io/change-revision";
    pub const CHANGE_REVISIONS: &str = "mrp-controller.argoproj.io/change-revisions";
    pub const GIT_REVISION: &str = "mrp-controller.argoproj.io/git-revision";
    pub const GIT_REVISIONS: &str = "mrp-controller.argoproj.io/git-revisions";
}
