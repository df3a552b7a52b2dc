//! Deriving the `current`/`previous` revision pair from sync history.

use acr_core::{Application, SyncStatusCode};

/// Which branch of the history the inputs came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    /// No history yet: first sync of the application.
    FirstSync,
    /// The sync finished; diff the deployed revision against the one before it.
    CompletedSync,
    /// The sync is pending or running; diff the target against the last deployment.
    InProgressSync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionInputs {
    pub current: String,
    pub previous: String,
    pub source: InputSource,
}

fn desired_revision(app: &Application) -> String {
    app.desired_sync().map(|s| s.revision.clone()).unwrap_or_default()
}

/// Derive the revision pair handed to the revision computer.
///
/// `previous` is always a completed history entry; history is oldest first.
pub fn derive_inputs(app: &Application) -> RevisionInputs {
    let history = &app.status.history;
    let Some(last) = history.last() else {
        return RevisionInputs { current: desired_revision(app), previous: String::new(), source: InputSource::FirstSync };
    };

    if app.status.sync.status == SyncStatusCode::Synced {
        if let Some(deployed) = app.sync_result_revision() {
            let previous = if history.len() == 1 { String::new() } else { history[history.len() - 2].revision.clone() };
            return RevisionInputs { current: deployed.to_string(), previous, source: InputSource::CompletedSync };
        }
    }

    RevisionInputs { current: desired_revision(app), previous: last.revision.clone(), source: InputSource::InProgressSync }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acr_core::{Operation, OperationState, RevisionHistory, SyncOperation, SyncOperationResult};

    fn app(status: SyncStatusCode, history: &[&str], desired: Option<&str>, deployed: Option<&str>) -> Application {
        let mut a = Application::default();
        a.status.sync.status = status;
        a.status.history = history.iter().map(|r| RevisionHistory { revision: r.to_string(), ..Default::default() }).collect();
        a.operation = desired.map(|r| Operation { sync: Some(SyncOperation { revision: r.to_string(), ..Default::default() }) });
        if let Some(r) = deployed {
            a.status.operation_state = Some(OperationState {
                sync_result: Some(SyncOperationResult { revision: r.to_string(), ..Default::default() }),
                ..Default::default()
            });
        }
        a
    }

    #[test]
    fn first_sync_has_no_previous() {
        let inputs = derive_inputs(&app(SyncStatusCode::OutOfSync, &[], Some("R1"), None));
        assert_eq!((inputs.current.as_str(), inputs.previous.as_str()), ("R1", ""));
        assert_eq!(inputs.source, InputSource::FirstSync);
    }

    #[test]
    fn completed_first_sync_has_no_previous() {
        let inputs = derive_inputs(&app(SyncStatusCode::Synced, &["R1"], Some("R1"), Some("R1")));
        assert_eq!((inputs.current.as_str(), inputs.previous.as_str()), ("R1", ""));
        assert_eq!(inputs.source, InputSource::CompletedSync);
    }

    #[test]
    fn completed_sync_diffs_against_second_to_last() {
        let inputs = derive_inputs(&app(SyncStatusCode::Synced, &["R0", "R1", "R2"], None, Some("R2")));
        assert_eq!((inputs.current.as_str(), inputs.previous.as_str()), ("R2", "R1"));
    }

    #[test]
    fn in_progress_sync_diffs_against_last() {
        let inputs = derive_inputs(&app(SyncStatusCode::OutOfSync, &["R1"], Some("R2"), None));
        assert_eq!((inputs.current.as_str(), inputs.previous.as_str()), ("R2", "R1"));
        assert_eq!(inputs.source, InputSource::InProgressSync);
    }

    #[test]
    fn synced_without_result_is_treated_as_in_progress() {
        let inputs = derive_inputs(&app(SyncStatusCode::Synced, &["R1", "R2"], Some("R3"), None));
        assert_eq!((inputs.current.as_str(), inputs.previous.as_str()), ("R3", "R2"));
        assert_eq!(inputs.source, InputSource::InProgressSync);
    }
}
