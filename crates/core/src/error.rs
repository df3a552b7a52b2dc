use std::time::Duration;

/// Errors surfaced by the resolver and its collaborators.
///
/// Variants carry rendered messages so they can cross task and transport
/// boundaries without dragging client error types along.
#[derive(Debug, thiserror::Error)]
pub enum AcrError {
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("store: {0}")]
    Store(String),
    #[error("revision_computer: {0}")]
    RevisionComputer(String),
    /// Failed to JSON-encode a value going into a patch.
    #[error("encoding: {0}")]
    Encoding(String),
    /// Failed to decode an object coming from the cluster or a service.
    #[error("decode: {0}")]
    Decode(String),
    #[error("timeout: reconciliation exceeded {0:?}")]
    Timeout(Duration),
    #[error("config: {0}")]
    Config(String),
}

impl AcrError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AcrError::NotFound(_))
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AcrError::NotFound(_) => "not_found",
            AcrError::Store(_) => "store",
            AcrError::RevisionComputer(_) => "revision_computer",
            AcrError::Encoding(_) => "encoding",
            AcrError::Decode(_) => "decode",
            AcrError::Timeout(_) => "timeout",
            AcrError::Config(_) => "config",
        }
    }
}

pub type AcrResult<T> = Result<T, AcrError>;
