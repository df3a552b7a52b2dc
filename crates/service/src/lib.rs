//! Change-revision resolution: decide whether an Application's sync needs a
//! change revision, derive the inputs from its history, ask the revision
//! computer and persist the answer with a minimal merge patch.

#![forbid(unsafe_code)]

pub mod computer;
pub mod locks;
pub mod revisions;
mod service;

pub use computer::{HttpRevisionComputer, RevisionComputer};
pub use locks::{LockScope, ResolutionLocks};
pub use revisions::{derive_inputs, InputSource, RevisionInputs};
pub use service::{AcrService, Resolution, RevisionResolver, SkipReason};
