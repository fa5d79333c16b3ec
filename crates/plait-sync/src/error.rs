//! Error types for the sync layer.
//!
//! Nothing here is fatal to the host application: apart from `Save`,
//! which a deliberate user action observes directly, every failure
//! degrades to "this document may be out of sync" and shows up on the
//! status indicator.

use miette::Diagnostic;
use thiserror::Error;

use plait_common::bus::codec::CodecError;

/// Errors that can occur while synchronizing a document session.
#[derive(Debug, Error, Diagnostic)]
#[diagnostic(code(plait::sync))]
#[non_exhaustive]
pub enum SyncError {
    /// Initial or manual reconciliation could not complete.
    #[error("reconciliation failed: {0}")]
    Reconciliation(String),

    /// A delta could not be applied to the replica. The apply call is
    /// all-or-nothing, so local state is untouched.
    #[error("failed to apply update: {0}")]
    Apply(String),

    /// An outbound broadcast failed. Logged and dropped at the call
    /// site; never surfaced past the status indicator.
    #[error("broadcast failed: {0}")]
    Broadcast(String),

    /// An explicit save failed.
    #[error("save failed: {0}")]
    Save(String),

    /// A wire payload did not decode to bytes.
    #[error("malformed update payload")]
    Codec(#[from] CodecError),
}

impl From<loro::LoroError> for SyncError {
    fn from(e: loro::LoroError) -> Self {
        SyncError::Apply(e.to_string())
    }
}
