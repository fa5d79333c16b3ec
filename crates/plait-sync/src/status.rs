//! Sync status read model.
//!
//! The host UI renders this as the per-document sync indicator; it is
//! the only user-visible surface of transport trouble short of a
//! failed save.

/// Synchronization state of one document session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    /// Reconciliation or manual resync in progress.
    #[default]
    Syncing,
    /// Local replica believed consistent with the remote state.
    Synced,
    /// A sync or broadcast failure occurred since the last successful
    /// reconciliation.
    Error,
}

impl SyncStatus {
    /// Returns true once reconciliation has succeeded and nothing has
    /// failed since.
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced)
    }

    /// Returns true if the session has seen an unrecovered failure.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}
