//! CRDT document synchronization over the agent-network event bus.
//!
//! This crate provides:
//! - `TextReplica`: loro-backed replica with origin-tagged change events
//! - `SyncProvider`: initial reconciliation, outbound delta broadcast
//!   with loop prevention, inbound delta application, lifecycle
//! - `PresenceChannel`: ephemeral per-peer cursor state, never part of
//!   the durable document
//! - `SyncStatus`: the user-visible sync indicator

mod error;
mod presence;
mod provider;
mod replica;
mod status;

pub use error::SyncError;
pub use presence::{
    CURSOR_BROADCAST_MIN_INTERVAL, PRESENCE_TTL, PeerCursor, PresenceChannel,
};
pub use provider::SyncProvider;
pub use replica::{Origin, ReplicaEvent, TextReplica};
pub use status::SyncStatus;

// Re-export loro types that consumers need
pub use loro::{LoroDoc, VersionVector};
