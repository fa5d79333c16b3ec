//! Request/response event bus used to reach the agent network.
//!
//! - `EventBus`: the transport contract (one send call + per-document
//!   subscriptions)
//! - event, request and response shapes
//! - `codec`: CRDT delta bytes ↔ JSON-safe integer arrays

pub mod codec;
mod events;
mod transport;

pub use events::{
    AgentId, AwarenessState, BusRequest, BusResponse, CursorPos, CursorRange, DocumentId,
    InboundEvent,
};
pub use transport::{BusError, EventBus};
