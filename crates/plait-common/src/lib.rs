//! Shared boundary types for the plait document-sync layer.
//!
//! The sync core talks to the agent network through a single
//! request/response call plus per-document push subscriptions. This
//! crate pins down that boundary so the core and any bus
//! implementation (including the in-memory test hub) agree on it.

pub mod bus;

pub use bus::{
    AgentId, AwarenessState, BusError, BusRequest, BusResponse, CursorPos, CursorRange,
    DocumentId, EventBus, InboundEvent,
};
