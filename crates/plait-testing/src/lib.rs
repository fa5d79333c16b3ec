//! In-memory event hub for exercising the plait sync layer without a
//! network.
//!
//! The hub plays the agent network's part: it holds an authoritative
//! replica per document, answers sync requests with full snapshots,
//! fans updates and awareness out to subscribers, and records what
//! each client sent. Failure injection covers offline transports and
//! missing documents.

mod hub;

pub use hub::{MemoryBusClient, MemoryHub};
