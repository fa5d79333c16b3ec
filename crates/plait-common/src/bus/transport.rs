//! The transport contract the sync layer is written against.

use std::future::Future;

use miette::Diagnostic;
use n0_future::boxed::BoxStream;

use super::events::{BusRequest, BusResponse, DocumentId, InboundEvent};

/// Error type for bus operations.
///
/// The sync layer treats every variant uniformly as a failed call; the
/// split exists for logging and for the reconciliation fallback, where
/// "no record" and "network down" both route to seeding.
#[derive(Debug, thiserror::Error, Diagnostic)]
#[diagnostic(code(plait::bus))]
pub enum BusError {
    /// The remote side has no record of the requested document.
    #[error("no record for document")]
    NotFound,

    /// The request could not be completed (network, auth, server
    /// rejection; timeout semantics live in the bus implementation).
    #[error("bus request failed")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The bus is shutting down.
    #[error("event bus closed")]
    Closed,
}

/// Request/response access to the agent network plus per-document push
/// subscriptions.
///
/// There is no persistent bidirectional connection and no ordering
/// guarantee across separate `send_event` calls. Subscriptions are the
/// application-level surface for push notifications, scoped to one
/// document so consumers never see another session's traffic; dropping
/// the returned stream unsubscribes.
pub trait EventBus: Send + Sync + 'static {
    /// Issue one request/response call.
    fn send_event(
        &self,
        request: BusRequest,
    ) -> impl Future<Output = Result<BusResponse, BusError>> + Send;

    /// Subscribe to push notifications for one document.
    fn subscribe(&self, document_id: &DocumentId) -> BoxStream<InboundEvent>;
}
