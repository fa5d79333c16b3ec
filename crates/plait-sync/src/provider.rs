//! Synchronization provider: one per open document session.

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use n0_future::StreamExt;
use n0_future::boxed::BoxStream;
use tokio::sync::mpsc;

use plait_common::bus::codec;
use plait_common::bus::{
    AgentId, BusRequest, BusResponse, CursorPos, CursorRange, DocumentId, EventBus, InboundEvent,
};

use crate::error::SyncError;
use crate::presence::{PRESENCE_TTL, PeerCursor, PresenceChannel};
use crate::replica::{Origin, ReplicaEvent, TextReplica};
use crate::status::SyncStatus;

/// Orchestrates CRDT synchronization for one document session.
///
/// Owns the replica and presence channel exclusively. Construction
/// wires the replica change channel and the per-document bus
/// subscription; [`SyncProvider::destroy`] (or `Drop`) releases them
/// all, so there is no partial-teardown state.
///
/// Editor mutations are applied synchronously and queued for
/// broadcast; the queue drains in FIFO order through
/// [`SyncProvider::flush`], so one peer's deltas go out in the order
/// the edits happened. The editor is never blocked on a network round
/// trip.
pub struct SyncProvider<B: EventBus> {
    bus: Arc<B>,
    document_id: DocumentId,
    replica: TextReplica,
    presence: PresenceChannel,
    changes: mpsc::UnboundedReceiver<ReplicaEvent>,
    inbound: Option<BoxStream<InboundEvent>>,
    outbound: VecDeque<BusRequest>,
    status: SyncStatus,
    destroyed: bool,
}

impl<B: EventBus> SyncProvider<B> {
    /// Create a provider and wire all subscriptions.
    pub fn new(bus: Arc<B>, document_id: DocumentId, local_agent: AgentId) -> Self {
        let (tx, changes) = mpsc::unbounded_channel();
        let replica = TextReplica::new(tx);
        let inbound = bus.subscribe(&document_id);

        Self {
            bus,
            replica,
            presence: PresenceChannel::new(local_agent),
            changes,
            inbound: Some(inbound),
            outbound: VecDeque::new(),
            status: SyncStatus::Syncing,
            document_id,
            destroyed: false,
        }
    }

    /// Initial reconciliation against the authoritative remote state.
    ///
    /// Requests the full-state snapshot; on success imports it with
    /// `Origin::Init` and ignores `initial_content_hint`, since the
    /// remote state may already carry edits from peers that raced
    /// ahead of this client's bootstrap content. On failure, a
    /// non-empty hint seeds the still-empty replica and the seed delta
    /// is broadcast exactly once so other peers learn of it. Errs only
    /// when neither path applies; callers treat that as "empty
    /// document, proceed".
    pub async fn initialize(
        &mut self,
        initial_content_hint: Option<&str>,
    ) -> Result<(), SyncError> {
        self.status = SyncStatus::Syncing;

        let failure = match self.request_snapshot().await {
            Ok(state) => {
                self.import_remote_state(&state)?;
                self.status = SyncStatus::Synced;
                return Ok(());
            }
            Err(e) => e,
        };
        tracing::warn!(document = %self.document_id, error = %failure, "reconciliation failed");

        let hint = initial_content_hint.unwrap_or("");
        if !hint.is_empty() && self.replica.is_empty() {
            // Brand-new document, no server-side record yet: the local
            // client is the author of the initial state.
            if let Some(delta) = self.replica.seed(hint) {
                self.enqueue(BusRequest::DocumentUpdate {
                    document_id: self.document_id.clone(),
                    update: codec::encode(&delta),
                });
            }
            self.drain_replica_events();
            self.status = SyncStatus::Synced;
            return Ok(());
        }

        self.status = SyncStatus::Error;
        Err(failure)
    }

    /// Force a full reconciliation, e.g. on detected drift or
    /// reconnect. Full-state import with `Origin::Init`; never
    /// broadcasts.
    pub async fn sync_with_server(&mut self) -> Result<(), SyncError> {
        if self.destroyed {
            return Ok(());
        }
        self.status = SyncStatus::Syncing;

        match self.request_snapshot().await {
            Ok(state) => {
                self.import_remote_state(&state)?;
                self.status = SyncStatus::Synced;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(document = %self.document_id, error = %e, "resync failed");
                self.status = SyncStatus::Error;
                Err(e)
            }
        }
    }

    /// Insert text at a character offset.
    ///
    /// The mutation is applied and visible to the editor immediately;
    /// the resulting delta is queued for broadcast.
    pub fn insert(&mut self, char_offset: usize, text: &str) {
        if self.destroyed {
            return;
        }
        self.replica.insert(char_offset, text);
        self.drain_replica_events();
    }

    /// Delete a character range.
    pub fn delete(&mut self, char_range: Range<usize>) {
        if self.destroyed {
            return;
        }
        self.replica.delete(char_range);
        self.drain_replica_events();
    }

    /// Apply one inbound push notification.
    ///
    /// Events for other documents are discarded without side effects;
    /// malformed or empty update payloads are logged and dropped
    /// without touching local state.
    pub fn apply_inbound(&mut self, event: InboundEvent) {
        if self.destroyed || event.document_id() != &self.document_id {
            return;
        }

        match event {
            InboundEvent::Update {
                update,
                source_agent_id,
                ..
            } => {
                let delta = match codec::decode(&update) {
                    Ok(delta) => delta,
                    Err(e) => {
                        tracing::warn!(agent = %source_agent_id, error = %e, "dropping malformed update");
                        return;
                    }
                };
                if delta.is_empty() {
                    tracing::debug!(agent = %source_agent_id, "dropping empty update");
                    return;
                }
                if let Err(e) = self.replica.apply_update(&delta, Origin::Remote) {
                    tracing::warn!(agent = %source_agent_id, error = %e, "dropping unappliable update");
                }
                self.drain_replica_events();
            }
            InboundEvent::Awareness {
                client_id,
                awareness_state,
                ..
            } => {
                self.presence.apply_remote(client_id, awareness_state);
            }
        }
    }

    /// Drain whatever push notifications are already buffered, without
    /// blocking.
    pub fn pump(&mut self) {
        loop {
            let polled = match self.inbound.as_mut() {
                Some(stream) => stream.next().now_or_never(),
                None => return,
            };
            match polled {
                Some(Some(event)) => self.apply_inbound(event),
                Some(None) => {
                    // Bus closed the subscription.
                    self.inbound = None;
                    return;
                }
                None => return,
            }
        }
    }

    /// Await the next push notification and apply it. Returns `false`
    /// once the subscription has ended.
    pub async fn next_inbound(&mut self) -> bool {
        let event = match self.inbound.as_mut() {
            Some(stream) => stream.next().await,
            None => return false,
        };
        match event {
            Some(event) => {
                self.apply_inbound(event);
                true
            }
            None => {
                self.inbound = None;
                false
            }
        }
    }

    /// Send queued outbound events in FIFO order.
    ///
    /// A failed send is logged and dropped; the local edit stands, and
    /// a later delta or a full resync carries the missing state
    /// forward. The status indicator degrades to `Error` until the
    /// next successful reconciliation.
    pub async fn flush(&mut self) {
        if self.destroyed {
            return;
        }
        while let Some(request) = self.outbound.pop_front() {
            if let Err(e) = self.bus.send_event(request).await {
                tracing::warn!(document = %self.document_id, error = %e, "dropping failed broadcast");
                self.status = SyncStatus::Error;
            }
        }
    }

    /// Report local cursor motion. Queues a broadcast when the cursor
    /// actually moved and the rate-limit window has passed.
    pub fn update_local_cursor(&mut self, cursor: CursorPos, selection: Option<CursorRange>) {
        if self.destroyed {
            return;
        }
        if let Some(awareness_state) = self.presence.update_local(cursor, selection) {
            self.enqueue(BusRequest::AwarenessUpdate {
                document_id: self.document_id.clone(),
                awareness_state,
            });
        }
    }

    /// Known peer cursors for rendering (excludes the local peer).
    pub fn peers(&self) -> Vec<PeerCursor> {
        self.presence.peers()
    }

    /// Drop peers whose presence went stale.
    pub fn prune_stale_peers(&mut self) {
        self.presence.prune_stale(PRESENCE_TTL);
    }

    /// Tuning knob for cursor broadcast throttling.
    pub fn set_cursor_broadcast_interval(&mut self, interval: Duration) {
        self.presence.set_min_broadcast_interval(interval);
    }

    /// Export the document as plain text and persist it.
    ///
    /// Unlike broadcasts, a failed save is surfaced: it is a
    /// deliberate user action.
    pub async fn save(&self) -> Result<(), SyncError> {
        self.bus
            .send_event(BusRequest::DocumentSave {
                document_id: self.document_id.clone(),
                content: self.replica.text(),
            })
            .await
            .map(|_| ())
            .map_err(|e| SyncError::Save(e.to_string()))
    }

    /// Plain-text view of the document for the editor.
    pub fn text(&self) -> String {
        self.replica.text()
    }

    /// Current sync indicator state.
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// Release all subscriptions and queued work. Idempotent; `Drop`
    /// also calls it, so every exit path of the owning session tears
    /// down fully.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        // Dropping the stream unsubscribes; in-flight bus calls are
        // not cancelled, only their results go unhandled.
        self.inbound = None;
        self.changes.close();
        self.outbound.clear();
    }

    async fn request_snapshot(&self) -> Result<Vec<u8>, SyncError> {
        let response = self
            .bus
            .send_event(BusRequest::DocumentSync {
                document_id: self.document_id.clone(),
            })
            .await
            .map_err(|e| SyncError::Reconciliation(e.to_string()))?;

        match response {
            BusResponse::Sync { state } => Ok(codec::decode(&state)?),
            BusResponse::Ack => Err(SyncError::Reconciliation(
                "sync request acknowledged without a snapshot".into(),
            )),
        }
    }

    fn import_remote_state(&mut self, snapshot: &[u8]) -> Result<(), SyncError> {
        self.replica.import_snapshot(snapshot)?;
        // Init events are suppressed by the origin gate.
        self.drain_replica_events();
        Ok(())
    }

    /// Forward pending replica change events through the origin gate.
    ///
    /// Only `Local` deltas are re-broadcast. `Remote` and `Init`
    /// applications mutate the replica like any other, so the replica
    /// reports them; they must stop here or they would loop between
    /// peers.
    fn drain_replica_events(&mut self) {
        while let Ok(event) = self.changes.try_recv() {
            match event.origin {
                Origin::Local => {
                    let update = codec::encode(&event.delta);
                    self.enqueue(BusRequest::DocumentUpdate {
                        document_id: self.document_id.clone(),
                        update,
                    });
                }
                Origin::Remote | Origin::Init => {}
            }
        }
    }

    fn enqueue(&mut self, request: BusRequest) {
        if self.destroyed {
            return;
        }
        self.outbound.push_back(request);
    }
}

impl<B: EventBus> Drop for SyncProvider<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
