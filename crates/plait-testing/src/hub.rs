//! The in-memory hub and its per-client bus handles.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use loro::{ExportMode, LoroDoc};
use n0_future::boxed::BoxStream;
use n0_future::stream;
use tokio::sync::mpsc;

use plait_common::bus::codec;
use plait_common::bus::{
    AgentId, BusError, BusRequest, BusResponse, DocumentId, EventBus, InboundEvent,
};

struct Subscriber {
    agent_id: AgentId,
    sender: mpsc::UnboundedSender<InboundEvent>,
}

#[derive(Default)]
struct HubState {
    docs: HashMap<DocumentId, LoroDoc>,
    saved: HashMap<DocumentId, String>,
    subscribers: HashMap<DocumentId, Vec<Subscriber>>,
    sent_updates: HashMap<AgentId, usize>,
    offline: HashSet<AgentId>,
}

/// Shared hub; hand out one [`MemoryBusClient`] per simulated peer.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus handle for one peer identity.
    pub fn client(&self, agent_id: impl Into<AgentId>) -> MemoryBusClient {
        MemoryBusClient {
            state: self.state.clone(),
            agent_id: agent_id.into(),
        }
    }

    /// Create (or replace) a server-side document from plain text.
    pub fn put_document(&self, document_id: &DocumentId, text: &str) {
        let doc = LoroDoc::new();
        doc.get_text("content")
            .insert(0, text)
            .expect("seed in-memory document");
        doc.commit();
        self.lock().docs.insert(document_id.clone(), doc);
    }

    /// Plain-text view of the authoritative document, if one exists.
    pub fn document_text(&self, document_id: &DocumentId) -> Option<String> {
        self.lock()
            .docs
            .get(document_id)
            .map(|doc| doc.get_text("content").to_string())
    }

    /// Content stored by the last `document.save`.
    pub fn saved_content(&self, document_id: &DocumentId) -> Option<String> {
        self.lock().saved.get(document_id).cloned()
    }

    /// How many document updates a client has successfully handed to
    /// the hub. The loop-prevention assertions hang off this.
    pub fn update_count(&self, agent_id: &AgentId) -> usize {
        self.lock().sent_updates.get(agent_id).copied().unwrap_or(0)
    }

    /// Toggle simulated connectivity for one client; while offline,
    /// every `send_event` from it fails.
    pub fn set_offline(&self, agent_id: &AgentId, offline: bool) {
        let mut state = self.lock();
        if offline {
            state.offline.insert(agent_id.clone());
        } else {
            state.offline.remove(agent_id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().expect("hub state lock")
    }
}

/// One peer's view of the hub, implementing [`EventBus`].
pub struct MemoryBusClient {
    state: Arc<Mutex<HubState>>,
    agent_id: AgentId,
}

impl MemoryBusClient {
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    fn handle(&self, request: BusRequest) -> Result<BusResponse, BusError> {
        let mut state = self.state.lock().expect("hub state lock");

        if state.offline.contains(&self.agent_id) {
            return Err(BusError::Request("simulated offline".into()));
        }

        match request {
            BusRequest::DocumentSync { document_id } => {
                let doc = state.docs.get(&document_id).ok_or(BusError::NotFound)?;
                let snapshot = doc
                    .export(ExportMode::Snapshot)
                    .map_err(|e| BusError::Request(Box::new(e)))?;
                Ok(BusResponse::Sync {
                    state: codec::encode(&snapshot),
                })
            }

            BusRequest::DocumentUpdate {
                document_id,
                update,
            } => {
                *state.sent_updates.entry(self.agent_id.clone()).or_insert(0) += 1;

                let bytes = codec::decode(&update).map_err(|e| BusError::Request(Box::new(e)))?;
                let doc = state
                    .docs
                    .entry(document_id.clone())
                    .or_insert_with(LoroDoc::new);
                doc.import(&bytes)
                    .map_err(|e| BusError::Request(Box::new(e)))?;

                fan_out(
                    &mut state,
                    &document_id,
                    &self.agent_id,
                    InboundEvent::Update {
                        document_id: document_id.clone(),
                        update,
                        source_agent_id: self.agent_id.clone(),
                    },
                );
                Ok(BusResponse::Ack)
            }

            BusRequest::AwarenessUpdate {
                document_id,
                awareness_state,
            } => {
                fan_out(
                    &mut state,
                    &document_id,
                    &self.agent_id,
                    InboundEvent::Awareness {
                        document_id: document_id.clone(),
                        client_id: self.agent_id.clone(),
                        awareness_state,
                    },
                );
                Ok(BusResponse::Ack)
            }

            BusRequest::DocumentSave {
                document_id,
                content,
            } => {
                state.saved.insert(document_id, content);
                Ok(BusResponse::Ack)
            }
        }
    }
}

/// Deliver an event to every live subscriber of the document except
/// the sender, pruning subscribers whose stream has been dropped.
fn fan_out(state: &mut HubState, document_id: &DocumentId, sender: &AgentId, event: InboundEvent) {
    let Some(subscribers) = state.subscribers.get_mut(document_id) else {
        return;
    };
    subscribers.retain(|sub| {
        if sub.agent_id == *sender {
            return true;
        }
        sub.sender.send(event.clone()).is_ok()
    });
}

impl EventBus for MemoryBusClient {
    fn send_event(
        &self,
        request: BusRequest,
    ) -> impl Future<Output = Result<BusResponse, BusError>> + Send {
        std::future::ready(self.handle(request))
    }

    fn subscribe(&self, document_id: &DocumentId) -> BoxStream<InboundEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.state
            .lock()
            .expect("hub state lock")
            .subscribers
            .entry(document_id.clone())
            .or_default()
            .push(Subscriber {
                agent_id: self.agent_id.clone(),
                sender,
            });

        Box::pin(stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use n0_future::StreamExt;

    #[tokio::test]
    async fn test_sync_unknown_document_is_not_found() {
        let hub = MemoryHub::new();
        let client = hub.client("agent-a");

        let result = client
            .send_event(BusRequest::DocumentSync {
                document_id: "doc-1".into(),
            })
            .await;

        assert!(matches!(result, Err(BusError::NotFound)));
    }

    #[tokio::test]
    async fn test_update_creates_document_and_fans_out() {
        let hub = MemoryHub::new();
        let sender = hub.client("agent-a");
        let listener = hub.client("agent-b");
        let doc_id: DocumentId = "doc-1".into();

        let mut inbound = listener.subscribe(&doc_id);

        let doc = LoroDoc::new();
        doc.get_text("content").insert(0, "hi").unwrap();
        doc.commit();
        let update = codec::encode(&doc.export(ExportMode::Snapshot).unwrap());

        sender
            .send_event(BusRequest::DocumentUpdate {
                document_id: doc_id.clone(),
                update,
            })
            .await
            .unwrap();

        assert_eq!(hub.document_text(&doc_id).as_deref(), Some("hi"));
        assert_eq!(hub.update_count(sender.agent_id()), 1);
        assert!(matches!(
            inbound.next().await,
            Some(InboundEvent::Update { .. })
        ));
    }

    #[tokio::test]
    async fn test_offline_client_fails_to_send() {
        let hub = MemoryHub::new();
        let client = hub.client("agent-a");
        hub.set_offline(client.agent_id(), true);

        let result = client
            .send_event(BusRequest::DocumentSave {
                document_id: "doc-1".into(),
                content: "text".into(),
            })
            .await;
        assert!(result.is_err());

        hub.set_offline(client.agent_id(), false);
        let result = client
            .send_event(BusRequest::DocumentSave {
                document_id: "doc-1".into(),
                content: "text".into(),
            })
            .await;
        assert!(result.is_ok());
    }
}
