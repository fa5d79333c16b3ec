//! Logical event shapes exchanged with the agent network.
//!
//! Wire encoding (envelopes, auth, transport framing) is the bus
//! implementation's concern; these are the field shapes only. Updates
//! travel as arrays of integers because the bus payload is JSON; see
//! [`super::codec`].

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Opaque document identifier, stable for the lifetime of a
/// collaborative session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(SmolStr);

impl DocumentId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identity of a peer on the agent network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(SmolStr);

impl AgentId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Cursor position as the editor widget reports it (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPos {
    #[serde(rename = "lineNumber")]
    pub line: u32,
    pub column: u32,
}

impl CursorPos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Selection range (anchor, head).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRange {
    pub anchor: CursorPos,
    pub head: CursorPos,
}

/// Ephemeral per-peer editing state. Never persisted into the durable
/// document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwarenessState {
    pub cursor: CursorPos,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<CursorRange>,
}

/// Outbound requests issued by the sync layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum BusRequest {
    /// Ask the remote side for the authoritative full-state snapshot.
    #[serde(rename = "document.sync")]
    DocumentSync { document_id: DocumentId },

    /// Broadcast an incremental document update to peers.
    #[serde(rename = "document.update")]
    DocumentUpdate {
        document_id: DocumentId,
        update: Vec<i64>,
    },

    /// Broadcast the local peer's ephemeral presence state.
    #[serde(rename = "document.awareness_update")]
    AwarenessUpdate {
        document_id: DocumentId,
        awareness_state: AwarenessState,
    },

    /// Persist the document as plain text.
    #[serde(rename = "document.save")]
    DocumentSave {
        document_id: DocumentId,
        content: String,
    },
}

impl BusRequest {
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::DocumentSync { document_id }
            | Self::DocumentUpdate { document_id, .. }
            | Self::AwarenessUpdate { document_id, .. }
            | Self::DocumentSave { document_id, .. } => document_id,
        }
    }
}

/// Successful responses to [`BusRequest`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusResponse {
    /// Full-state snapshot. An empty array is a valid answer and means
    /// "no edits yet".
    Sync { state: Vec<i64> },
    /// Plain acknowledgement.
    Ack,
}

/// Push notifications surfaced through a document subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InboundEvent {
    /// A peer's incremental document update.
    Update {
        document_id: DocumentId,
        update: Vec<i64>,
        source_agent_id: AgentId,
    },

    /// A peer's ephemeral presence state.
    Awareness {
        document_id: DocumentId,
        client_id: AgentId,
        awareness_state: AwarenessState,
    },
}

impl InboundEvent {
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::Update { document_id, .. } | Self::Awareness { document_id, .. } => document_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_event_shape() {
        let request = BusRequest::DocumentUpdate {
            document_id: "doc-1".into(),
            update: vec![1, 2, 255],
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["event"], "document.update");
        assert_eq!(json["payload"]["document_id"], "doc-1");
        assert_eq!(json["payload"]["update"][2], 255);
    }

    #[test]
    fn test_awareness_wire_field_names() {
        let request = BusRequest::AwarenessUpdate {
            document_id: "doc-1".into(),
            awareness_state: AwarenessState {
                cursor: CursorPos::new(3, 14),
                selection: None,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        let cursor = &json["payload"]["awareness_state"]["cursor"];

        assert_eq!(cursor["lineNumber"], 3);
        assert_eq!(cursor["column"], 14);
        // Absent selection stays off the wire entirely.
        assert!(
            json["payload"]["awareness_state"]
                .get("selection")
                .is_none()
        );
    }

    #[test]
    fn test_roundtrip_inbound_update() {
        let event = InboundEvent::Update {
            document_id: "doc-1".into(),
            update: vec![0, 127, 255],
            source_agent_id: "agent-a".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let decoded: InboundEvent = serde_json::from_str(&json).unwrap();

        match decoded {
            InboundEvent::Update {
                update,
                source_agent_id,
                ..
            } => {
                assert_eq!(update, vec![0, 127, 255]);
                assert_eq!(source_agent_id.as_str(), "agent-a");
            }
            _ => panic!("wrong variant"),
        }
    }
}
