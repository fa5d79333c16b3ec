//! Ephemeral per-peer presence state for one document session.
//!
//! Presence never touches the durable CRDT state. Each peer owns
//! exactly one slot keyed by its agent identity, updated
//! last-writer-wins; the whole map dies with the session.

use std::collections::HashMap;
use std::time::Duration;

use web_time::Instant;

use plait_common::bus::{AgentId, AwarenessState, CursorPos, CursorRange};

/// Minimum gap between two local cursor broadcasts. Tuning, not
/// correctness: cursor motion is keystroke-adjacent and would flood
/// the bus unthrottled.
pub const CURSOR_BROADCAST_MIN_INTERVAL: Duration = Duration::from_millis(80);

/// Cursors not refreshed within this window are dropped from the read
/// model.
pub const PRESENCE_TTL: Duration = Duration::from_secs(30);

/// Fixed palette for peer cursors, assigned in join order.
const PEER_COLORS: [u32; 6] = [
    0xFF6B6BFF, // Red
    0x4ECDC4FF, // Teal
    0xFFE66DFF, // Yellow
    0xAA96DAFF, // Purple
    0xFCBF49FF, // Orange
    0x95E1D3FF, // Mint
];

/// A remote peer's cursor, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCursor {
    pub agent_id: AgentId,
    pub cursor: CursorPos,
    pub selection: Option<CursorRange>,
    /// Assigned colour (RGBA).
    pub color: u32,
}

#[derive(Debug, Clone)]
struct PeerRecord {
    state: AwarenessState,
    color: u32,
    updated_at: Instant,
}

/// Tracks the local cursor and all known peer cursors.
#[derive(Debug)]
pub struct PresenceChannel {
    local_agent: AgentId,
    local_state: Option<AwarenessState>,
    last_broadcast: Option<Instant>,
    min_broadcast_interval: Duration,
    peers: HashMap<AgentId, PeerRecord>,
    next_color_index: usize,
}

impl PresenceChannel {
    pub fn new(local_agent: AgentId) -> Self {
        Self {
            local_agent,
            local_state: None,
            last_broadcast: None,
            min_broadcast_interval: CURSOR_BROADCAST_MIN_INTERVAL,
            peers: HashMap::new(),
            next_color_index: 0,
        }
    }

    /// Tuning knob for hosts that already debounce upstream.
    pub fn set_min_broadcast_interval(&mut self, interval: Duration) {
        self.min_broadcast_interval = interval;
    }

    /// Store the local cursor.
    ///
    /// Returns the state to broadcast when the cursor actually moved
    /// and the rate-limit window has passed, `None` otherwise.
    pub fn update_local(
        &mut self,
        cursor: CursorPos,
        selection: Option<CursorRange>,
    ) -> Option<AwarenessState> {
        let state = AwarenessState { cursor, selection };
        if self.local_state.as_ref() == Some(&state) {
            return None;
        }
        self.local_state = Some(state.clone());

        let now = Instant::now();
        if let Some(last) = self.last_broadcast {
            if now.duration_since(last) < self.min_broadcast_interval {
                return None;
            }
        }
        self.last_broadcast = Some(now);
        Some(state)
    }

    /// Upsert a peer's state, last-writer-wins.
    ///
    /// The local peer owns its own slot; its identity is never written
    /// from the network.
    pub fn apply_remote(&mut self, client_id: AgentId, state: AwarenessState) {
        if client_id == self.local_agent {
            return;
        }
        if let Some(record) = self.peers.get_mut(&client_id) {
            record.state = state;
            record.updated_at = Instant::now();
        } else {
            let color = self.assign_color();
            self.peers.insert(
                client_id,
                PeerRecord {
                    state,
                    color,
                    updated_at: Instant::now(),
                },
            );
        }
    }

    /// Snapshot of all known peer cursors, excluding the local peer.
    pub fn peers(&self) -> Vec<PeerCursor> {
        self.peers
            .iter()
            .map(|(agent_id, record)| PeerCursor {
                agent_id: agent_id.clone(),
                cursor: record.state.cursor,
                selection: record.state.selection,
                color: record.color,
            })
            .collect()
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Drop peers whose cursors have not been refreshed within
    /// `max_age`.
    pub fn prune_stale(&mut self, max_age: Duration) {
        let now = Instant::now();
        self.peers
            .retain(|_, record| now.duration_since(record.updated_at) <= max_age);
    }

    fn assign_color(&mut self) -> u32 {
        let color = PEER_COLORS[self.next_color_index % PEER_COLORS.len()];
        self.next_color_index += 1;
        color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(line: u32, column: u32) -> AwarenessState {
        AwarenessState {
            cursor: CursorPos::new(line, column),
            selection: None,
        }
    }

    fn unthrottled(local: &str) -> PresenceChannel {
        let mut presence = PresenceChannel::new(local.into());
        presence.set_min_broadcast_interval(Duration::ZERO);
        presence
    }

    #[test]
    fn test_upsert_is_last_writer_wins() {
        let mut presence = unthrottled("me");

        presence.apply_remote("peer-1".into(), state(1, 1));
        presence.apply_remote("peer-1".into(), state(7, 3));

        let peers = presence.peers();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].cursor, CursorPos::new(7, 3));
    }

    #[test]
    fn test_local_identity_is_never_upserted() {
        let mut presence = unthrottled("me");

        presence.apply_remote("me".into(), state(1, 1));

        assert!(presence.is_empty());
    }

    #[test]
    fn test_unmoved_cursor_does_not_broadcast() {
        let mut presence = unthrottled("me");

        assert!(presence.update_local(CursorPos::new(2, 5), None).is_some());
        assert!(presence.update_local(CursorPos::new(2, 5), None).is_none());
        assert!(presence.update_local(CursorPos::new(2, 6), None).is_some());
    }

    #[test]
    fn test_rate_limit_suppresses_rapid_motion() {
        let mut presence = PresenceChannel::new("me".into());
        presence.set_min_broadcast_interval(Duration::from_secs(3600));

        assert!(presence.update_local(CursorPos::new(1, 1), None).is_some());
        // Moved, but inside the window: stored, not broadcast.
        assert!(presence.update_local(CursorPos::new(1, 2), None).is_none());
    }

    #[test]
    fn test_prune_stale_drops_idle_peers() {
        let mut presence = unthrottled("me");

        presence.apply_remote("peer-1".into(), state(1, 1));
        presence.prune_stale(Duration::from_secs(3600));
        assert_eq!(presence.len(), 1);

        std::thread::sleep(Duration::from_millis(5));
        presence.prune_stale(Duration::from_millis(1));
        assert!(presence.is_empty());
    }

    #[test]
    fn test_each_peer_gets_a_color() {
        let mut presence = unthrottled("me");

        for i in 0..10 {
            presence.apply_remote(AgentId::new(format!("peer-{i}")), state(1, 1));
        }

        for peer in presence.peers() {
            assert!(peer.color != 0);
        }
    }
}
