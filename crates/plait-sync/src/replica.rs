//! Loro-backed text replica with origin-tagged change events.

use std::borrow::Cow;
use std::ops::Range;

use loro::{ExportMode, LoroDoc, LoroText, VersionVector};
use tokio::sync::mpsc;

use crate::SyncError;

/// Why a delta was applied.
///
/// Attached to every delta application and never persisted; its only
/// job is to gate re-broadcast. Deltas applied with `Remote` or `Init`
/// must never loop back out; only `Local` triggers one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Mutation made through the local editor.
    Local,
    /// Delta received from a remote peer.
    Remote,
    /// State imported during reconciliation or fallback seeding.
    Init,
}

/// One delta application, as observed by the change subscriber.
#[derive(Debug, Clone)]
pub struct ReplicaEvent {
    pub delta: Vec<u8>,
    pub origin: Origin,
}

/// Mutable CRDT document for one editing session.
///
/// Wraps a `LoroDoc` with a single `content` text container. Every
/// mutation emits a [`ReplicaEvent`] on the change channel handed in
/// at construction; the origin tag tells the subscriber whether the
/// mutation came from the local editor, a remote peer, or
/// reconciliation. Deltas are commutative and idempotent under loro's
/// merge rule, which is the correctness foundation of the whole sync
/// design.
pub struct TextReplica {
    doc: LoroDoc,
    content: LoroText,
    /// Frontier the last emitted event advanced to; local deltas are
    /// exported from here.
    emitted_vv: VersionVector,
    changes: mpsc::UnboundedSender<ReplicaEvent>,
}

impl TextReplica {
    /// Create an empty replica wired to a change channel.
    pub fn new(changes: mpsc::UnboundedSender<ReplicaEvent>) -> Self {
        let doc = LoroDoc::new();
        let content = doc.get_text("content");
        let emitted_vv = doc.oplog_vv();

        Self {
            doc,
            content,
            emitted_vv,
            changes,
        }
    }

    /// Plain-text view for the editor.
    pub fn text(&self) -> String {
        self.content.to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.content.len_unicode() == 0
    }

    /// Current version frontier.
    pub fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    /// Insert text at a character offset (local editor mutation).
    pub fn insert(&mut self, char_offset: usize, text: &str) {
        // Offsets come pre-validated from the editor widget.
        self.content.insert(char_offset, text).ok();
        self.doc.commit();
        self.emit(Origin::Local);
    }

    /// Delete a character range (local editor mutation).
    pub fn delete(&mut self, char_range: Range<usize>) {
        self.content
            .delete(char_range.start, char_range.len())
            .ok();
        self.doc.commit();
        self.emit(Origin::Local);
    }

    /// Seed an empty replica with bootstrap content.
    ///
    /// Emits `Origin::Init` and returns the seed delta so the caller
    /// can decide to broadcast it; unlike reconciliation imports, a
    /// seed is state no other peer has yet.
    pub fn seed(&mut self, text: &str) -> Option<Vec<u8>> {
        self.content.insert(0, text).ok();
        self.doc.commit();
        self.emit(Origin::Init)
    }

    /// Apply a delta received from elsewhere.
    pub fn apply_update(&mut self, delta: &[u8], origin: Origin) -> Result<(), SyncError> {
        self.doc.import(delta)?;
        self.emitted_vv = self.doc.oplog_vv();
        let _ = self.changes.send(ReplicaEvent {
            delta: delta.to_vec(),
            origin,
        });
        Ok(())
    }

    /// Import a full-state snapshot during reconciliation.
    ///
    /// An explicitly-empty snapshot means "no edits yet" and is a
    /// successful no-op.
    pub fn import_snapshot(&mut self, snapshot: &[u8]) -> Result<(), SyncError> {
        if snapshot.is_empty() {
            return Ok(());
        }
        self.doc.import(snapshot)?;
        self.emitted_vv = self.doc.oplog_vv();
        let _ = self.changes.send(ReplicaEvent {
            delta: snapshot.to_vec(),
            origin: Origin::Init,
        });
        Ok(())
    }

    /// Export the complete state of the replica.
    pub fn export_snapshot(&self) -> Vec<u8> {
        self.doc
            .export(ExportMode::Snapshot)
            .expect("snapshot export should not fail")
    }

    /// Export updates since the last emitted frontier, emit them on
    /// the change channel, and advance the frontier. Returns the delta
    /// when there was one.
    fn emit(&mut self, origin: Origin) -> Option<Vec<u8>> {
        let current = self.doc.oplog_vv();
        if current == self.emitted_vv {
            return None;
        }

        let delta = self
            .doc
            .export(ExportMode::Updates {
                from: Cow::Borrowed(&self.emitted_vv),
            })
            .ok()?;
        self.emitted_vv = current;

        if delta.is_empty() {
            return None;
        }
        let _ = self.changes.send(ReplicaEvent {
            delta: delta.clone(),
            origin,
        });
        Some(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica() -> (TextReplica, mpsc::UnboundedReceiver<ReplicaEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TextReplica::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ReplicaEvent>) -> Vec<ReplicaEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_basic_editing() {
        let (mut replica, _rx) = replica();

        replica.insert(0, "Hello");
        replica.insert(5, " World");
        assert_eq!(replica.text(), "Hello World");

        replica.delete(5..6);
        assert_eq!(replica.text(), "HelloWorld");
    }

    #[test]
    fn test_local_edits_emit_local_deltas() {
        let (mut replica, mut rx) = replica();

        replica.insert(0, "abc");
        let events = drain(&mut rx);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].origin, Origin::Local);
        assert!(!events[0].delta.is_empty());
    }

    #[test]
    fn test_remote_apply_emits_remote_origin() {
        let (mut source, mut source_rx) = replica();
        let (mut target, mut target_rx) = replica();

        source.insert(0, "abc");
        let delta = drain(&mut source_rx).remove(0).delta;

        target.apply_update(&delta, Origin::Remote).unwrap();
        let events = drain(&mut target_rx);

        assert_eq!(target.text(), "abc");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].origin, Origin::Remote);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let (mut source, mut source_rx) = replica();
        let (mut target, _rx) = replica();

        source.insert(0, "hello");
        let delta = drain(&mut source_rx).remove(0).delta;

        target.apply_update(&delta, Origin::Remote).unwrap();
        let once = target.text();
        target.apply_update(&delta, Origin::Remote).unwrap();

        assert_eq!(target.text(), once);
    }

    #[test]
    fn test_apply_is_commutative() {
        let (mut a, mut a_rx) = replica();
        let (mut b, mut b_rx) = replica();

        a.insert(0, "left");
        b.insert(0, "right");
        let d1 = drain(&mut a_rx).remove(0).delta;
        let d2 = drain(&mut b_rx).remove(0).delta;

        let (mut first, _rx1) = replica();
        let (mut second, _rx2) = replica();
        first.apply_update(&d1, Origin::Remote).unwrap();
        first.apply_update(&d2, Origin::Remote).unwrap();
        second.apply_update(&d2, Origin::Remote).unwrap();
        second.apply_update(&d1, Origin::Remote).unwrap();

        assert_eq!(first.text(), second.text());
    }

    #[test]
    fn test_local_delta_excludes_previously_imported_ops() {
        let (mut source, mut source_rx) = replica();
        let (mut target, mut target_rx) = replica();

        source.insert(0, "shared");
        let shared = drain(&mut source_rx).remove(0).delta;
        target.apply_update(&shared, Origin::Remote).unwrap();
        drain(&mut target_rx);

        target.insert(6, "!");
        let local = drain(&mut target_rx).remove(0).delta;

        // A third replica that already has the shared prefix must be
        // able to apply the local delta on its own.
        let (mut third, _rx) = replica();
        third.apply_update(&shared, Origin::Remote).unwrap();
        third.apply_update(&local, Origin::Remote).unwrap();
        assert_eq!(third.text(), "shared!");
    }

    #[test]
    fn test_seed_emits_init_and_returns_delta() {
        let (mut first, mut rx) = replica();

        let delta = first.seed("bootstrap").expect("seed produces a delta");
        let events = drain(&mut rx);

        assert_eq!(first.text(), "bootstrap");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].origin, Origin::Init);

        let (mut other, _rx) = replica();
        other.apply_update(&delta, Origin::Remote).unwrap();
        assert_eq!(other.text(), "bootstrap");
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let (mut replica, _rx) = replica();
        replica.insert(0, "Test content");

        let snapshot = replica.export_snapshot();
        let (mut restored, _rx2) = self::replica();
        restored.import_snapshot(&snapshot).unwrap();

        assert_eq!(restored.text(), "Test content");
    }

    #[test]
    fn test_empty_snapshot_import_is_noop() {
        let (mut replica, mut rx) = replica();

        replica.import_snapshot(&[]).unwrap();

        assert!(replica.is_empty());
        assert!(drain(&mut rx).is_empty());
    }
}
