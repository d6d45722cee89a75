#![forbid(unsafe_code)]

//! Accumulator of pending changes.
//!
//! A [`Snapshot`] maps every entity to at most one [`SnapshotAction`]: the
//! net effect of all changes folded into it so far. The board keeps one
//! snapshot of what still has to reach the server; every history entry
//! keeps two (what to replay backward, what to replay forward).
//!
//! ```text
//! push(Edit x=5)            shift(Edit x=0)
//! ┌────────────────────┐    ┌────────────────────┐
//! │ "7": Create x=0    │    │ "7": Edit x=5      │
//! │      ↓ merge(old,new)   │      ↓ merge(new,old)
//! │ "7": Create x=5    │    │ "7": Edit x=5      │
//! └────────────────────┘    └────────────────────┘
//! ```
//!
//! # Invariants
//!
//! 1. `is_dirty()` ⇔ at least one entry exists.
//! 2. The dirty signal fires once per transition, never for a no-op.
//! 3. A [`MergeConflict`] leaves the stored entry untouched.

use std::collections::HashMap;
use std::fmt;

use tracing::warn;

use crate::action::{
    ConnectionAction, ConnectionData, ConnectionId, Identity, MergeOutcome, NoteAction, NoteData,
    NoteId, Payload, SnapshotAction, merge,
};
use crate::error::{FoldDirection, MergeConflict};
use crate::signal::{Signal, Subscription};
use crate::wire::RawSnapshot;

/// Map key of a note.
#[must_use]
pub fn note_key(id: &NoteId) -> String {
    id.key()
}

/// Map key of a connection (canonical identity).
#[must_use]
pub fn connection_key(id: &ConnectionId) -> String {
    id.key()
}

struct Slot<A> {
    /// Position in iteration order, kept across in-place merges.
    seq: i64,
    action: A,
}

/// Ordered map from entity key to pending action.
///
/// Pushed keys go to the back, shifted keys to the front, so replaying in
/// order follows time in the snapshot's direction.
struct ActionMap<I, D: Payload> {
    entries: HashMap<String, Slot<SnapshotAction<I, D>>>,
    front: i64,
    back: i64,
}

impl<I: Identity, D: Payload> ActionMap<I, D> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            front: 0,
            back: 0,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, key: &str) -> Option<&SnapshotAction<I, D>> {
        self.entries.get(key).map(|slot| &slot.action)
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn fold(
        &mut self,
        action: SnapshotAction<I, D>,
        direction: FoldDirection,
    ) -> Result<(), MergeConflict> {
        let key = action.key();
        let stored = self.get(&key);
        let outcome = match direction {
            FoldDirection::Push => merge(stored, Some(&action)),
            FoldDirection::Shift => merge(Some(&action), stored),
        };
        match outcome {
            MergeOutcome::Merged(merged) => {
                self.set(key, merged, direction);
                Ok(())
            }
            MergeOutcome::Cancelled => {
                self.entries.remove(&key);
                Ok(())
            }
            MergeOutcome::Conflict => {
                let conflict = MergeConflict {
                    entity: I::KIND,
                    key,
                    stored: stored.map_or(action.kind(), SnapshotAction::kind),
                    incoming: action.kind(),
                    direction,
                };
                warn!(
                    target: "noteboard.snapshot",
                    entity = %conflict.entity,
                    key = %conflict.key,
                    stored = %conflict.stored,
                    incoming = %conflict.incoming,
                    direction = %conflict.direction,
                    "snapshot action not in order; dropped"
                );
                Err(conflict)
            }
        }
    }

    fn set(&mut self, key: String, action: SnapshotAction<I, D>, direction: FoldDirection) {
        match self.entries.get_mut(&key) {
            Some(slot) => slot.action = action,
            None => {
                let seq = match direction {
                    FoldDirection::Push => {
                        self.back += 1;
                        self.back
                    }
                    FoldDirection::Shift => {
                        self.front -= 1;
                        self.front
                    }
                };
                self.entries.insert(key, Slot { seq, action });
            }
        }
    }

    fn ordered(&self) -> Vec<&SnapshotAction<I, D>> {
        let mut slots: Vec<&Slot<SnapshotAction<I, D>>> = self.entries.values().collect();
        slots.sort_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| &slot.action).collect()
    }
}

/// Pending changes of one board, keyed by entity.
pub struct Snapshot {
    board_id: String,
    notes: ActionMap<NoteId, NoteData>,
    connections: ActionMap<ConnectionId, ConnectionData>,
    state: Signal<bool>,
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("board_id", &self.board_id)
            .field("notes", &self.notes.ordered())
            .field("connections", &self.connections.ordered())
            .finish()
    }
}

impl Snapshot {
    #[must_use]
    pub fn new(board_id: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            notes: ActionMap::new(),
            connections: ActionMap::new(),
            state: Signal::new(),
        }
    }

    #[must_use]
    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    // ====================================================================
    // Folding
    // ====================================================================

    /// Fold a forward note change in after everything stored.
    pub fn push_note(&mut self, action: NoteAction) -> Result<(), MergeConflict> {
        self.tracked(|s| s.notes.fold(action, FoldDirection::Push))
    }

    /// Fold a forward connection change in after everything stored.
    pub fn push_connection(&mut self, action: ConnectionAction) -> Result<(), MergeConflict> {
        self.tracked(|s| s.connections.fold(action, FoldDirection::Push))
    }

    /// Fold a backward note change in before everything stored.
    pub fn shift_note(&mut self, action: NoteAction) -> Result<(), MergeConflict> {
        self.tracked(|s| s.notes.fold(action, FoldDirection::Shift))
    }

    /// Fold a backward connection change in before everything stored.
    pub fn shift_connection(&mut self, action: ConnectionAction) -> Result<(), MergeConflict> {
        self.tracked(|s| s.connections.fold(action, FoldDirection::Shift))
    }

    /// Drop every pending change.
    pub fn reset(&mut self) {
        self.tracked(|s| {
            s.notes.clear();
            s.connections.clear();
        });
    }

    fn tracked<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let was_dirty = self.is_dirty();
        let result = f(self);
        let dirty = self.is_dirty();
        if dirty != was_dirty {
            self.state.emit(&dirty);
        }
        result
    }

    // ====================================================================
    // Query
    // ====================================================================

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.notes.len() > 0 || self.connections.len() > 0
    }

    /// Subscribe to dirty-state transitions.
    pub fn on_dirty_change(&self, callback: impl Fn(bool) + 'static) -> Subscription {
        self.state.subscribe(move |dirty| callback(*dirty))
    }

    #[must_use]
    pub fn note(&self, id: &NoteId) -> Option<&NoteAction> {
        self.notes.get(&note_key(id))
    }

    #[must_use]
    pub fn note_by_key(&self, key: &str) -> Option<&NoteAction> {
        self.notes.get(key)
    }

    #[must_use]
    pub fn connection(&self, id: &ConnectionId) -> Option<&ConnectionAction> {
        self.connections.get(&connection_key(id))
    }

    #[must_use]
    pub fn connection_by_key(&self, key: &str) -> Option<&ConnectionAction> {
        self.connections.get(key)
    }

    /// Pending note changes in insertion order.
    #[must_use]
    pub fn note_actions(&self) -> Vec<&NoteAction> {
        self.notes.ordered()
    }

    /// Pending connection changes in insertion order.
    #[must_use]
    pub fn connection_actions(&self) -> Vec<&ConnectionAction> {
        self.connections.ordered()
    }

    #[must_use]
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    // ====================================================================
    // Raw form
    // ====================================================================

    /// Transport form: board id plus both action lists in insertion order.
    #[must_use]
    pub fn to_raw(&self) -> RawSnapshot {
        RawSnapshot {
            id: self.board_id.clone(),
            note: self.notes.ordered().into_iter().cloned().collect(),
            conn: self.connections.ordered().into_iter().cloned().collect(),
        }
    }

    /// Rebuild a snapshot from its transport form.
    ///
    /// Entries are stored as given; a later entry for the same key replaces
    /// an earlier one.
    #[must_use]
    pub fn from_raw(raw: RawSnapshot) -> Self {
        let mut snapshot = Self::new(raw.id);
        for action in raw.note {
            snapshot.notes.set(action.key(), action, FoldDirection::Push);
        }
        for action in raw.conn {
            snapshot.connections.set(action.key(), action, FoldDirection::Push);
        }
        snapshot
    }
}

// ============================================================================
// Tests
// ============================================================================
