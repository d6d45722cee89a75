#![forbid(unsafe_code)]

//! Transactional undo/redo history.
//!
//! [`ActionHistory`] groups (backward, forward) change pairs into named
//! transactions. Each transaction keeps two snapshots: backward changes are
//! shifted in front of what is already there, forward changes are pushed
//! behind it, so one entry can be replayed in either direction.
//!
//! # Invariants
//!
//! 1. `cursor <= entries.len() <= config.limit` (after any operation).
//! 2. Entries before the cursor are undoable, entries from it on redoable.
//! 3. Opening a transaction drops every redoable entry.
//! 4. While replaying, recorded changes are ignored.
//!
//! # Lifecycle
//!
//! ```text
//! begin("move")  record  record  end()        begin("text") ...
//! ┌──────────────────────────────────┐
//! │ [t1, t2]  cursor=2               │
//! │ [t1, t2, move] cursor=3 (open)   │
//! │ [t1, t2, move] cursor=3          │
//! └──────────────────────────────────┘
//!
//! undo()
//! ┌──────────────────────────────────┐
//! │ [t1, t2 | move] cursor=2         │
//! └──────────────────────────────────┘
//!
//! begin("text")  <-- new branch, drops "move"
//! ┌──────────────────────────────────┐
//! │ [t1, t2, text] cursor=3 (open)   │
//! └──────────────────────────────────┘
//! ```
//!
//! A change recorded while no transaction is open opens an anonymous one
//! (empty name).

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, debug_span, warn};

use crate::action::{ConnectionAction, NoteAction};
use crate::error::{ApplyError, HistoryError, MergeConflict};
use crate::signal::{Signal, Subscription};
use crate::snapshot::Snapshot;
use crate::wire::RawHistoryEntry;

/// Configuration for the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Maximum number of transactions kept, undoable or redoable.
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { limit: 50 }
    }
}

impl HistoryConfig {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// No limit (for testing).
    #[must_use]
    pub fn unlimited() -> Self {
        Self { limit: usize::MAX }
    }
}

/// Document that transactions are replayed against.
pub trait HistoryTarget {
    /// Replay every change of `snapshot`.
    fn apply(&mut self, snapshot: &Snapshot) -> Result<(), ApplyError>;
}

/// One transaction.
pub struct HistoryEntry {
    name: String,
    backward: Snapshot,
    forward: Snapshot,
}

impl HistoryEntry {
    fn new(board_id: &str, name: String) -> Self {
        Self {
            name,
            backward: Snapshot::new(board_id),
            forward: Snapshot::new(board_id),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Changes that undo the transaction.
    #[must_use]
    pub fn backward(&self) -> &Snapshot {
        &self.backward
    }

    /// Changes that redo the transaction.
    #[must_use]
    pub fn forward(&self) -> &Snapshot {
        &self.forward
    }

    fn to_raw(&self) -> RawHistoryEntry {
        RawHistoryEntry {
            name: self.name.clone(),
            backward: self.backward.to_raw(),
            forward: self.forward.to_raw(),
        }
    }
}

impl fmt::Debug for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryEntry")
            .field("name", &self.name)
            .field("backward_notes", &self.backward.note_count())
            .field("backward_connections", &self.backward.connection_count())
            .field("forward_notes", &self.forward.note_count())
            .field("forward_connections", &self.forward.connection_count())
            .finish()
    }
}

/// Bounded list of transactions with an undo cursor.
pub struct ActionHistory {
    board_id: String,
    entries: VecDeque<HistoryEntry>,
    /// Number of undoable entries.
    cursor: usize,
    /// Name of the open transaction, always `entries[cursor - 1]` while it
    /// is retained.
    open: Option<String>,
    recording: bool,
    config: HistoryConfig,
    changed: Signal<()>,
}

impl fmt::Debug for ActionHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHistory")
            .field("board_id", &self.board_id)
            .field("undo_depth", &self.undo_depth())
            .field("redo_depth", &self.redo_depth())
            .field("open", &self.open)
            .field("recording", &self.recording)
            .field("config", &self.config)
            .finish()
    }
}

impl ActionHistory {
    #[must_use]
    pub fn new(board_id: impl Into<String>, config: HistoryConfig) -> Self {
        Self {
            board_id: board_id.into(),
            entries: VecDeque::new(),
            cursor: 0,
            open: None,
            recording: true,
            config,
            changed: Signal::new(),
        }
    }

    // ====================================================================
    // Transactions
    // ====================================================================

    /// Open a transaction named `name`.
    ///
    /// Does nothing if a transaction of that name is already open.
    /// Otherwise closes the open one, drops every redoable entry and starts
    /// a new entry.
    pub fn begin(&mut self, name: &str) {
        if self.open.as_deref() == Some(name) {
            return;
        }
        debug!(target: "noteboard.history", name, "transaction opened");
        self.entries.truncate(self.cursor);
        self.entries
            .push_back(HistoryEntry::new(&self.board_id, name.to_string()));
        self.cursor += 1;
        self.open = Some(name.to_string());
        self.enforce_limit();
    }

    /// Close the open transaction, if any.
    pub fn end(&mut self) {
        if let Some(name) = self.open.take() {
            debug!(target: "noteboard.history", name = %name, "transaction closed");
        }
    }

    /// Whether a transaction is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Name of the open transaction.
    #[must_use]
    pub fn open_name(&self) -> Option<&str> {
        self.open.as_deref()
    }

    /// Record a note change into the open transaction.
    pub fn record_note_change(
        &mut self,
        backward: NoteAction,
        forward: NoteAction,
    ) -> Result<(), MergeConflict> {
        let Some(entry) = self.recording_entry() else {
            return Ok(());
        };
        let shifted = entry.backward.shift_note(backward);
        let pushed = entry.forward.push_note(forward);
        self.changed.emit(&());
        shifted.and(pushed)
    }

    /// Record a connection change into the open transaction.
    pub fn record_connection_change(
        &mut self,
        backward: ConnectionAction,
        forward: ConnectionAction,
    ) -> Result<(), MergeConflict> {
        let Some(entry) = self.recording_entry() else {
            return Ok(());
        };
        let shifted = entry.backward.shift_connection(backward);
        let pushed = entry.forward.push_connection(forward);
        self.changed.emit(&());
        shifted.and(pushed)
    }

    /// The entry changes go to, opening an anonymous transaction if needed.
    ///
    /// `None` while replaying, or when the open entry was evicted.
    fn recording_entry(&mut self) -> Option<&mut HistoryEntry> {
        if !self.recording {
            return None;
        }
        if self.open.is_none() {
            self.begin("");
        }
        let index = self.cursor.checked_sub(1)?;
        self.entries.get_mut(index)
    }

    /// Whether recorded changes are kept. False while replaying.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    // ====================================================================
    // Undo / Redo
    // ====================================================================

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Name of the transaction [`undo`](Self::undo) would revert.
    #[must_use]
    pub fn undo_name(&self) -> Option<&str> {
        let index = self.cursor.checked_sub(1)?;
        self.entries.get(index).map(HistoryEntry::name)
    }

    /// Name of the transaction [`redo`](Self::redo) would reapply.
    #[must_use]
    pub fn redo_name(&self) -> Option<&str> {
        self.entries.get(self.cursor).map(HistoryEntry::name)
    }

    /// Revert the newest undoable transaction and close the open one.
    ///
    /// On failure the cursor does not move but the open transaction is still
    /// closed; the target may have been partially changed.
    pub fn undo(&mut self, target: &mut dyn HistoryTarget) -> Result<(), HistoryError> {
        let Some(index) = self.cursor.checked_sub(1) else {
            warn!(target: "noteboard.history", "undo requested with nothing to undo");
            return Err(HistoryError::NothingToUndo);
        };
        let entry = &self.entries[index];
        let _span = debug_span!("history.undo", name = %entry.name).entered();

        self.recording = false;
        let result = target.apply(&entry.backward);
        self.recording = true;
        self.end();
        result?;

        self.cursor = index;
        self.changed.emit(&());
        Ok(())
    }

    /// Reapply the oldest redoable transaction.
    ///
    /// On failure the cursor does not move; the target may have been
    /// partially changed.
    pub fn redo(&mut self, target: &mut dyn HistoryTarget) -> Result<(), HistoryError> {
        let Some(entry) = self.entries.get(self.cursor) else {
            warn!(target: "noteboard.history", "redo requested with nothing to redo");
            return Err(HistoryError::NothingToRedo);
        };
        let _span = debug_span!("history.redo", name = %entry.name).entered();

        self.recording = false;
        let result = target.apply(&entry.forward);
        self.recording = true;
        result?;

        self.cursor += 1;
        self.changed.emit(&());
        Ok(())
    }

    /// Subscribe to history changes: recorded changes, undo, redo, limit
    /// changes and clearing.
    pub fn on_change(&self, callback: impl Fn() + 'static) -> Subscription {
        self.changed.subscribe(move |_| callback())
    }

    // ====================================================================
    // Info
    // ====================================================================

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.entries.len() - self.cursor
    }

    /// Entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.config.limit
    }

    /// Change the limit, evicting the oldest entries at once if needed.
    pub fn set_limit(&mut self, limit: usize) {
        self.config.limit = limit;
        self.enforce_limit();
        self.changed.emit(&());
    }

    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    // ====================================================================
    // Maintenance
    // ====================================================================

    /// Drop every entry and close the open transaction.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.open = None;
        self.changed.emit(&());
    }

    fn enforce_limit(&mut self) {
        while self.entries.len() > self.config.limit {
            self.entries.pop_front();
            if self.cursor > 0 {
                self.cursor -= 1;
            } else {
                // A redoable entry went; the ones after it build on it.
                self.entries.clear();
            }
        }
    }

    // ====================================================================
    // Persistence
    // ====================================================================

    /// Every entry in transport form, oldest first.
    #[must_use]
    pub fn to_raw(&self) -> Vec<RawHistoryEntry> {
        self.entries.iter().map(HistoryEntry::to_raw).collect()
    }

    /// Restore a history. Every restored entry is undoable and no
    /// transaction is open.
    #[must_use]
    pub fn from_raw(
        board_id: impl Into<String>,
        config: HistoryConfig,
        raw: Vec<RawHistoryEntry>,
    ) -> Self {
        let mut history = Self::new(board_id, config);
        history.entries = raw
            .into_iter()
            .map(|entry| HistoryEntry {
                name: entry.name,
                backward: Snapshot::from_raw(entry.backward),
                forward: Snapshot::from_raw(entry.forward),
            })
            .collect();
        history.cursor = history.entries.len();
        history.enforce_limit();
        history
    }
}

// ============================================================================
// Tests
// ============================================================================
