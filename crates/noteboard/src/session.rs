#![forbid(unsafe_code)]

//! A board wired to its change consumers.
//!
//! [`BoardSession`] owns the board, the snapshot of changes not yet sent to
//! the server, the undo history and the image storage. Each change pair the
//! board produces is handed to both consumers:
//!
//! ```text
//!               ┌──────────── forward ───────────▶ pending.push
//! Board ──pair──┤
//!               └─ (backward, forward) ──────────▶ history.record
//! ```
//!
//! Replayed changes (undo, redo) reach the pending snapshot only.

use std::rc::Rc;

use tracing::debug;

use crate::config::BoardConfig;
use crate::error::{ApplyError, HistoryError, MergeConflict};
use crate::history::{ActionHistory, HistoryConfig, HistoryTarget};
use crate::image::{ImageId, ImageStorage, StoredImage};
use crate::model::{Board, BoardChange};
use crate::signal::Subscription;
use crate::snapshot::Snapshot;
use crate::wire::{RawHistoryEntry, RawSnapshot};

/// Board, pending changes, history and images of one editing session.
#[derive(Debug)]
pub struct BoardSession {
    board: Board,
    pending: Snapshot,
    history: ActionHistory,
    images: ImageStorage,
    conflicts: Vec<MergeConflict>,
}

impl BoardSession {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(id, &BoardConfig::default())
    }

    #[must_use]
    pub fn with_config(id: impl Into<String>, config: &BoardConfig) -> Self {
        Self::from_board(Board::with_config(id, config), config.history_config())
    }

    /// Wrap an existing board. Changes it already queued are discarded.
    #[must_use]
    pub fn from_board(mut board: Board, history: HistoryConfig) -> Self {
        board.take_changes();
        let id = board.id().to_string();
        Self {
            pending: Snapshot::new(id.clone()),
            history: ActionHistory::new(id, history),
            board,
            images: ImageStorage::new(),
            conflicts: Vec::new(),
        }
    }

    // ====================================================================
    // Access
    // ====================================================================

    #[must_use]
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Changes not yet sent to the server.
    #[must_use]
    pub fn pending(&self) -> &Snapshot {
        &self.pending
    }

    #[must_use]
    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    #[must_use]
    pub fn images(&self) -> &ImageStorage {
        &self.images
    }

    /// Subscribe to the pending snapshot's dirty-state transitions.
    pub fn on_dirty_change(&self, callback: impl Fn(bool) + 'static) -> Subscription {
        self.pending.on_dirty_change(callback)
    }

    /// Sequencing errors seen since the last call.
    pub fn take_conflicts(&mut self) -> Vec<MergeConflict> {
        std::mem::take(&mut self.conflicts)
    }

    // ====================================================================
    // Editing
    // ====================================================================

    /// Run `edit` against the board, then hand its changes to the pending
    /// snapshot and the history.
    ///
    /// Entities created and set up within one call produce a single create.
    pub fn edit<R>(&mut self, edit: impl FnOnce(&mut Board) -> R) -> R {
        let result = edit(&mut self.board);
        self.sync();
        result
    }

    /// Open a transaction; see [`ActionHistory::begin`].
    pub fn begin(&mut self, name: &str) {
        self.history.begin(name);
    }

    /// Close the open transaction.
    pub fn end(&mut self) {
        self.history.end();
    }

    pub fn set_history_limit(&mut self, limit: usize) {
        self.history.set_limit(limit);
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> Result<(), HistoryError> {
        let mut replay = Replay {
            board: &mut self.board,
            pending: &mut self.pending,
            images: &mut self.images,
            conflicts: &mut self.conflicts,
        };
        self.history.undo(&mut replay)
    }

    pub fn redo(&mut self) -> Result<(), HistoryError> {
        let mut replay = Replay {
            board: &mut self.board,
            pending: &mut self.pending,
            images: &mut self.images,
            conflicts: &mut self.conflicts,
        };
        self.history.redo(&mut replay)
    }

    fn sync(&mut self) {
        for change in self.board.take_changes() {
            let (to_pending, to_history) = match change {
                BoardChange::Note { backward, forward } => (
                    self.pending.push_note(forward.clone()),
                    self.history.record_note_change(backward, forward),
                ),
                BoardChange::Connection { backward, forward } => (
                    self.pending.push_connection(forward.clone()),
                    self.history.record_connection_change(backward, forward),
                ),
            };
            self.conflicts
                .extend(to_pending.err().into_iter().chain(to_history.err()));
        }
    }

    // ====================================================================
    // Images
    // ====================================================================

    pub fn add_image(
        &mut self,
        id: ImageId,
        path: impl Into<String>,
        name: impl Into<String>,
    ) -> Rc<StoredImage> {
        self.images.add(id, path, name)
    }

    /// Destroy an image. Notes showing it lose it, as a recorded edit.
    pub fn destroy_image(&mut self, id: ImageId) -> bool {
        let known = self.images.destroy(id);
        let released = self.board.release_image(id);
        debug!(target: "noteboard.session", image = %id, released, "image destroyed");
        self.sync();
        known
    }

    // ====================================================================
    // Server exchange
    // ====================================================================

    /// Apply state the server already holds. The result is neither pending
    /// nor undoable.
    pub fn load(&mut self, raw: RawSnapshot) -> Result<(), ApplyError> {
        let snapshot = Snapshot::from_raw(raw);
        let result = self.board.apply_snapshot(&mut self.images, &snapshot);
        self.board.take_changes();
        self.pending.reset();
        self.history.clear();
        debug!(
            target: "noteboard.session",
            board = %self.board.id(),
            notes = self.board.note_count(),
            connections = self.board.connection_count(),
            "board loaded"
        );
        result
    }

    /// Pending changes for upload, leaving the pending snapshot clean.
    ///
    /// `None` when there is nothing to send.
    pub fn take_delta(&mut self) -> Option<RawSnapshot> {
        if !self.pending.is_dirty() {
            return None;
        }
        let raw = self.pending.to_raw();
        self.pending.reset();
        Some(raw)
    }

    /// History in transport form.
    #[must_use]
    pub fn history_raw(&self) -> Vec<RawHistoryEntry> {
        self.history.to_raw()
    }

    /// Replace the history with a saved one.
    pub fn restore_history(&mut self, raw: Vec<RawHistoryEntry>) {
        let config = self.history.config().clone();
        self.history = ActionHistory::from_raw(self.board.id(), config, raw);
    }
}

/// Replays history against the board, feeding the pending snapshot only.
struct Replay<'a> {
    board: &'a mut Board,
    pending: &'a mut Snapshot,
    images: &'a mut ImageStorage,
    conflicts: &'a mut Vec<MergeConflict>,
}

impl HistoryTarget for Replay<'_> {
    fn apply(&mut self, snapshot: &Snapshot) -> Result<(), ApplyError> {
        let result = self.board.apply_snapshot(self.images, snapshot);
        for change in self.board.take_changes() {
            let pushed = match change {
                BoardChange::Note { forward, .. } => self.pending.push_note(forward),
                BoardChange::Connection { forward, .. } => self.pending.push_connection(forward),
            };
            self.conflicts.extend(pushed.err());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{NoteAction, NoteId, Port};
    use crate::model::ConnectionStyle;
    use std::cell::RefCell;

    fn session() -> BoardSession {
        BoardSession::from_board(Board::new("b").with_seed(3), HistoryConfig::default())
    }

    #[test]
    fn edits_reach_pending_and_history() {
        let mut s = session();
        let id = s.edit(|b| b.create_note(0.0, 0.0, 0.0, "", None)).unwrap();
        assert!(s.pending().is_dirty());
        assert!(matches!(s.pending().note(&id), Some(NoteAction::Create { .. })));
        assert!(s.can_undo());
    }

    #[test]
    fn setup_inside_one_edit_is_one_create() {
        let mut s = session();
        let id = NoteId(10);
        s.edit(|b| {
            b.new_note(id, 0.0, 0.0, 0.0, "", None)?;
            b.set_note_text(id, "ready")?;
            b.attach_note(id)
        })
        .unwrap();

        let entry = s.history().entries().next().unwrap();
        assert_eq!(entry.forward().note_count(), 1);
        match s.pending().note(&id) {
            Some(NoteAction::Create { data, .. }) => assert_eq!(data.text, "ready"),
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn undo_updates_pending_but_not_history() {
        let mut s = session();
        let id = s.edit(|b| b.create_note(0.0, 0.0, 0.0, "", None)).unwrap();
        s.take_delta();

        s.undo().unwrap();
        assert_eq!(s.pending().note(&id), Some(&NoteAction::Delete { id }));
        assert_eq!(s.history().len(), 1);
        assert!(s.can_redo());
    }

    #[test]
    fn undo_before_upload_cancels_the_create() {
        let mut s = session();
        s.edit(|b| b.create_note(0.0, 0.0, 0.0, "", None)).unwrap();
        s.undo().unwrap();
        assert!(!s.pending().is_dirty());
        assert_eq!(s.take_delta(), None);
    }

    #[test]
    fn take_delta_resets_pending() {
        let mut s = session();
        let dirty = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&dirty);
        let _sub = s.on_dirty_change(move |d| sink.borrow_mut().push(d));

        s.edit(|b| b.create_note(0.0, 0.0, 0.0, "", None)).unwrap();
        let delta = s.take_delta().unwrap();
        assert_eq!(delta.id, "b");
        assert_eq!(delta.note.len(), 1);
        assert!(!s.pending().is_dirty());
        assert_eq!(*dirty.borrow(), vec![true, false]);
    }

    #[test]
    fn load_is_clean_and_not_undoable() {
        let mut source = session();
        let (a, b) = source.edit(|board| {
            let a = board.create_note(0.0, 0.0, 0.0, "a", None).unwrap();
            let b = board.create_note(9.0, 9.0, 0.0, "b", None).unwrap();
            board
                .create_connection(a, Port::Right, b, Port::Left, ConnectionStyle::default())
                .unwrap();
            (a, b)
        });

        let mut s = BoardSession::new("b");
        s.load(source.board().export()).unwrap();
        assert_eq!(s.board().export(), source.board().export());
        assert!(!s.pending().is_dirty());
        assert!(!s.can_undo());
        assert!(s.board().is_connected(a, b).unwrap());
    }

    #[test]
    fn destroying_an_image_is_an_undoable_edit() {
        let mut s = session();
        let image_id = ImageId::new(5).unwrap();
        let img = s.add_image(image_id, "p.png", "p");
        let id = s
            .edit(|b| {
                let id = b.create_note(0.0, 0.0, 0.0, "", Some(&img))?;
                b.attach_note(id)?;
                Ok::<_, crate::error::BoardError>(id)
            })
            .unwrap();
        drop(img);
        s.end();
        s.take_delta();

        assert!(s.destroy_image(image_id));
        assert_eq!(s.board().note(id).unwrap().image_id(), None);
        assert!(s.pending().is_dirty());
        assert_eq!(s.history().len(), 2);
    }

    #[test]
    fn history_survives_restore() {
        let mut s = session();
        s.begin("create");
        let id = s.edit(|b| b.create_note(0.0, 0.0, 0.0, "", None)).unwrap();
        s.end();
        let raw = s.history_raw();

        let mut other = session();
        other.edit(|b| b.new_note(id, 0.0, 0.0, 0.0, "", None)).unwrap();
        other.restore_history(raw);
        assert_eq!(other.history().len(), 1);
        assert_eq!(other.history().undo_name(), Some("create"));

        other.undo().unwrap();
        assert_eq!(other.board().note_count(), 0);
        assert!(other.can_redo());
    }
}
