#![forbid(unsafe_code)]

//! In-memory persistence of one board.
//!
//! [`BoardStore`] accepts uploaded deltas the way the server does: notes
//! first, then connections, then a dangling-connection check. A rejected
//! batch leaves the stored rows untouched.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::action::{
    ConnectionAction, ConnectionData, ConnectionId, NoteAction, NoteData, NoteId, Payload,
    SnapshotAction,
};
use crate::error::StoreError;
use crate::wire::RawSnapshot;

/// Saved rows of one board.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoardStore {
    id: String,
    notes: BTreeMap<NoteId, NoteData>,
    connections: BTreeMap<ConnectionId, ConnectionData>,
}

impl BoardStore {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn note(&self, id: NoteId) -> Option<&NoteData> {
        self.notes.get(&id)
    }

    #[must_use]
    pub fn connection(&self, id: &ConnectionId) -> Option<&ConnectionData> {
        self.connections.get(id)
    }

    #[must_use]
    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Apply an uploaded delta as one transaction.
    ///
    /// Edits and deletes of missing rows are ignored. Creating a row that
    /// exists, or leaving a connection without both notes, rejects the
    /// whole batch.
    pub fn apply_delta(&mut self, delta: &RawSnapshot) -> Result<(), StoreError> {
        if delta.id != self.id {
            return Err(StoreError::WrongBoard {
                expected: self.id.clone(),
                actual: delta.id.clone(),
            });
        }

        let mut notes = self.notes.clone();
        let mut connections = self.connections.clone();
        let result = apply_rows(&mut notes, &delta.note, StoreError::DuplicateNote)
            .and_then(|()| {
                apply_rows(
                    &mut connections,
                    &delta.conn,
                    StoreError::DuplicateConnection,
                )
            })
            .and_then(|()| match find_dangling(&notes, &connections) {
                Some(id) => Err(StoreError::DanglingConnection(id)),
                None => Ok(()),
            });

        if let Err(err) = result {
            warn!(target: "noteboard.store", board = %self.id, error = %err, "delta rejected");
            return Err(err);
        }

        self.notes = notes;
        self.connections = connections;
        debug!(
            target: "noteboard.store",
            board = %self.id,
            notes = delta.note.len(),
            connections = delta.conn.len(),
            "delta applied"
        );
        Ok(())
    }

    /// Every stored row as a create, ordered by id.
    #[must_use]
    pub fn export(&self) -> RawSnapshot {
        RawSnapshot {
            id: self.id.clone(),
            note: self
                .notes
                .iter()
                .map(|(id, data)| NoteAction::Create {
                    id: *id,
                    data: data.clone(),
                })
                .collect(),
            conn: self
                .connections
                .iter()
                .map(|(id, data)| ConnectionAction::Create {
                    id: *id,
                    data: data.clone(),
                })
                .collect(),
        }
    }
}

fn apply_rows<I: Ord + Copy, D: Payload>(
    rows: &mut BTreeMap<I, D>,
    actions: &[SnapshotAction<I, D>],
    duplicate: impl Fn(I) -> StoreError,
) -> Result<(), StoreError> {
    for action in actions {
        match action {
            SnapshotAction::Create { id, data } => {
                if rows.contains_key(id) {
                    return Err(duplicate(*id));
                }
                rows.insert(*id, data.clone());
            }
            SnapshotAction::Edit { id, patch } => {
                if let Some(row) = rows.get_mut(id) {
                    *row = row.patched(patch);
                }
            }
            SnapshotAction::Delete { id } => {
                rows.remove(id);
            }
        }
    }
    Ok(())
}

fn find_dangling(
    notes: &BTreeMap<NoteId, NoteData>,
    connections: &BTreeMap<ConnectionId, ConnectionData>,
) -> Option<ConnectionId> {
    connections
        .keys()
        .find(|conn| !notes.contains_key(&conn.a()) || !notes.contains_key(&conn.b()))
        .copied()
}
