#![forbid(unsafe_code)]

//! Error types.
//!
//! # Taxonomy
//!
//! - **Sequencing** ([`MergeConflict`]): two change descriptors arrived in an
//!   impossible order. The incoming change is dropped and logged.
//! - **Precondition** ([`BoardError`], [`HistoryError::NothingToUndo`],
//!   [`HistoryError::NothingToRedo`]): checked before any mutation begins.
//! - **Desynchronization** ([`ApplyError`]): a replayed snapshot refers to
//!   an entity the document does not have.
//! - **Boundary** ([`WireError`], [`StoreError`], [`ConfigError`]): malformed
//!   input crossing the crate boundary.

use std::fmt;

use crate::action::{ActionKind, ConnectionId, EntityKind, NoteId};

/// Direction a change was folded into a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldDirection {
    /// New change applies after the stored one.
    Push,
    /// New change applies before the stored one.
    Shift,
}

impl fmt::Display for FoldDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => f.write_str("push"),
            Self::Shift => f.write_str("shift"),
        }
    }
}

/// Two change descriptors for the same entity arrived out of order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub entity: EntityKind,
    pub key: String,
    /// Kind of the action already stored.
    pub stored: ActionKind,
    /// Kind of the action that was dropped.
    pub incoming: ActionKind,
    pub direction: FoldDirection,
}

impl fmt::Display for MergeConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} out of order: cannot {} {} onto stored {}",
            self.entity, self.key, self.direction, self.incoming, self.stored
        )
    }
}

impl std::error::Error for MergeConflict {}

/// Precondition violations on board mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    /// No note with this id exists.
    NoteNotFound(NoteId),
    /// A note with this id already exists.
    DuplicateNote(NoteId),
    /// The id is not a positive 31-bit number.
    InvalidNoteId(NoteId),
    /// Both endpoints are the same note.
    SelfConnection(NoteId),
    /// The two notes are already connected.
    AlreadyConnected { a: NoteId, b: NoteId },
    /// No connection with this identity exists.
    ConnectionNotFound(ConnectionId),
    /// Random id allocation gave up after this many attempts.
    IdSpaceExhausted { attempts: u32 },
    /// A stroke size that is not a positive finite number.
    InvalidSize(String),
    /// A dash pattern with a negative or non-finite multiplier.
    InvalidDash(String),
}

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoteNotFound(id) => write!(f, "note with id '{id}' not found"),
            Self::DuplicateNote(id) => write!(f, "note with id '{id}' already exists"),
            Self::InvalidNoteId(id) => write!(f, "note id {id} is not in 1..={}", NoteId::MAX),
            Self::SelfConnection(id) => write!(f, "note {id} cannot connect to itself"),
            Self::AlreadyConnected { a, b } => write!(f, "note {a} and {b} already connected"),
            Self::ConnectionNotFound(id) => write!(f, "connection {id} not found"),
            Self::IdSpaceExhausted { attempts } => {
                write!(f, "no free note id after {attempts} attempts")
            }
            Self::InvalidSize(size) => write!(f, "invalid stroke size: {size}"),
            Self::InvalidDash(dash) => write!(f, "invalid dash pattern: {dash:?}"),
        }
    }
}

impl std::error::Error for BoardError {}

/// A snapshot could not be replayed against the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyError {
    pub entity: EntityKind,
    pub key: String,
    pub kind: ActionKind,
    pub source: BoardError,
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot apply {} of {} {}: {}",
            self.kind, self.entity, self.key, self.source
        )
    }
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Undo/redo failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    NothingToUndo,
    NothingToRedo,
    /// The board drifted from what the history expects.
    Apply(ApplyError),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NothingToUndo => f.write_str("nothing to undo"),
            Self::NothingToRedo => f.write_str("nothing to redo"),
            Self::Apply(e) => write!(f, "history out of sync: {e}"),
        }
    }
}

impl std::error::Error for HistoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Apply(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ApplyError> for HistoryError {
    fn from(e: ApplyError) -> Self {
        Self::Apply(e)
    }
}

/// Malformed wire records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// `type` is not 0, 1 or 2.
    UnknownType(u8),
    /// A create record lacks a required field.
    MissingField {
        entity: EntityKind,
        field: &'static str,
    },
    InvalidNoteId(u32),
    InvalidPort(u8),
    InvalidColor(String),
    InvalidDash(String),
    InvalidSize(String),
    /// Connection endpoints are not in ascending order.
    NonCanonicalConnection { a: u32, b: u32 },
    /// JSON could not be parsed.
    Json(String),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType(tag) => write!(f, "unknown action type {tag}"),
            Self::MissingField { entity, field } => {
                write!(f, "{entity} create is missing field '{field}'")
            }
            Self::InvalidNoteId(id) => write!(f, "invalid note id {id}"),
            Self::InvalidPort(port) => write!(f, "invalid port {port}"),
            Self::InvalidColor(color) => write!(f, "invalid color '{color}'"),
            Self::InvalidDash(dash) => write!(f, "invalid dash pattern '{dash}'"),
            Self::InvalidSize(size) => write!(f, "invalid size {size}"),
            Self::NonCanonicalConnection { a, b } => {
                write!(f, "connection endpoints {a} and {b} are not ascending")
            }
            Self::Json(msg) => write!(f, "JSON error: {msg}"),
        }
    }
}

impl std::error::Error for WireError {}

impl From<serde_json::Error> for WireError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Rejections from the persistence store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The delta targets another board.
    WrongBoard { expected: String, actual: String },
    DuplicateNote(NoteId),
    DuplicateConnection(ConnectionId),
    /// A connection references a note that does not exist after the batch.
    DanglingConnection(ConnectionId),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongBoard { expected, actual } => {
                write!(f, "delta for board '{actual}' sent to board '{expected}'")
            }
            Self::DuplicateNote(id) => write!(f, "note {id} already stored"),
            Self::DuplicateConnection(id) => write!(f, "connection {id} already stored"),
            Self::DanglingConnection(id) => write!(f, "dangling connection {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors that can occur when loading a board configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    /// TOML parse error.
    Toml(toml::de::Error),
    /// JSON parse error.
    Json(serde_json::Error),
    /// Validation errors.
    Validation(Vec<String>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Validation(errors) => {
                write!(f, "validation errors: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Toml(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}
