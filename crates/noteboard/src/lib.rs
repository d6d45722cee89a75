#![forbid(unsafe_code)]

//! Noteboard
//!
//! Edit tracking and undo/redo for boards of sticky notes joined by
//! connections.
//!
//! # Key Components
//!
//! - [`Board`] - The live document. Every mutation queues a (backward,
//!   forward) pair of change descriptors
//! - [`Snapshot`] - A minimal set of changes, at most one per entity
//! - [`ActionHistory`] - Undoable transactions, each a pair of snapshots
//! - [`BoardSession`] - Wires a board to its pending snapshot and history
//! - [`BoardStore`] - Applies uploaded deltas the way the server does
//!
//! # How it fits together
//! A [`BoardSession`] drains each board mutation into two consumers. The
//! pending snapshot accumulates the net change since the last upload and is
//! handed off with [`BoardSession::take_delta`]. The history folds the same
//! pair into the open transaction. Undo and redo replay a transaction's
//! snapshot against the board; the replay reaches the pending snapshot but
//! is never recorded as a new transaction.

pub mod action;
pub mod config;
pub mod error;
pub mod history;
pub mod image;
pub mod model;
pub mod session;
pub mod signal;
pub mod snapshot;
pub mod store;
pub mod wire;

pub use action::{
    ActionKind, Color, ConnectionAction, ConnectionData, ConnectionId, ConnectionPatch,
    DashPattern, EntityKind, MergeOutcome, NoteAction, NoteData, NoteId, NotePatch, Port,
    SnapshotAction, is_valid_size, merge,
};
pub use config::BoardConfig;
pub use error::{
    ApplyError, BoardError, ConfigError, FoldDirection, HistoryError, MergeConflict, StoreError,
    WireError,
};
pub use history::{ActionHistory, HistoryConfig, HistoryEntry, HistoryTarget};
pub use image::{ImageId, ImageResolver, ImageStorage, StoredImage};
pub use model::{Board, BoardChange, Connection, ConnectionStyle, Note, StyleDefaults};
pub use session::BoardSession;
pub use signal::{Signal, Subscription};
pub use snapshot::{Snapshot, connection_key, note_key};
pub use store::BoardStore;
pub use wire::{RawHistoryEntry, RawSnapshot};
