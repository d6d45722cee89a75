#![forbid(unsafe_code)]

//! Live document: a board of notes joined by connections.
//!
//! Every mutation the board performs queues a [`BoardChange`] holding the
//! change descriptor that undoes it and the one that redoes it. Whoever
//! owns the board drains the queue with [`Board::take_changes`] and feeds
//! both halves to its consumers; see [`BoardSession`](crate::session::BoardSession).

mod board;
mod connection;
mod note;

pub use board::Board;
pub use connection::{Connection, ConnectionStyle};
pub use note::Note;

use crate::action::{Color, ConnectionAction, DashPattern, NoteAction};

/// A (backward, forward) pair produced by one mutation.
///
/// Both halves describe the same entity.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardChange {
    Note {
        backward: NoteAction,
        forward: NoteAction,
    },
    Connection {
        backward: ConnectionAction,
        forward: ConnectionAction,
    },
}

/// Style adopted by the next connection created without explicit values.
///
/// Creating a connection or changing a connection's style updates the
/// defaults to the values just used.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleDefaults {
    pub color: Color,
    pub size: f64,
    pub dash: DashPattern,
}

impl Default for StyleDefaults {
    fn default() -> Self {
        Self {
            color: Color::default(),
            size: 5.0,
            dash: DashPattern::solid(),
        }
    }
}
