#![forbid(unsafe_code)]

use crate::action::{Color, ConnectionData, ConnectionId, DashPattern};

/// A line between ports of two notes.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub(crate) id: ConnectionId,
    pub(crate) color: Color,
    pub(crate) size: f64,
    pub(crate) dash: DashPattern,
    pub(crate) attached: bool,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, data: ConnectionData) -> Self {
        Self {
            id,
            color: data.color,
            size: data.size,
            dash: data.dash,
            attached: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn color(&self) -> &Color {
        &self.color
    }

    #[must_use]
    pub fn size(&self) -> f64 {
        self.size
    }

    #[must_use]
    pub fn dash(&self) -> &DashPattern {
        &self.dash
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    #[must_use]
    pub fn data(&self) -> ConnectionData {
        ConnectionData {
            color: self.color.clone(),
            size: self.size,
            dash: self.dash.clone(),
        }
    }
}

/// Style shared by a set of connections.
///
/// A component is `None` when the connections disagree on it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionStyle {
    pub color: Option<Color>,
    pub size: Option<f64>,
    pub dash: Option<DashPattern>,
}

impl ConnectionStyle {
    /// The style common to `connections`.
    ///
    /// Returns `None` for an empty set or when no component is shared.
    #[must_use]
    pub fn matching<'a>(connections: impl IntoIterator<Item = &'a Connection>) -> Option<Self> {
        let mut iter = connections.into_iter();
        let first = iter.next()?;
        let mut style = Self {
            color: Some(first.color.clone()),
            size: Some(first.size),
            dash: Some(first.dash.clone()),
        };
        for conn in iter {
            if style.color.as_ref() != Some(&conn.color) {
                style.color = None;
            }
            if style.size != Some(conn.size) {
                style.size = None;
            }
            if style.dash.as_ref() != Some(&conn.dash) {
                style.dash = None;
            }
        }
        if style.color.is_none() && style.size.is_none() && style.dash.is_none() {
            None
        } else {
            Some(style)
        }
    }
}
