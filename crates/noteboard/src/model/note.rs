#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::action::{ConnectionId, NoteData, NoteId};
use crate::image::{ImageId, StoredImage};

/// Non-owning reference to a stored image.
#[derive(Debug, Clone)]
pub(crate) struct ImageLink {
    pub(crate) id: ImageId,
    pub(crate) image: Weak<StoredImage>,
}

impl ImageLink {
    pub(crate) fn new(image: &Rc<StoredImage>) -> Self {
        Self {
            id: image.id,
            image: Rc::downgrade(image),
        }
    }
}

/// A sticky note.
///
/// Notes are created, edited and destroyed through [`Board`](super::Board)
/// so that every change is observed.
#[derive(Debug, Clone)]
pub struct Note {
    pub(crate) id: NoteId,
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) width: f64,
    pub(crate) text: String,
    pub(crate) image: Option<ImageLink>,
    pub(crate) attached: bool,
    /// Connections keyed by the note on the other end.
    pub(crate) links: HashMap<NoteId, ConnectionId>,
}

impl Note {
    pub(crate) fn new(id: NoteId, data: &NoteData, image: Option<&Rc<StoredImage>>) -> Self {
        Self {
            id,
            x: data.x,
            y: data.y,
            width: data.width,
            text: data.text.clone(),
            image: image.map(ImageLink::new),
            attached: false,
            links: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> NoteId {
        self.id
    }

    #[must_use]
    pub fn x(&self) -> f64 {
        self.x
    }

    #[must_use]
    pub fn y(&self) -> f64 {
        self.y
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Id of the image shown, if any.
    #[must_use]
    pub fn image_id(&self) -> Option<ImageId> {
        self.image.as_ref().map(|link| link.id)
    }

    /// The image shown, if it is still alive.
    #[must_use]
    pub fn image(&self) -> Option<Rc<StoredImage>> {
        self.image.as_ref().and_then(|link| link.image.upgrade())
    }

    /// Whether changes to this note are reported as edits.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// The connection to `other`, if any.
    #[must_use]
    pub fn connection_to(&self, other: NoteId) -> Option<ConnectionId> {
        self.links.get(&other).copied()
    }

    /// Every connection touching this note, in no particular order.
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.links.values().copied()
    }

    /// Full payload.
    #[must_use]
    pub fn data(&self) -> NoteData {
        NoteData {
            x: self.x,
            y: self.y,
            width: self.width,
            text: self.text.clone(),
            image: self.image_id(),
        }
    }
}
