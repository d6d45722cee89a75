#![forbid(unsafe_code)]

//! The board: owner of notes and connections.
//!
//! # Invariants
//!
//! 1. Every note in `order` is in `notes` and vice versa.
//! 2. A connection is listed in `connections` iff both endpoint notes link
//!    to it under the other endpoint's id.
//! 3. At most one connection joins any two notes.
//! 4. A precondition failure leaves the board and its outbox untouched.
//!
//! # Detached entities
//!
//! Entities start detached. Edits to a detached entity whose create is
//! still queued in the outbox are folded into that create instead of being
//! queued separately, so setting up a fresh note produces one change.

use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, debug_span, warn};

use super::connection::{Connection, ConnectionStyle};
use super::note::{ImageLink, Note};
use super::{BoardChange, StyleDefaults};
use crate::action::{
    Color, ConnectionAction, ConnectionData, ConnectionId, ConnectionPatch, DashPattern, Identity,
    NoteAction, NoteData, NoteId, NotePatch, Payload, Port, SnapshotAction, is_valid_size,
};
use crate::config::BoardConfig;
use crate::error::{ApplyError, BoardError};
use crate::image::{ImageId, ImageResolver, StoredImage};
use crate::snapshot::Snapshot;
use crate::wire::RawSnapshot;

/// A board of notes and connections.
pub struct Board {
    id: String,
    order: Vec<NoteId>,
    notes: HashMap<NoteId, Note>,
    connection_order: Vec<ConnectionId>,
    connections: HashMap<ConnectionId, Connection>,
    defaults: StyleDefaults,
    rng: SmallRng,
    max_id_attempts: u32,
    outbox: Vec<BoardChange>,
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("id", &self.id)
            .field("notes", &self.order.len())
            .field("connections", &self.connection_order.len())
            .field("defaults", &self.defaults)
            .field("queued_changes", &self.outbox.len())
            .finish()
    }
}

impl Board {
    /// An empty board with default configuration.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(id, &BoardConfig::default())
    }

    /// An empty board using the style defaults and id allocation bound of
    /// `config`.
    #[must_use]
    pub fn with_config(id: impl Into<String>, config: &BoardConfig) -> Self {
        Self {
            id: id.into(),
            order: Vec::new(),
            notes: HashMap::new(),
            connection_order: Vec::new(),
            connections: HashMap::new(),
            defaults: config.style_defaults(),
            rng: SmallRng::from_os_rng(),
            max_id_attempts: config.max_id_attempts,
            outbox: Vec::new(),
        }
    }

    /// Seed the id generator, for reproducible ids.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    // ====================================================================
    // Queries
    // ====================================================================

    #[must_use]
    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.get(&id)
    }

    /// Notes in creation order.
    pub fn notes(&self) -> impl Iterator<Item = &Note> + '_ {
        self.order.iter().filter_map(|id| self.notes.get(id))
    }

    #[must_use]
    pub fn note_count(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Connections in creation order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> + '_ {
        self.connection_order
            .iter()
            .filter_map(|id| self.connections.get(id))
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connection_order.len()
    }

    /// Whether any connection joins `a` and `b`, whatever its ports.
    pub fn is_connected(&self, a: NoteId, b: NoteId) -> Result<bool, BoardError> {
        let note = self.notes.get(&a).ok_or(BoardError::NoteNotFound(a))?;
        Ok(note.links.contains_key(&b))
    }

    /// Style adopted by the next connection created without explicit values.
    #[must_use]
    pub fn defaults(&self) -> &StyleDefaults {
        &self.defaults
    }

    /// Style shared by the given connections. Unknown ids are skipped.
    #[must_use]
    pub fn matching_style(&self, ids: &[ConnectionId]) -> Option<ConnectionStyle> {
        ConnectionStyle::matching(ids.iter().filter_map(|id| self.connections.get(id)))
    }

    /// The whole board as a list of creates, ordered by id.
    #[must_use]
    pub fn export(&self) -> RawSnapshot {
        let mut notes: Vec<&Note> = self.notes.values().collect();
        notes.sort_by_key(|note| note.id);
        let mut connections: Vec<&Connection> = self.connections.values().collect();
        connections.sort_by_key(|conn| conn.id);
        RawSnapshot {
            id: self.id.clone(),
            note: notes
                .into_iter()
                .map(|note| NoteAction::Create {
                    id: note.id,
                    data: note.data(),
                })
                .collect(),
            conn: connections
                .into_iter()
                .map(|conn| ConnectionAction::Create {
                    id: conn.id,
                    data: conn.data(),
                })
                .collect(),
        }
    }

    // ====================================================================
    // Outbox
    // ====================================================================

    /// Drain the queued (backward, forward) pairs in mutation order.
    pub fn take_changes(&mut self) -> Vec<BoardChange> {
        mem::take(&mut self.outbox)
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.outbox.is_empty()
    }

    fn emit_note(&mut self, backward: NoteAction, forward: NoteAction) {
        self.outbox.push(BoardChange::Note { backward, forward });
    }

    fn emit_connection(&mut self, backward: ConnectionAction, forward: ConnectionAction) {
        self.outbox
            .push(BoardChange::Connection { backward, forward });
    }

    // ====================================================================
    // Notes
    // ====================================================================

    /// Create a note under a fresh random id.
    pub fn create_note(
        &mut self,
        x: f64,
        y: f64,
        width: f64,
        text: impl Into<String>,
        image: Option<&Rc<StoredImage>>,
    ) -> Result<NoteId, BoardError> {
        let id = self.allocate_id()?;
        self.new_note(id, x, y, width, text, image)?;
        Ok(id)
    }

    /// Create a note under a caller-chosen id.
    pub fn new_note(
        &mut self,
        id: NoteId,
        x: f64,
        y: f64,
        width: f64,
        text: impl Into<String>,
        image: Option<&Rc<StoredImage>>,
    ) -> Result<(), BoardError> {
        if !id.is_valid() {
            return Err(BoardError::InvalidNoteId(id));
        }
        if self.notes.contains_key(&id) {
            return Err(BoardError::DuplicateNote(id));
        }
        let data = NoteData {
            x,
            y,
            width,
            text: text.into(),
            image: image.map(|img| img.id),
        };
        self.notes.insert(id, Note::new(id, &data, image));
        self.order.push(id);
        self.emit_note(NoteAction::Delete { id }, NoteAction::Create { id, data });
        Ok(())
    }

    /// Destroy a note and every connection touching it.
    pub fn destroy_note(&mut self, id: NoteId) -> Result<(), BoardError> {
        if !self.notes.contains_key(&id) {
            return Err(BoardError::NoteNotFound(id));
        }
        let touching: Vec<ConnectionId> = self
            .connection_order
            .iter()
            .filter(|conn| conn.touches(id))
            .copied()
            .collect();
        for conn in touching {
            self.destroy_connection(conn)?;
        }

        let note = self.notes.remove(&id).ok_or(BoardError::NoteNotFound(id))?;
        self.order.retain(|n| *n != id);
        self.emit_note(
            NoteAction::Create {
                id,
                data: note.data(),
            },
            NoteAction::Delete { id },
        );
        Ok(())
    }

    /// Report further edits of the note as separate changes.
    pub fn attach_note(&mut self, id: NoteId) -> Result<(), BoardError> {
        let note = self.notes.get_mut(&id).ok_or(BoardError::NoteNotFound(id))?;
        note.attached = true;
        Ok(())
    }

    /// Move a note by `(dx, dy)`.
    pub fn move_note(&mut self, id: NoteId, dx: f64, dy: f64) -> Result<(), BoardError> {
        let note = self.notes.get(&id).ok_or(BoardError::NoteNotFound(id))?;
        let (x, y) = (note.x + dx, note.y + dy);
        self.set_note_position(id, x, y)
    }

    pub fn set_note_position(&mut self, id: NoteId, x: f64, y: f64) -> Result<(), BoardError> {
        let patch = NotePatch {
            x: Some(x),
            y: Some(y),
            ..NotePatch::default()
        };
        self.patch_note(id, patch, None)
    }

    pub fn set_note_width(&mut self, id: NoteId, width: f64) -> Result<(), BoardError> {
        let patch = NotePatch {
            width: Some(width),
            ..NotePatch::default()
        };
        self.patch_note(id, patch, None)
    }

    pub fn set_note_text(
        &mut self,
        id: NoteId,
        text: impl Into<String>,
    ) -> Result<(), BoardError> {
        let patch = NotePatch {
            text: Some(text.into()),
            ..NotePatch::default()
        };
        self.patch_note(id, patch, None)
    }

    /// Show `image` on the note, or nothing. No change is reported when the
    /// image stays the same.
    pub fn set_note_image(
        &mut self,
        id: NoteId,
        image: Option<&Rc<StoredImage>>,
    ) -> Result<(), BoardError> {
        let note = self.notes.get(&id).ok_or(BoardError::NoteNotFound(id))?;
        if note.image_id() == image.map(|img| img.id) {
            return Ok(());
        }
        self.patch_note(id, NotePatch::default(), Some(image.map(ImageLink::new)))
    }

    /// Clear the image `image` from every note showing it. Returns how many
    /// notes were changed.
    pub fn release_image(&mut self, image: ImageId) -> usize {
        let showing: Vec<NoteId> = self
            .notes()
            .filter(|note| note.image_id() == Some(image))
            .map(|note| note.id)
            .collect();
        let mut released = 0;
        for id in showing {
            match self.patch_note(id, NotePatch::default(), Some(None)) {
                Ok(()) => {
                    debug!(target: "noteboard.board", note = %id, image = %image, "image released");
                    released += 1;
                }
                Err(err) => {
                    warn!(target: "noteboard.board", note = %id, image = %image, error = %err, "image release failed");
                }
            }
        }
        released
    }

    /// Apply the fields of `forward` and report one edit for them.
    ///
    /// `image` replaces the note image when given; the image field of
    /// `forward` is derived from it.
    fn patch_note(
        &mut self,
        id: NoteId,
        mut forward: NotePatch,
        image: Option<Option<ImageLink>>,
    ) -> Result<(), BoardError> {
        let note = self.notes.get_mut(&id).ok_or(BoardError::NoteNotFound(id))?;
        let mut backward = NotePatch::default();
        if let Some(x) = forward.x {
            backward.x = Some(mem::replace(&mut note.x, x));
        }
        if let Some(y) = forward.y {
            backward.y = Some(mem::replace(&mut note.y, y));
        }
        if let Some(width) = forward.width {
            backward.width = Some(mem::replace(&mut note.width, width));
        }
        if let Some(text) = &forward.text {
            backward.text = Some(mem::replace(&mut note.text, text.clone()));
        }
        forward.image = None;
        if let Some(link) = image {
            backward.image = Some(note.image_id());
            forward.image = Some(link.as_ref().map(|l| l.id));
            note.image = link;
        }
        if forward.is_empty() {
            return Ok(());
        }

        let attached = note.attached;
        if !attached && self.fold_into_queued_create_note(id, &forward) {
            return Ok(());
        }
        self.emit_note(
            NoteAction::Edit {
                id,
                patch: backward,
            },
            NoteAction::Edit { id, patch: forward },
        );
        Ok(())
    }

    fn fold_into_queued_create_note(&mut self, id: NoteId, patch: &NotePatch) -> bool {
        let queued = self.outbox.iter_mut().rev().find_map(|change| match change {
            BoardChange::Note { forward, .. } if *forward.id() == id => Some(forward),
            _ => None,
        });
        queued.is_some_and(|forward| fold_into_create(forward, patch))
    }

    fn allocate_id(&mut self) -> Result<NoteId, BoardError> {
        let mut attempts: u32 = 0;
        loop {
            if self.max_id_attempts != 0 && attempts >= self.max_id_attempts {
                warn!(target: "noteboard.board", attempts, "note id allocation gave up");
                return Err(BoardError::IdSpaceExhausted { attempts });
            }
            attempts = attempts.saturating_add(1);
            let id = NoteId(self.rng.random_range(1..=NoteId::MAX));
            if !self.notes.contains_key(&id) {
                return Ok(id);
            }
        }
    }

    // ====================================================================
    // Connections
    // ====================================================================

    /// Connect two note ports.
    ///
    /// Style components left `None` in `style` take the board defaults; the
    /// resulting style becomes the new defaults.
    pub fn create_connection(
        &mut self,
        a: NoteId,
        pa: Port,
        b: NoteId,
        pb: Port,
        style: ConnectionStyle,
    ) -> Result<ConnectionId, BoardError> {
        if !self.notes.contains_key(&a) {
            return Err(BoardError::NoteNotFound(a));
        }
        if !self.notes.contains_key(&b) {
            return Err(BoardError::NoteNotFound(b));
        }
        if a == b {
            return Err(BoardError::SelfConnection(a));
        }
        let id = ConnectionId::new(a, pa, b, pb);
        if self.is_connected(id.a(), id.b())? {
            return Err(BoardError::AlreadyConnected {
                a: id.a(),
                b: id.b(),
            });
        }

        let data = ConnectionData {
            color: style.color.unwrap_or_else(|| self.defaults.color.clone()),
            size: style.size.unwrap_or(self.defaults.size),
            dash: style.dash.unwrap_or_else(|| self.defaults.dash.clone()),
        };
        check_stroke(Some(data.size), Some(&data.dash))?;
        self.defaults = StyleDefaults {
            color: data.color.clone(),
            size: data.size,
            dash: data.dash.clone(),
        };
        for (note, other) in [(id.a(), id.b()), (id.b(), id.a())] {
            if let Some(note) = self.notes.get_mut(&note) {
                note.links.insert(other, id);
            }
        }
        self.connections
            .insert(id, Connection::new(id, data.clone()));
        self.connection_order.push(id);
        self.emit_connection(
            ConnectionAction::Delete { id },
            ConnectionAction::Create { id, data },
        );
        Ok(id)
    }

    pub fn destroy_connection(&mut self, id: ConnectionId) -> Result<(), BoardError> {
        let conn = self
            .connections
            .remove(&id)
            .ok_or(BoardError::ConnectionNotFound(id))?;
        self.connection_order.retain(|c| *c != id);
        for (note, other) in [(id.a(), id.b()), (id.b(), id.a())] {
            if let Some(note) = self.notes.get_mut(&note) {
                note.links.remove(&other);
            }
        }
        self.emit_connection(
            ConnectionAction::Create {
                id,
                data: conn.data(),
            },
            ConnectionAction::Delete { id },
        );
        Ok(())
    }

    pub fn attach_connection(&mut self, id: ConnectionId) -> Result<(), BoardError> {
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(BoardError::ConnectionNotFound(id))?;
        conn.attached = true;
        Ok(())
    }

    pub fn set_connection_color(
        &mut self,
        id: ConnectionId,
        color: Color,
    ) -> Result<(), BoardError> {
        let patch = ConnectionPatch {
            color: Some(color),
            ..ConnectionPatch::default()
        };
        self.patch_connection(id, patch)
    }

    pub fn set_connection_size(&mut self, id: ConnectionId, size: f64) -> Result<(), BoardError> {
        let patch = ConnectionPatch {
            size: Some(size),
            ..ConnectionPatch::default()
        };
        self.patch_connection(id, patch)
    }

    /// Set the dash pattern. Setting the current pattern does nothing.
    pub fn set_connection_dash(
        &mut self,
        id: ConnectionId,
        dash: DashPattern,
    ) -> Result<(), BoardError> {
        let patch = ConnectionPatch {
            dash: Some(dash),
            ..ConnectionPatch::default()
        };
        self.patch_connection(id, patch)
    }

    fn patch_connection(
        &mut self,
        id: ConnectionId,
        mut forward: ConnectionPatch,
    ) -> Result<(), BoardError> {
        check_stroke(forward.size, forward.dash.as_ref())?;
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(BoardError::ConnectionNotFound(id))?;
        if forward.dash.as_ref() == Some(&conn.dash) {
            forward.dash = None;
        }
        let mut backward = ConnectionPatch::default();
        if let Some(color) = &forward.color {
            backward.color = Some(mem::replace(&mut conn.color, color.clone()));
            self.defaults.color = color.clone();
        }
        if let Some(size) = forward.size {
            backward.size = Some(mem::replace(&mut conn.size, size));
            self.defaults.size = size;
        }
        if let Some(dash) = &forward.dash {
            backward.dash = Some(mem::replace(&mut conn.dash, dash.clone()));
            self.defaults.dash = dash.clone();
        }
        if forward.is_empty() {
            return Ok(());
        }

        let attached = conn.attached;
        if !attached && self.fold_into_queued_create_connection(id, &forward) {
            return Ok(());
        }
        self.emit_connection(
            ConnectionAction::Edit {
                id,
                patch: backward,
            },
            ConnectionAction::Edit { id, patch: forward },
        );
        Ok(())
    }

    fn fold_into_queued_create_connection(
        &mut self,
        id: ConnectionId,
        patch: &ConnectionPatch,
    ) -> bool {
        let queued = self.outbox.iter_mut().rev().find_map(|change| match change {
            BoardChange::Connection { forward, .. } if *forward.id() == id => Some(forward),
            _ => None,
        });
        queued.is_some_and(|forward| fold_into_create(forward, patch))
    }

    // ====================================================================
    // Replay
    // ====================================================================

    /// Replay every change of `snapshot`: notes first, then connections.
    ///
    /// Created entities are attached immediately. Images are looked up
    /// through `images`; an image that cannot be found is dropped.
    ///
    /// Stops at the first change that does not fit the board. Changes made
    /// before that point stay applied and queued.
    pub fn apply_snapshot(
        &mut self,
        images: &mut dyn ImageResolver,
        snapshot: &Snapshot,
    ) -> Result<(), ApplyError> {
        let _span = debug_span!(
            "board.apply_snapshot",
            board = %self.id,
            notes = snapshot.note_count(),
            connections = snapshot.connection_count(),
        )
        .entered();

        for action in snapshot.note_actions() {
            self.apply_note_action(images, action)
                .map_err(|source| apply_error(action, source))?;
        }
        for action in snapshot.connection_actions() {
            self.apply_connection_action(action)
                .map_err(|source| apply_error(action, source))?;
        }
        debug!(target: "noteboard.board", board = %self.id, "snapshot applied");
        Ok(())
    }

    fn apply_note_action(
        &mut self,
        images: &mut dyn ImageResolver,
        action: &NoteAction,
    ) -> Result<(), BoardError> {
        match action {
            NoteAction::Create { id, data } => {
                let image = resolve_image(images, *id, data.image);
                self.new_note(*id, data.x, data.y, data.width, data.text.clone(), image.as_ref())?;
                self.attach_note(*id)
            }
            NoteAction::Edit { id, patch } => {
                let image = patch
                    .image
                    .map(|image| resolve_image(images, *id, image).as_ref().map(ImageLink::new));
                self.patch_note(*id, patch.clone(), image)
            }
            NoteAction::Delete { id } => self.destroy_note(*id),
        }
    }

    fn apply_connection_action(&mut self, action: &ConnectionAction) -> Result<(), BoardError> {
        match action {
            ConnectionAction::Create { id, data } => {
                let style = ConnectionStyle {
                    color: Some(data.color.clone()),
                    size: Some(data.size),
                    dash: Some(data.dash.clone()),
                };
                self.create_connection(id.a(), id.pa(), id.b(), id.pb(), style)?;
                self.attach_connection(*id)
            }
            ConnectionAction::Edit { id, patch } => self.patch_connection(*id, patch.clone()),
            ConnectionAction::Delete { id } => {
                if self.connections.contains_key(id) {
                    self.destroy_connection(*id)
                } else {
                    // Already removed along with one of its notes.
                    debug!(target: "noteboard.board", connection = %id, "delete of absent connection skipped");
                    Ok(())
                }
            }
        }
    }
}

fn fold_into_create<I: Identity, D: Payload>(
    action: &mut SnapshotAction<I, D>,
    patch: &D::Patch,
) -> bool {
    match action {
        SnapshotAction::Create { data, .. } => {
            *data = data.patched(patch);
            true
        }
        _ => false,
    }
}

fn apply_error<I: Identity, D: Payload>(
    action: &SnapshotAction<I, D>,
    source: BoardError,
) -> ApplyError {
    ApplyError {
        entity: I::KIND,
        key: action.key(),
        kind: action.kind(),
        source,
    }
}

fn check_stroke(size: Option<f64>, dash: Option<&DashPattern>) -> Result<(), BoardError> {
    if let Some(size) = size.filter(|size| !is_valid_size(*size)) {
        return Err(BoardError::InvalidSize(size.to_string()));
    }
    if let Some(dash) = dash.filter(|dash| !dash.is_valid()) {
        return Err(BoardError::InvalidDash(dash.to_string()));
    }
    Ok(())
}

fn resolve_image(
    images: &mut dyn ImageResolver,
    note: NoteId,
    image: Option<ImageId>,
) -> Option<Rc<StoredImage>> {
    let id = image?;
    let resolved = images.resolve(id);
    if resolved.is_none() {
        warn!(target: "noteboard.board", note = %note, image = %id, "image not found; note shows none");
    }
    resolved
}
