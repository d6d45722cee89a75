#![forbid(unsafe_code)]

//! Change descriptors and the merge algebra.
//!
//! A [`SnapshotAction`] describes the net pending change of one entity: it
//! was created (full payload), edited (partial payload) or deleted (identity
//! only). Two descriptors for the same entity that happen one after another
//! fold into one with [`merge`].
//!
//! # Merge Table
//!
//! ```text
//! a \ b     Create          Edit               Delete
//! absent    b               b                  b
//! Create    CONFLICT        Create(a <- b)     absent
//! Edit      CONFLICT        Edit(a <- b)       Delete
//! Delete    Edit(full b)    CONFLICT           CONFLICT
//! ```
//!
//! `a <- b` overlays the fields `b` defines on top of `a`. Neither input is
//! mutated.
//!
//! # Invariants
//!
//! 1. `merge(None, Some(x)) == Merged(x)` and `merge(Some(x), None) == Merged(x)`.
//! 2. A [`ConnectionId`] is always canonical: `a < b`, with ports swapped
//!    alongside their notes.
//! 3. The storage key of an entity depends only on its identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::WireError;
use crate::image::ImageId;

// ============================================================================
// Identities
// ============================================================================

/// Identifier of a note, unique within a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteId(pub u32);

impl NoteId {
    /// Largest id a note may carry (positive 31-bit range).
    pub const MAX: u32 = 0x7fff_ffff;

    /// Create a note id from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether the id is a positive 31-bit number.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 1 && self.0 <= Self::MAX
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Side of a note a connection is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Port {
    Left = 0,
    Top = 1,
    Right = 2,
    Bottom = 3,
}

impl Port {
    /// All ports in wire order.
    pub const ALL: [Port; 4] = [Port::Left, Port::Top, Port::Right, Port::Bottom];

    /// Numeric wire value.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Parse a numeric wire value.
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Canonical identity of a connection between two note ports.
///
/// The lower note id is always stored first, so `(A, x, B, y)` and
/// `(B, y, A, x)` produce the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId {
    a: NoteId,
    pa: Port,
    b: NoteId,
    pb: Port,
}

impl ConnectionId {
    /// Build a canonical identity, swapping the endpoints if `a > b`.
    #[must_use]
    pub fn new(a: NoteId, pa: Port, b: NoteId, pb: Port) -> Self {
        if a > b {
            Self {
                a: b,
                pa: pb,
                b: a,
                pb: pa,
            }
        } else {
            Self { a, pa, b, pb }
        }
    }

    /// Lower note id.
    #[must_use]
    pub const fn a(&self) -> NoteId {
        self.a
    }

    /// Port on the lower note.
    #[must_use]
    pub const fn pa(&self) -> Port {
        self.pa
    }

    /// Higher note id.
    #[must_use]
    pub const fn b(&self) -> NoteId {
        self.b
    }

    /// Port on the higher note.
    #[must_use]
    pub const fn pb(&self) -> Port {
        self.pb
    }

    /// Whether `note` is one of the endpoints.
    #[must_use]
    pub fn touches(&self, note: NoteId) -> bool {
        self.a == note || self.b == note
    }

    /// The endpoint opposite to `note`, if `note` is an endpoint.
    #[must_use]
    pub fn other(&self, note: NoteId) -> Option<NoteId> {
        if self.a == note {
            Some(self.b)
        } else if self.b == note {
            Some(self.a)
        } else {
            None
        }
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}>{},{}", self.a, self.pa, self.b, self.pb)
    }
}

/// Identity of a tracked entity.
pub trait Identity: Clone + PartialEq + fmt::Debug {
    /// Which entity family this identity belongs to.
    const KIND: EntityKind;

    /// String key used by [`Snapshot`](crate::snapshot::Snapshot) maps.
    fn key(&self) -> String;
}

impl Identity for NoteId {
    const KIND: EntityKind = EntityKind::Note;

    fn key(&self) -> String {
        self.0.to_string()
    }
}

impl Identity for ConnectionId {
    const KIND: EntityKind = EntityKind::Connection;

    fn key(&self) -> String {
        self.to_string()
    }
}

/// Entity families tracked by snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Note,
    Connection,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Note => f.write_str("note"),
            Self::Connection => f.write_str("connection"),
        }
    }
}

// ============================================================================
// Style values
// ============================================================================

/// A 6-digit hex color without the leading `#`, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(String);

impl Color {
    /// Parse a 6-digit hex string.
    pub fn parse(value: &str) -> Result<Self, WireError> {
        if value.len() == 6 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(value.to_ascii_lowercase()))
        } else {
            Err(WireError::InvalidColor(value.to_string()))
        }
    }

    /// The hex digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Color {
    /// Red (`ff0000`).
    fn default() -> Self {
        Self(String::from("ff0000"))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Color {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Color {
    type Error = WireError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.0
    }
}

/// Dash pattern multipliers, scaled by the stroke size when drawn.
///
/// Transported as a space-joined string (`"2 1"`); the empty pattern is a
/// solid line.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DashPattern(SmallVec<[f64; 4]>);

impl DashPattern {
    /// A solid line.
    #[must_use]
    pub fn solid() -> Self {
        Self(SmallVec::new())
    }

    /// Build a pattern from multipliers without checking them.
    ///
    /// The board rejects patterns that fail [`is_valid`](Self::is_valid).
    #[must_use]
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self(values.into_iter().collect())
    }

    /// Build a pattern, or `None` if a multiplier is negative or not finite.
    #[must_use]
    pub fn try_new(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let dash = Self::new(values);
        dash.is_valid().then_some(dash)
    }

    /// Every multiplier is finite and not negative.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|v| v.is_finite() && *v >= 0.0)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    #[must_use]
    pub fn is_solid(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DashPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

impl FromStr for DashPattern {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut values = SmallVec::new();
        for part in s.split_whitespace() {
            let value: f64 = part
                .parse()
                .map_err(|_| WireError::InvalidDash(s.to_string()))?;
            values.push(value);
        }
        let dash = Self(values);
        if !dash.is_valid() {
            return Err(WireError::InvalidDash(s.to_string()));
        }
        Ok(dash)
    }
}

impl TryFrom<String> for DashPattern {
    type Error = WireError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DashPattern> for String {
    fn from(dash: DashPattern) -> Self {
        dash.to_string()
    }
}

/// A stroke size is a positive finite number.
#[must_use]
pub fn is_valid_size(size: f64) -> bool {
    size.is_finite() && size > 0.0
}

// ============================================================================
// Payloads
// ============================================================================

/// Full data of an entity, paired with its partial form.
pub trait Payload: Clone + PartialEq + fmt::Debug {
    /// Partial payload: every field optional.
    type Patch: Clone + Default + PartialEq + fmt::Debug;

    /// A copy of `self` with the fields `patch` defines replaced.
    fn patched(&self, patch: &Self::Patch) -> Self;

    /// The full payload as a patch defining every field.
    fn to_patch(&self) -> Self::Patch;

    /// `base` with the fields `top` defines replaced.
    fn overlay(base: &Self::Patch, top: &Self::Patch) -> Self::Patch;
}

/// Note payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteData {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub text: String,
    /// `None` when the note shows no image.
    pub image: Option<ImageId>,
}

/// Partial note payload.
///
/// `image: Some(None)` clears the image; `image: None` leaves it untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotePatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub text: Option<String>,
    pub image: Option<Option<ImageId>>,
}

impl NotePatch {
    /// Whether the patch defines no field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Payload for NoteData {
    type Patch = NotePatch;

    fn patched(&self, patch: &NotePatch) -> Self {
        Self {
            x: patch.x.unwrap_or(self.x),
            y: patch.y.unwrap_or(self.y),
            width: patch.width.unwrap_or(self.width),
            text: patch.text.clone().unwrap_or_else(|| self.text.clone()),
            image: patch.image.unwrap_or(self.image),
        }
    }

    fn to_patch(&self) -> NotePatch {
        NotePatch {
            x: Some(self.x),
            y: Some(self.y),
            width: Some(self.width),
            text: Some(self.text.clone()),
            image: Some(self.image),
        }
    }

    fn overlay(base: &NotePatch, top: &NotePatch) -> NotePatch {
        NotePatch {
            x: top.x.or(base.x),
            y: top.y.or(base.y),
            width: top.width.or(base.width),
            text: top.text.clone().or_else(|| base.text.clone()),
            image: top.image.or(base.image),
        }
    }
}

/// Connection payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionData {
    pub color: Color,
    pub size: f64,
    pub dash: DashPattern,
}

/// Partial connection payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionPatch {
    pub color: Option<Color>,
    pub size: Option<f64>,
    pub dash: Option<DashPattern>,
}

impl ConnectionPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Payload for ConnectionData {
    type Patch = ConnectionPatch;

    fn patched(&self, patch: &ConnectionPatch) -> Self {
        Self {
            color: patch.color.clone().unwrap_or_else(|| self.color.clone()),
            size: patch.size.unwrap_or(self.size),
            dash: patch.dash.clone().unwrap_or_else(|| self.dash.clone()),
        }
    }

    fn to_patch(&self) -> ConnectionPatch {
        ConnectionPatch {
            color: Some(self.color.clone()),
            size: Some(self.size),
            dash: Some(self.dash.clone()),
        }
    }

    fn overlay(base: &ConnectionPatch, top: &ConnectionPatch) -> ConnectionPatch {
        ConnectionPatch {
            color: top.color.clone().or_else(|| base.color.clone()),
            size: top.size.or(base.size),
            dash: top.dash.clone().or_else(|| base.dash.clone()),
        }
    }
}

// ============================================================================
// Snapshot actions
// ============================================================================

/// Discriminant of a [`SnapshotAction`], numbered as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActionKind {
    Create = 0,
    Edit = 1,
    Delete = 2,
}

impl ActionKind {
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Create),
            1 => Some(Self::Edit),
            2 => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Edit => f.write_str("edit"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// Net pending change of one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotAction<I, D: Payload> {
    /// The entity came into existence with `data`.
    Create { id: I, data: D },
    /// The fields in `patch` changed.
    Edit { id: I, patch: D::Patch },
    /// The entity went away.
    Delete { id: I },
}

/// Change descriptor for a note.
pub type NoteAction = SnapshotAction<NoteId, NoteData>;
/// Change descriptor for a connection.
pub type ConnectionAction = SnapshotAction<ConnectionId, ConnectionData>;

impl<I: Identity, D: Payload> SnapshotAction<I, D> {
    /// Identity of the entity this action describes.
    #[must_use]
    pub fn id(&self) -> &I {
        match self {
            Self::Create { id, .. } | Self::Edit { id, .. } | Self::Delete { id } => id,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Create { .. } => ActionKind::Create,
            Self::Edit { .. } => ActionKind::Edit,
            Self::Delete { .. } => ActionKind::Delete,
        }
    }

    /// Snapshot map key of the entity.
    #[must_use]
    pub fn key(&self) -> String {
        self.id().key()
    }
}

/// Result of folding two actions.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome<A> {
    /// The two actions are equivalent to this one.
    Merged(A),
    /// The two actions cancel out; nothing is pending.
    Cancelled,
    /// The sequence is impossible (e.g. two creates in a row).
    Conflict,
}

/// Fold `a` followed by `b` into one equivalent action.
///
/// Both actions must describe the same entity.
#[must_use]
pub fn merge<I: Identity, D: Payload>(
    a: Option<&SnapshotAction<I, D>>,
    b: Option<&SnapshotAction<I, D>>,
) -> MergeOutcome<SnapshotAction<I, D>> {
    use SnapshotAction::{Create, Delete, Edit};

    let (a, b) = match (a, b) {
        (None, None) => return MergeOutcome::Cancelled,
        (None, Some(b)) => return MergeOutcome::Merged(b.clone()),
        (Some(a), None) => return MergeOutcome::Merged(a.clone()),
        (Some(a), Some(b)) => (a, b),
    };
    debug_assert_eq!(a.id(), b.id(), "merging actions of different entities");

    match (a, b) {
        (Create { id, data }, Edit { patch, .. }) => MergeOutcome::Merged(Create {
            id: id.clone(),
            data: data.patched(patch),
        }),
        (Create { .. }, Delete { .. }) => MergeOutcome::Cancelled,
        (Edit { id, patch: base }, Edit { patch: top, .. }) => MergeOutcome::Merged(Edit {
            id: id.clone(),
            patch: D::overlay(base, top),
        }),
        (Edit { .. }, Delete { .. }) => MergeOutcome::Merged(b.clone()),
        // Deleted then recreated: the entity is still there, with new data.
        (Delete { .. }, Create { id, data }) => MergeOutcome::Merged(Edit {
            id: id.clone(),
            patch: data.to_patch(),
        }),
        (Create { .. }, Create { .. })
        | (Edit { .. }, Create { .. })
        | (Delete { .. }, Edit { .. })
        | (Delete { .. }, Delete { .. }) => MergeOutcome::Conflict,
    }
}

// ============================================================================
// Tests
// ============================================================================
