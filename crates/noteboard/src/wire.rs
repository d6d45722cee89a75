#![forbid(unsafe_code)]

//! Wire form of snapshots.
//!
//! A delta travels as
//!
//! ```json
//! { "id": "board", "note": [ ... ], "conn": [ ... ] }
//! ```
//!
//! with one flat record per entity. `type` is `0` (create), `1` (edit) or
//! `2` (delete). Creates carry every data field, edits only the changed
//! ones, deletes only the identity. Note images travel as `img`, with `0`
//! meaning no image; dash patterns travel as space-joined strings.
//!
//! Decoding validates each record and rejects, rather than repairs,
//! connections whose endpoints are not in ascending order.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::action::{
    ActionKind, Color, ConnectionAction, ConnectionData, ConnectionId, ConnectionPatch,
    DashPattern, EntityKind, NoteAction, NoteData, NoteId, NotePatch, Port, is_valid_size,
};
use crate::error::WireError;
use crate::image::ImageId;

/// Transport form of a [`Snapshot`](crate::snapshot::Snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    /// Board identifier.
    pub id: String,
    #[serde(default)]
    pub note: Vec<NoteAction>,
    #[serde(default)]
    pub conn: Vec<ConnectionAction>,
}

impl RawSnapshot {
    /// An empty delta for `id`.
    #[must_use]
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            note: Vec::new(),
            conn: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.note.is_empty() && self.conn.is_empty()
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode and validate JSON.
    pub fn from_json(json: &str) -> Result<Self, WireError> {
        let wire: WireSnapshot = serde_json::from_str(json)?;
        Ok(Self {
            id: wire.id,
            note: wire
                .note
                .into_iter()
                .map(NoteAction::try_from)
                .collect::<Result<_, _>>()?,
            conn: wire
                .conn
                .into_iter()
                .map(ConnectionAction::try_from)
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Transport form of one history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHistoryEntry {
    pub name: String,
    pub backward: RawSnapshot,
    pub forward: RawSnapshot,
}

// ============================================================================
// Flat records
// ============================================================================

#[derive(Deserialize)]
struct WireSnapshot {
    id: String,
    #[serde(default)]
    note: Vec<WireNote>,
    #[serde(default)]
    conn: Vec<WireConnection>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireNote {
    #[serde(rename = "type")]
    kind: u8,
    id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    img: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireConnection {
    #[serde(rename = "type")]
    kind: u8,
    a: u32,
    b: u32,
    pa: u8,
    pb: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dash: Option<String>,
}

fn kind_of(tag: u8) -> Result<ActionKind, WireError> {
    ActionKind::from_tag(tag).ok_or(WireError::UnknownType(tag))
}

fn required<T>(value: Option<T>, entity: EntityKind, field: &'static str) -> Result<T, WireError> {
    value.ok_or(WireError::MissingField { entity, field })
}

fn note_id(raw: u32) -> Result<NoteId, WireError> {
    let id = NoteId(raw);
    if id.is_valid() {
        Ok(id)
    } else {
        Err(WireError::InvalidNoteId(raw))
    }
}

fn port(raw: u8) -> Result<Port, WireError> {
    Port::from_index(raw).ok_or(WireError::InvalidPort(raw))
}

fn stroke_size(raw: f64) -> Result<f64, WireError> {
    if is_valid_size(raw) {
        Ok(raw)
    } else {
        Err(WireError::InvalidSize(raw.to_string()))
    }
}

impl From<&NoteAction> for WireNote {
    fn from(action: &NoteAction) -> Self {
        let mut wire = Self {
            kind: action.kind().tag(),
            id: action.id().raw(),
            x: None,
            y: None,
            width: None,
            text: None,
            img: None,
        };
        match action {
            NoteAction::Create { data, .. } => {
                wire.x = Some(data.x);
                wire.y = Some(data.y);
                wire.width = Some(data.width);
                wire.text = Some(data.text.clone());
                wire.img = Some(ImageId::to_wire(data.image));
            }
            NoteAction::Edit { patch, .. } => {
                wire.x = patch.x;
                wire.y = patch.y;
                wire.width = patch.width;
                wire.text = patch.text.clone();
                wire.img = patch.image.map(ImageId::to_wire);
            }
            NoteAction::Delete { .. } => {}
        }
        wire
    }
}

impl TryFrom<WireNote> for NoteAction {
    type Error = WireError;

    fn try_from(wire: WireNote) -> Result<Self, WireError> {
        let id = note_id(wire.id)?;
        Ok(match kind_of(wire.kind)? {
            ActionKind::Create => {
                let entity = EntityKind::Note;
                Self::Create {
                    id,
                    data: NoteData {
                        x: required(wire.x, entity, "x")?,
                        y: required(wire.y, entity, "y")?,
                        width: wire.width.unwrap_or(0.0),
                        text: required(wire.text, entity, "text")?,
                        image: ImageId::new(required(wire.img, entity, "img")?),
                    },
                }
            }
            ActionKind::Edit => Self::Edit {
                id,
                patch: NotePatch {
                    x: wire.x,
                    y: wire.y,
                    width: wire.width,
                    text: wire.text,
                    image: wire.img.map(ImageId::new),
                },
            },
            ActionKind::Delete => Self::Delete { id },
        })
    }
}

impl From<&ConnectionAction> for WireConnection {
    fn from(action: &ConnectionAction) -> Self {
        let id = action.id();
        let mut wire = Self {
            kind: action.kind().tag(),
            a: id.a().raw(),
            b: id.b().raw(),
            pa: id.pa().index(),
            pb: id.pb().index(),
            color: None,
            size: None,
            dash: None,
        };
        match action {
            ConnectionAction::Create { data, .. } => {
                wire.color = Some(data.color.to_string());
                wire.size = Some(data.size);
                wire.dash = Some(data.dash.to_string());
            }
            ConnectionAction::Edit { patch, .. } => {
                wire.color = patch.color.as_ref().map(Color::to_string);
                wire.size = patch.size;
                wire.dash = patch.dash.as_ref().map(DashPattern::to_string);
            }
            ConnectionAction::Delete { .. } => {}
        }
        wire
    }
}

impl TryFrom<WireConnection> for ConnectionAction {
    type Error = WireError;

    fn try_from(wire: WireConnection) -> Result<Self, WireError> {
        let (a, b) = (note_id(wire.a)?, note_id(wire.b)?);
        if a >= b {
            return Err(WireError::NonCanonicalConnection {
                a: wire.a,
                b: wire.b,
            });
        }
        let id = ConnectionId::new(a, port(wire.pa)?, b, port(wire.pb)?);
        let color = wire.color.as_deref().map(Color::parse).transpose()?;
        let size = wire.size.map(stroke_size).transpose()?;
        let dash = wire
            .dash
            .as_deref()
            .map(str::parse::<DashPattern>)
            .transpose()?;

        Ok(match kind_of(wire.kind)? {
            ActionKind::Create => {
                let entity = EntityKind::Connection;
                Self::Create {
                    id,
                    data: ConnectionData {
                        color: required(color, entity, "color")?,
                        size: required(size, entity, "size")?,
                        dash: dash.unwrap_or_default(),
                    },
                }
            }
            ActionKind::Edit => Self::Edit {
                id,
                patch: ConnectionPatch { color, size, dash },
            },
            ActionKind::Delete => Self::Delete { id },
        })
    }
}

// ============================================================================
// serde glue
// ============================================================================

impl Serialize for NoteAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireNote::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NoteAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireNote::deserialize(deserializer)?;
        Self::try_from(wire).map_err(D::Error::custom)
    }
}

impl Serialize for ConnectionAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireConnection::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConnectionAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireConnection::deserialize(deserializer)?;
        Self::try_from(wire).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conn_id() -> ConnectionId {
        ConnectionId::new(NoteId(9), Port::Bottom, NoteId(4), Port::Right)
    }

    #[test]
    fn note_create_has_every_field() {
        let action = NoteAction::Create {
            id: NoteId(123),
            data: NoteData {
                x: 1.0,
                y: 2.0,
                width: 150.0,
                text: "hi".into(),
                image: ImageId::new(7),
            },
        };
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(
            value,
            json!({"type": 0, "id": 123, "x": 1.0, "y": 2.0, "width": 150.0, "text": "hi", "img": 7})
        );
    }

    #[test]
    fn note_edit_carries_only_changed_fields() {
        let action = NoteAction::Edit {
            id: NoteId(5),
            patch: NotePatch {
                image: Some(None),
                ..NotePatch::default()
            },
        };
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value, json!({"type": 1, "id": 5, "img": 0}));

        let back: NoteAction = serde_json::from_value(value).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn delete_carries_identity_only() {
        let action = ConnectionAction::Delete { id: conn_id() };
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value, json!({"type": 2, "a": 4, "b": 9, "pa": 2, "pb": 3}));
    }

    #[test]
    fn connection_dash_is_space_joined() {
        let action = ConnectionAction::Create {
            id: conn_id(),
            data: ConnectionData {
                color: Color::parse("00ff00").unwrap(),
                size: 3.0,
                dash: DashPattern::new([2.0, 1.0]),
            },
        };
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["dash"], json!("2 1"));
        assert_eq!(value["color"], json!("00ff00"));
    }

    #[test]
    fn create_without_width_defaults_to_zero() {
        let action: NoteAction =
            serde_json::from_value(json!({"type": 0, "id": 1, "x": 0, "y": 0, "text": "", "img": 0}))
                .unwrap();
        match action {
            NoteAction::Create { data, .. } => {
                assert_eq!(data.width, 0.0);
                assert_eq!(data.image, None);
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn incomplete_create_is_rejected() {
        let err = RawSnapshot::from_json(
            r#"{"id":"b","note":[{"type":0,"id":1,"x":0,"y":0,"img":0}],"conn":[]}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            WireError::MissingField {
                entity: EntityKind::Note,
                field: "text"
            }
        );
    }

    #[test]
    fn descending_connection_is_rejected() {
        let err = RawSnapshot::from_json(
            r#"{"id":"b","conn":[{"type":2,"a":5,"b":3,"pa":0,"pb":0}]}"#,
        )
        .unwrap_err();
        assert_eq!(err, WireError::NonCanonicalConnection { a: 5, b: 3 });
    }

    #[test]
    fn bad_values_are_rejected() {
        let cases = [
            (r#"{"id":"b","note":[{"type":3,"id":1}]}"#, WireError::UnknownType(3)),
            (
                r#"{"id":"b","note":[{"type":2,"id":4294967295}]}"#,
                WireError::InvalidNoteId(u32::MAX),
            ),
            (
                r#"{"id":"b","note":[{"type":2,"id":0}]}"#,
                WireError::InvalidNoteId(0),
            ),
            (
                r#"{"id":"b","conn":[{"type":2,"a":1,"b":2,"pa":4,"pb":0}]}"#,
                WireError::InvalidPort(4),
            ),
            (
                r#"{"id":"b","conn":[{"type":1,"a":1,"b":2,"pa":0,"pb":0,"color":"red"}]}"#,
                WireError::InvalidColor("red".into()),
            ),
            (
                r#"{"id":"b","conn":[{"type":1,"a":1,"b":2,"pa":0,"pb":0,"size":0}]}"#,
                WireError::InvalidSize("0".into()),
            ),
        ];
        for (json, expected) in cases {
            assert_eq!(RawSnapshot::from_json(json).unwrap_err(), expected, "{json}");
        }
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            RawSnapshot::from_json("{not json"),
            Err(WireError::Json(_))
        ));
    }

    #[test]
    fn missing_lists_decode_as_empty() {
        let raw = RawSnapshot::from_json(r#"{"id":"b"}"#).unwrap();
        assert!(raw.is_empty());
        assert_eq!(raw, RawSnapshot::empty("b"));
    }
}
