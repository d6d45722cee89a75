#![forbid(unsafe_code)]

//! Upload and reload of board deltas through the JSON wire format.

use noteboard::{
    BoardError, BoardSession, BoardStore, ConnectionStyle, DashPattern, NoteId, Port, RawSnapshot,
    StoreError, WireError,
};
use serde_json::json;

fn connected_pair(session: &mut BoardSession) -> (NoteId, NoteId) {
    let (a, b) = (NoteId(1), NoteId(2));
    session
        .edit(|board| {
            board.new_note(a, 0.0, 0.0, 100.0, "first", None)?;
            board.new_note(b, 200.0, 0.0, 100.0, "second", None)?;
            board.attach_note(a)?;
            board.attach_note(b)?;
            let conn = board.create_connection(
                b,
                Port::Left,
                a,
                Port::Right,
                ConnectionStyle::default(),
            )?;
            board.attach_connection(conn)
        })
        .unwrap();
    (a, b)
}

#[test]
fn upload_encodes_notes_before_connections() {
    let mut session = BoardSession::new("board");
    connected_pair(&mut session);

    let json = session.take_delta().unwrap().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        value,
        json!({
            "id": "board",
            "note": [
                {"type": 0, "id": 1, "x": 0.0, "y": 0.0, "width": 100.0, "text": "first", "img": 0},
                {"type": 0, "id": 2, "x": 200.0, "y": 0.0, "width": 100.0, "text": "second", "img": 0}
            ],
            "conn": [
                {"type": 0, "a": 1, "b": 2, "pa": 2, "pb": 0, "color": "ff0000", "size": 5.0, "dash": ""}
            ]
        })
    );
}

#[test]
fn uploads_keep_store_in_step_with_board() {
    let mut session = BoardSession::new("board");
    let mut store = BoardStore::new("board");
    let (a, b) = connected_pair(&mut session);

    let json = session.take_delta().unwrap().to_json().unwrap();
    store.apply_delta(&RawSnapshot::from_json(&json).unwrap()).unwrap();

    session.edit(|board| board.move_note(a, 10.0, 10.0)).unwrap();
    session.edit(|board| board.destroy_note(b)).unwrap();
    let json = session.take_delta().unwrap().to_json().unwrap();
    store.apply_delta(&RawSnapshot::from_json(&json).unwrap()).unwrap();

    assert_eq!(store.export(), session.board().export());
    assert_eq!(store.note(a).unwrap().x, 10.0);
    assert_eq!(store.connection_count(), 0);
}

#[test]
fn reload_from_store_is_clean() {
    let mut session = BoardSession::new("board");
    let mut store = BoardStore::new("board");
    let (a, b) = connected_pair(&mut session);
    store.apply_delta(&session.take_delta().unwrap()).unwrap();

    let mut reloaded = BoardSession::new("board");
    reloaded.load(store.export()).unwrap();
    assert_eq!(reloaded.board().export(), session.board().export());
    assert!(reloaded.board().is_connected(a, b).unwrap());
    assert!(!reloaded.pending().is_dirty());
    assert!(!reloaded.can_undo());

    // Loaded entities are attached: later edits are reported on their own.
    reloaded.edit(|board| board.set_note_text(a, "changed")).unwrap();
    let delta = reloaded.take_delta().unwrap();
    assert_eq!(
        serde_json::to_value(&delta.note).unwrap(),
        json!([{"type": 1, "id": 1, "text": "changed"}])
    );
}

#[test]
fn undone_upload_is_reverted_by_next_delta() {
    let mut session = BoardSession::new("board");
    let mut store = BoardStore::new("board");
    connected_pair(&mut session);
    store.apply_delta(&session.take_delta().unwrap()).unwrap();

    session.undo().unwrap();
    store.apply_delta(&session.take_delta().unwrap()).unwrap();
    assert_eq!(store.note_count(), 0);
    assert_eq!(store.connection_count(), 0);

    session.redo().unwrap();
    store.apply_delta(&session.take_delta().unwrap()).unwrap();
    assert_eq!(store.export(), session.board().export());
}

#[test]
fn dangling_batch_is_rejected_whole() {
    let mut store = BoardStore::new("board");
    let delta = RawSnapshot::from_json(
        r#"{
            "id": "board",
            "note": [{"type": 0, "id": 1, "x": 0, "y": 0, "text": "", "img": 0}],
            "conn": [{"type": 0, "a": 1, "b": 9, "pa": 0, "pb": 0, "color": "00ff00", "size": 2}]
        }"#,
    )
    .unwrap();

    assert!(matches!(
        store.apply_delta(&delta),
        Err(StoreError::DanglingConnection(_))
    ));
    assert_eq!(store.note_count(), 0);
}

#[test]
fn malformed_uploads_are_rejected() {
    let descending = r#"{"id": "b", "conn": [{"type": 2, "a": 5, "b": 3, "pa": 0, "pb": 0}]}"#;
    assert_eq!(
        RawSnapshot::from_json(descending),
        Err(WireError::NonCanonicalConnection { a: 5, b: 3 })
    );

    let unknown = r#"{"id": "b", "note": [{"type": 7, "id": 1}]}"#;
    assert_eq!(RawSnapshot::from_json(unknown), Err(WireError::UnknownType(7)));

    let bad_color = r#"{"id": "b", "conn": [{"type": 1, "a": 1, "b": 2, "pa": 0, "pb": 0, "color": "red"}]}"#;
    assert!(matches!(
        RawSnapshot::from_json(bad_color),
        Err(WireError::InvalidColor(_))
    ));
}

#[test]
fn rejected_stroke_keeps_delta_decodable() {
    let mut session = BoardSession::new("board");
    let (a, b) = connected_pair(&mut session);
    let conn = session.board().connections().next().map(|c| c.id()).unwrap();

    let err = session
        .edit(|board| board.set_connection_size(conn, 0.0))
        .unwrap_err();
    assert!(matches!(err, BoardError::InvalidSize(_)));
    let err = session
        .edit(|board| board.set_connection_dash(conn, DashPattern::new([-2.0])))
        .unwrap_err();
    assert!(matches!(err, BoardError::InvalidDash(_)));
    assert_eq!(
        session.edit(|board| board.new_note(NoteId(0), 0.0, 0.0, 0.0, "", None)),
        Err(BoardError::InvalidNoteId(NoteId(0)))
    );

    let json = session.take_delta().unwrap().to_json().unwrap();
    let mut store = BoardStore::new("board");
    store.apply_delta(&RawSnapshot::from_json(&json).unwrap()).unwrap();
    assert_eq!(store.connection(&conn).unwrap().size, 5.0);
    assert!(session.board().is_connected(a, b).unwrap());

    let history = serde_json::to_string(&session.history_raw()).unwrap();
    let mut restored = BoardSession::new("board");
    restored.restore_history(serde_json::from_str(&history).unwrap());
    assert_eq!(restored.history().len(), session.history().len());
}
