#![forbid(unsafe_code)]

//! End-to-end undo/redo scenarios driven through a [`BoardSession`].

use std::sync::{Arc, Mutex};

use noteboard::{
    BoardError, BoardSession, ConnectionStyle, HistoryError, ImageId, NoteAction, NoteId,
    NotePatch, Port,
};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

fn session() -> BoardSession {
    BoardSession::new("board")
}

/// Create an attached, empty note at the origin.
fn place(session: &mut BoardSession, id: u32) -> NoteId {
    let id = NoteId(id);
    session
        .edit(|b| {
            b.new_note(id, 0.0, 0.0, 0.0, "", None)?;
            b.attach_note(id)
        })
        .unwrap();
    id
}

fn position(session: &BoardSession, id: NoteId) -> (f64, f64) {
    let note = session.board().note(id).unwrap();
    (note.x(), note.y())
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn create_undo_redo() {
    let mut s = session();
    let id = place(&mut s, 123);
    assert!(s.can_undo());

    s.undo().unwrap();
    assert_eq!(s.board().note_count(), 0);
    assert!(!s.can_undo());
    assert!(s.can_redo());

    s.redo().unwrap();
    assert!(s.board().note(id).is_some());
    assert!(s.can_undo());
    assert!(!s.can_redo());
}

#[test]
fn move_in_separate_transaction() {
    let mut s = session();
    let id = place(&mut s, 1);
    s.end();
    s.edit(|b| b.move_note(id, 100.0, 200.0)).unwrap();
    s.end();

    s.undo().unwrap();
    assert_eq!(position(&s, id), (0.0, 0.0));
    assert!(s.can_undo());
    assert!(s.can_redo());

    s.redo().unwrap();
    assert_eq!(position(&s, id), (100.0, 200.0));
}

#[test]
fn new_transaction_drops_redo_branch() {
    let mut s = session();
    let id = place(&mut s, 1);
    s.end();
    s.edit(|b| b.move_note(id, 100.0, 200.0)).unwrap();
    s.end();
    s.undo().unwrap();
    assert!(s.can_redo());

    s.edit(|b| b.move_note(id, 300.0, 400.0)).unwrap();
    assert!(!s.can_redo());
    assert_eq!(s.redo(), Err(HistoryError::NothingToRedo));
    assert_eq!(position(&s, id), (300.0, 400.0));

    s.undo().unwrap();
    assert_eq!(position(&s, id), (0.0, 0.0));
    s.undo().unwrap();
    assert_eq!(s.board().note_count(), 0);
    assert!(!s.can_undo());
}

#[test]
fn named_transactions_group_changes() {
    let mut s = session();
    let id = place(&mut s, 1);
    s.end();

    s.begin("drag");
    for _ in 0..10 {
        s.edit(|b| b.move_note(id, 1.0, 1.0)).unwrap();
    }
    s.begin("drag");
    s.edit(|b| b.move_note(id, 1.0, 1.0)).unwrap();
    s.end();

    assert_eq!(s.history().len(), 2);
    assert_eq!(s.history().undo_name(), Some("drag"));
    s.undo().unwrap();
    assert_eq!(position(&s, id), (0.0, 0.0));
}

#[test]
fn destroying_a_note_restores_its_connections() {
    let mut s = session();
    let (a, b, c) = (place(&mut s, 1), place(&mut s, 2), place(&mut s, 3));
    s.edit(|board| {
        board.create_connection(a, Port::Right, b, Port::Left, ConnectionStyle::default())?;
        board.create_connection(c, Port::Top, b, Port::Bottom, ConnectionStyle::default())
    })
    .unwrap();
    s.end();
    let before = s.board().export();

    s.edit(|board| board.destroy_note(b)).unwrap();
    s.end();
    assert_eq!(s.board().connection_count(), 0);

    s.undo().unwrap();
    assert_eq!(s.board().export(), before);
    assert!(s.board().is_connected(a, b).unwrap());
    assert!(s.board().is_connected(b, c).unwrap());

    s.redo().unwrap();
    assert_eq!(s.board().note_count(), 2);
    assert_eq!(s.board().connection_count(), 0);
}

#[test]
fn duplicate_connection_leaves_history_untouched() {
    let mut s = session();
    let (a, b) = (place(&mut s, 1), place(&mut s, 2));
    s.edit(|board| {
        board.create_connection(a, Port::Left, b, Port::Right, ConnectionStyle::default())
    })
    .unwrap();
    s.end();
    let depth = s.history().len();

    let err = s
        .edit(|board| {
            board.create_connection(b, Port::Right, a, Port::Left, ConnectionStyle::default())
        })
        .unwrap_err();
    assert_eq!(err, BoardError::AlreadyConnected { a, b });
    assert_eq!(s.history().len(), depth);
    assert!(!s.history().is_open());
}

// ============================================================================
// Inverse law
// ============================================================================

#[test]
fn undo_then_redo_round_trips_a_mixed_transaction() {
    let mut s = session();
    let (a, b) = (place(&mut s, 10), place(&mut s, 20));
    s.edit(|board| {
        board.create_connection(a, Port::Right, b, Port::Left, ConnectionStyle::default())
    })
    .unwrap();
    s.end();
    let before = s.board().export();

    s.begin("mixed");
    s.edit(|board| {
        board.set_note_text(a, "renamed")?;
        board.set_note_width(b, 240.0)?;
        let conn = board.connections().next().map(|c| c.id()).unwrap();
        board.set_connection_size(conn, 2.0)?;
        board.set_connection_dash(conn, noteboard::DashPattern::new([4.0, 2.0]))?;
        let c = board.create_note(50.0, 50.0, 100.0, "new", None)?;
        board.attach_note(c)?;
        board.create_connection(c, Port::Top, a, Port::Bottom, ConnectionStyle::default())?;
        board.destroy_note(b)
    })
    .unwrap();
    s.end();
    let after = s.board().export();
    assert_ne!(before, after);

    s.undo().unwrap();
    assert_eq!(s.board().export(), before);
    s.redo().unwrap();
    assert_eq!(s.board().export(), after);
}

// ============================================================================
// Pending changes
// ============================================================================

#[test]
fn dirty_state_follows_pending_changes() {
    let mut s = session();
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&transitions);
    let _sub = s.on_dirty_change(move |dirty| sink.lock().unwrap().push(dirty));

    assert!(!s.pending().is_dirty());
    let id = place(&mut s, 1);
    s.edit(|b| b.move_note(id, 5.0, 5.0)).unwrap();
    s.edit(|b| b.set_note_text(id, "x")).unwrap();
    assert!(s.pending().is_dirty());

    let delta = s.take_delta().unwrap();
    assert_eq!(delta.note.len(), 1);
    assert_eq!(*transitions.lock().unwrap(), vec![true, false]);
}

#[test]
fn destroyed_image_clears_note_and_records_edit() {
    let mut s = session();
    let image_id = ImageId::new(42).unwrap();
    let image = s.add_image(image_id, "img/42.png", "cat");
    let id = NoteId(7);
    s.edit(|b| {
        b.new_note(id, 0.0, 0.0, 0.0, "", Some(&image))?;
        b.attach_note(id)
    })
    .unwrap();
    drop(image);
    s.end();
    s.take_delta();

    s.destroy_image(image_id);
    assert_eq!(s.board().note(id).unwrap().image_id(), None);
    let expected = NoteAction::Edit {
        id,
        patch: NotePatch {
            image: Some(None),
            ..NotePatch::default()
        },
    };
    assert_eq!(s.pending().note(&id), Some(&expected));
    assert_eq!(
        s.history().entries().last().unwrap().forward().note(&id),
        Some(&expected)
    );
}

#[test]
fn destroyed_image_is_cleared_while_still_held() {
    let mut s = session();
    let image_id = ImageId::new(42).unwrap();
    let image = s.add_image(image_id, "img/42.png", "cat");
    let id = NoteId(7);
    s.edit(|b| {
        b.new_note(id, 0.0, 0.0, 0.0, "", Some(&image))?;
        b.attach_note(id)
    })
    .unwrap();
    s.end();
    let held = s.board().note(id).unwrap().image().unwrap();

    assert!(s.destroy_image(image_id));
    assert_eq!(s.board().note(id).unwrap().image_id(), None);
    assert_eq!(held.id, image.id);

    s.undo().unwrap();
    assert_eq!(s.board().note(id).unwrap().image_id(), None);
    assert_eq!(s.board().note_count(), 1);
}

#[test]
fn history_limit_evicts_oldest() {
    let mut s = session();
    let id = place(&mut s, 1);
    s.end();
    for i in 0..60 {
        s.begin(&format!("move {i}"));
        s.edit(|b| b.move_note(id, 1.0, 0.0)).unwrap();
    }
    s.end();
    assert_eq!(s.history().len(), 50);
    assert_eq!(s.history().entries().next().unwrap().name(), "move 10");

    s.set_history_limit(5);
    assert_eq!(s.history().len(), 5);
    while s.can_undo() {
        s.undo().unwrap();
    }
    assert_eq!(position(&s, id), (55.0, 0.0));
}

// ============================================================================
// Logging
// ============================================================================

#[derive(Debug, Clone)]
struct CapturedEvent {
    level: Level,
    target: String,
}

struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S> tracing_subscriber::Layer<S> for EventCapture
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let meta = event.metadata();
        self.events.lock().unwrap().push(CapturedEvent {
            level: *meta.level(),
            target: meta.target().to_string(),
        });
    }
}

#[test]
fn rejected_undo_is_logged() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(EventCapture {
        events: Arc::clone(&events),
    });

    tracing::subscriber::with_default(subscriber, || {
        let mut s = session();
        assert_eq!(s.undo(), Err(HistoryError::NothingToUndo));
        assert_eq!(s.redo(), Err(HistoryError::NothingToRedo));
    });

    let warnings = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.level == Level::WARN && e.target == "noteboard.history")
        .count();
    assert_eq!(warnings, 2);
}
