#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use noteboard::{Board, BoardSession, ConnectionStyle, HistoryConfig, NoteId, Port};

#[derive(Debug, Arbitrary)]
enum Op {
    Create { x: i16, y: i16 },
    Move { note: u8, dx: i16, dy: i16 },
    Text { note: u8, text: String },
    Connect { a: u8, b: u8, pa: u8, pb: u8 },
    DestroyNote { note: u8 },
    DestroyConnection { conn: u8 },
    End,
    Undo,
    Redo,
}

fn port(index: u8) -> Port {
    Port::ALL[usize::from(index) % Port::ALL.len()]
}

fn pick<T: Copy>(items: &[T], index: u8) -> Option<T> {
    (!items.is_empty()).then(|| items[usize::from(index) % items.len()])
}

fuzz_target!(|ops: Vec<Op>| {
    let mut session = BoardSession::from_board(Board::new("fuzz"), HistoryConfig::unlimited());
    for op in ops.iter().take(256) {
        match op {
            Op::End => session.end(),
            // Undo and redo either succeed or leave everything untouched.
            Op::Undo => {
                let _ = session.undo();
            }
            Op::Redo => {
                let _ = session.redo();
            }
            op => session.edit(|board| {
                let notes: Vec<NoteId> = board.notes().map(|n| n.id()).collect();
                let conns: Vec<_> = board.connections().map(|c| c.id()).collect();
                let _ = match op {
                    Op::Create { x, y } => board
                        .create_note(f64::from(*x), f64::from(*y), 0.0, "", None)
                        .and_then(|id| board.attach_note(id)),
                    Op::Move { note, dx, dy } => pick(&notes, *note).map_or(Ok(()), |id| {
                        board.move_note(id, f64::from(*dx), f64::from(*dy))
                    }),
                    Op::Text { note, text } => pick(&notes, *note)
                        .map_or(Ok(()), |id| board.set_note_text(id, text.as_str())),
                    Op::Connect { a, b, pa, pb } => match (pick(&notes, *a), pick(&notes, *b)) {
                        (Some(a), Some(b)) => board
                            .create_connection(a, port(*pa), b, port(*pb), ConnectionStyle::default())
                            .and_then(|id| board.attach_connection(id)),
                        _ => Ok(()),
                    },
                    Op::DestroyNote { note } => {
                        pick(&notes, *note).map_or(Ok(()), |id| board.destroy_note(id))
                    }
                    Op::DestroyConnection { conn } => {
                        pick(&conns, *conn).map_or(Ok(()), |id| board.destroy_connection(id))
                    }
                    Op::End | Op::Undo | Op::Redo => Ok(()),
                };
            }),
        }
    }

    // Every undo step replays cleanly back to the empty board.
    while session.can_undo() {
        session.undo().expect("recorded history must replay");
    }
    assert_eq!(session.board().note_count(), 0);
    assert!(session.take_conflicts().is_empty());
});
