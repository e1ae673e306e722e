//! Controller driven by a real engine session running a scripted engine
#![cfg(unix)]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rxiangqi_assist::{ControllerEvent, GameController, GameSettings, SearchPurpose};
use rxiangqi_core::{pseudo_legal_moves, validate_position, Board, Color, Position};
use rxiangqi_uci::{EngineHandle, EngineSession, EventReceiver, SessionConfig, UciCommand};
use tempfile::TempDir;

const T_EVENT: Duration = Duration::from_secs(5);

/// Red king on d0 in check from the rook on i0; d1 is covered by the rook on i1
/// and e0 faces the black king.
const RED_MATED_FEN: &str = "4k4/9/9/9/9/9/9/9/8r/3K4r w";

/// Replies h7e7 to timed searches and a dummy move to depth-limited ones.
const REPLYING_ENGINE: &str = r#"
while IFS= read -r line; do
  case "$line" in
    uci) echo "id name FakeFish"; echo "uciok" ;;
    isready) echo "readyok" ;;
    "go depth"*) echo "bestmove a0a1" ;;
    "go movetime"*) echo "info depth 3 score cp 8 pv h7e7 h0g2"; echo "bestmove h7e7" ;;
    quit) exit 0 ;;
    *) ;;
  esac
done
"#;

/// Reports no legal move for every search.
const MATED_ENGINE: &str = r#"
while IFS= read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
    go*) echo "bestmove (none)" ;;
    quit) exit 0 ;;
    *) ;;
  esac
done
"#;

fn start_session(script: &str) -> (TempDir, EngineHandle, EventReceiver) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("engine.sh");
    std::fs::write(&path, script).expect("Failed to write fake engine");
    let config = SessionConfig {
        path: PathBuf::from("/bin/sh"),
        args: vec![path.to_string_lossy().into_owned()],
        working_dir: Some(dir.path().to_path_buf()),
        restart_delay: Duration::from_millis(100),
        quit_grace: Duration::from_millis(200),
    };
    let (handle, events) = EngineSession::spawn(config);
    handle.start().expect("session closed");
    (dir, handle, events)
}

fn settings(ai: Option<Color>) -> GameSettings {
    GameSettings { ai_color: ai, movetime_ms: 50, ..GameSettings::default() }
}

/// Feeds engine events into the controller until `pred` matches one of its outputs
async fn pump(
    controller: &mut GameController<EngineHandle>,
    events: &mut EventReceiver,
    pred: impl Fn(&ControllerEvent) -> bool,
) -> ControllerEvent {
    loop {
        let event = match tokio::time::timeout(T_EVENT, events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => panic!("event channel closed"),
            Err(_) => panic!("timed out waiting for engine event"),
        };
        for out in controller.handle_event(event, Instant::now()) {
            println!("<<< {out:?}");
            if pred(&out) {
                return out;
            }
        }
    }
}

#[tokio::test]
async fn test_engine_answers_user_move() {
    let (_dir, handle, mut events) = start_session(REPLYING_ENGINE);
    let mut controller =
        GameController::new(handle.clone(), settings(Some(Color::Black)), Position::startpos())
            .with_setup_commands(vec![UciCommand::set_option("Threads", "1")]);

    pump(&mut controller, &mut events, |e| matches!(e, ControllerEvent::EngineReady)).await;
    assert_eq!(controller.pending().map(|p| p.purpose), Some(SearchPurpose::MateCheck));

    controller.user_move_str("h2e2", Instant::now()).unwrap();
    let reply = pump(&mut controller, &mut events, |e| {
        matches!(e, ControllerEvent::MoveApplied { by_engine: true, .. })
    })
    .await;
    match reply {
        ControllerEvent::MoveApplied { entry, .. } => assert_eq!(entry.notation, "炮８平５"),
        _ => unreachable!(),
    }
    assert_eq!(controller.history().len(), 2);
    assert_eq!(controller.position().side_to_move, Color::Red);
    assert!(controller.last_info().is_some());

    handle.shutdown().unwrap();
}

/// True if `color`'s king can be captured by the opponent on `board`
fn king_attacked(board: &Board, color: Color) -> bool {
    let Some(king) = board.king_square(color) else { return true };
    pseudo_legal_moves(board, !color).iter().any(|mv| mv.to == king)
}

#[test]
fn test_mated_position_has_no_escape() {
    let position = Position::from_fen(RED_MATED_FEN).unwrap();
    assert_eq!(validate_position(&position), Ok(()));
    assert_eq!(position.side_to_move, Color::Red);
    assert!(king_attacked(&position.board, Color::Red));

    let moves = pseudo_legal_moves(&position.board, Color::Red);
    assert!(!moves.is_empty());
    for mv in moves {
        assert!(king_attacked(&position.board.with_move(mv), Color::Red), "{mv:?} escapes");
    }
}

#[tokio::test]
async fn test_no_legal_move_ends_game() {
    let (_dir, handle, mut events) = start_session(MATED_ENGINE);
    let start = Position::from_fen(RED_MATED_FEN).unwrap();
    let mut controller = GameController::new(handle.clone(), settings(None), start);

    let over =
        pump(&mut controller, &mut events, |e| matches!(e, ControllerEvent::GameOver { .. })).await;
    assert_eq!(over, ControllerEvent::GameOver { loser: Color::Red });
    assert_eq!(controller.loser(), Some(Color::Red));
    assert_eq!(controller.position(), &start);
    assert!(controller.user_move_str("d0d1", Instant::now()).is_err());

    handle.shutdown().unwrap();
}
