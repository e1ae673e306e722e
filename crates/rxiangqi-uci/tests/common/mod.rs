//! Fake engine helpers for session tests

#![allow(dead_code)] // Not every test file uses every helper

use std::path::PathBuf;
use std::time::Duration;

use rxiangqi_uci::{EngineEvent, EventReceiver, SessionConfig};
use tempfile::TempDir;

pub const T_EVENT: Duration = Duration::from_secs(5); // Generous for CI
pub const T_QUIET: Duration = Duration::from_millis(400); // Window that must stay silent

/// Scripted UCI engine: answers the handshake, plays h2e2 for any search,
/// reports no move for `go depth 1`, and exits with code 3 on `go depth 99`.
pub const FAKE_ENGINE: &str = r#"
while IFS= read -r line; do
  case "$line" in
    uci) echo "id name FakeFish"; echo "option name Threads type spin default 1 min 1 max 8"; echo "uciok" ;;
    isready) echo "readyok" ;;
    "go depth 99") echo "info depth 1 score cp 0 pv a0a1"; exit 3 ;;
    "go depth 1") echo "info string depth-1 check"; echo "bestmove (none)" ;;
    go*) echo "info depth 1 seldepth 2 score cp 12 nodes 42 pv h2e2 h9g7"; echo "bestmove h2e2 ponder h9g7" ;;
    quit) exit 0 ;;
    *) ;;
  esac
done
"#;

/// Same as `FAKE_ENGINE` but ignores `quit`, so only the grace-period kill ends it.
pub const STUBBORN_ENGINE: &str = r#"
while IFS= read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
    *) ;;
  esac
done
"#;

/// Writes `script` into a temp dir and returns a config that runs it with /bin/sh.
///
/// The script is run as an argument to /bin/sh rather than executed directly,
/// so parallel tests never exec a file another thread still holds open.
pub fn fake_engine_config(script: &str) -> (TempDir, SessionConfig) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path: PathBuf = dir.path().join("fake_engine.sh");
    std::fs::write(&path, script).expect("Failed to write fake engine");
    let config = SessionConfig {
        path: PathBuf::from("/bin/sh"),
        args: vec![path.to_string_lossy().into_owned()],
        working_dir: Some(dir.path().to_path_buf()),
        restart_delay: Duration::from_millis(100),
        quit_grace: Duration::from_millis(200),
    };
    (dir, config)
}

/// Next event or panic after `T_EVENT`
pub async fn next_event(events: &mut EventReceiver) -> EngineEvent {
    match tokio::time::timeout(T_EVENT, events.recv()).await {
        Ok(Some(event)) => {
            println!("<<< {event:?}");
            event
        }
        Ok(None) => panic!("event channel closed"),
        Err(_) => panic!("timed out waiting for engine event"),
    }
}

/// Skips events until `pred` matches
pub async fn wait_for(
    events: &mut EventReceiver,
    pred: impl Fn(&EngineEvent) -> bool,
) -> EngineEvent {
    loop {
        let event = next_event(events).await;
        if pred(&event) {
            return event;
        }
    }
}

/// Waits for `Ready` and returns its pid
pub async fn wait_ready(events: &mut EventReceiver) -> u32 {
    match wait_for(events, |e| matches!(e, EngineEvent::Ready { .. })).await {
        EngineEvent::Ready { pid } => pid,
        _ => unreachable!(),
    }
}

/// Asserts that nothing arrives for `T_QUIET`
pub async fn assert_quiet(events: &mut EventReceiver) {
    if let Ok(event) = tokio::time::timeout(T_QUIET, events.recv()).await {
        panic!("expected no event, got {event:?}");
    }
}
