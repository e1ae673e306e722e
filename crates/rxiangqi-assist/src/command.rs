//! 対話コマンドの解析
//!
//! 1 行 1 コマンド。UCI 表記の指し手（`h2e2`）はそのまま着手として扱う。

use rxiangqi_core::{CoordError, Move};

/// 対話コマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Move(Move),
    Undo,
    Hint,
    /// 局面を FEN で設定する
    Fen(String),
    /// 認識器の出力（JSON または `<FEN> [layout]`）を取り込む
    Recognize(String),
    Show,
    History { json: bool },
    New,
    Quit,
    Help,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
    #[error(transparent)]
    Move(#[from] CoordError),
    #[error("{0}")]
    Invalid(String),
}

pub const HELP: &str = "\
commands:
  <move>            play a move in UCI notation (e.g. h2e2)
  move <move>       same as above
  undo              take back the last move (and the engine reply)
  hint              ask the engine for a suggestion
  fen <FEN>         start from the given position
  recognize <text>  load a recognizer result (JSON or '<FEN> [red_top]')
  show              print the board
  history [--json]  print the move list
  new               start a new game
  quit              exit";

/// 1 行を解析する
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match head {
        "" => Err(CommandError::Empty),
        "move" | "m" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("move"));
            }
            Ok(Command::Move(Move::from_uci(rest)?))
        }
        "undo" | "u" => Ok(Command::Undo),
        "hint" => Ok(Command::Hint),
        "fen" | "position" => {
            let fen = rest.strip_prefix("fen ").unwrap_or(rest).trim();
            if fen.is_empty() {
                return Err(CommandError::MissingArgument("fen"));
            }
            Ok(Command::Fen(fen.to_string()))
        }
        "recognize" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument("recognize"));
            }
            Ok(Command::Recognize(rest.to_string()))
        }
        "show" | "board" | "d" => Ok(Command::Show),
        "history" => match rest {
            "" => Ok(Command::History { json: false }),
            "--json" | "json" => Ok(Command::History { json: true }),
            other => Err(CommandError::Invalid(format!("unknown history option '{other}'"))),
        },
        "new" => Ok(Command::New),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        "help" | "?" => Ok(Command::Help),
        // 指し手だけの行
        other if other.len() == 4 && rest.is_empty() => match Move::from_uci(other) {
            Ok(mv) => Ok(Command::Move(mv)),
            Err(_) => Err(CommandError::Unknown(other.to_string())),
        },
        other => Err(CommandError::Unknown(other.to_string())),
    }
}
