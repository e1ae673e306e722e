//! UCI プロトコルのメッセージ
//!
//! 送信コマンドは `Display` で 1 行に整形し、受信行は `parse_line` で分類する。
//! 扱うのは対局に使うコマンドだけで、それ以外のエンジン出力は読み捨てる。

use std::fmt;
use std::time::Duration;

/// `go` の探索制限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoLimit {
    /// 思考時間（ミリ秒）
    MoveTime(u64),
    /// 探索深さ。詰み確認は深さ 1
    Depth(u32),
}

impl GoLimit {
    /// エンジンに与えた持ち時間。深さ指定なら `None`
    pub fn budget(&self) -> Option<Duration> {
        match self {
            GoLimit::MoveTime(ms) => Some(Duration::from_millis(*ms)),
            GoLimit::Depth(_) => None,
        }
    }
}

/// エンジンへ送るコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciCommand {
    Uci,
    IsReady,
    UciNewGame,
    /// `position fen <FEN>`
    Position { fen: String },
    Go(GoLimit),
    Stop,
    SetOption { name: String, value: String },
    Quit,
}

impl UciCommand {
    pub fn position(fen: impl Into<String>) -> Self {
        UciCommand::Position { fen: fen.into() }
    }

    pub fn set_option(name: impl Into<String>, value: impl Into<String>) -> Self {
        UciCommand::SetOption { name: name.into(), value: value.into() }
    }
}

impl fmt::Display for UciCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UciCommand::Uci => write!(f, "uci"),
            UciCommand::IsReady => write!(f, "isready"),
            UciCommand::UciNewGame => write!(f, "ucinewgame"),
            UciCommand::Position { fen } => write!(f, "position fen {fen}"),
            UciCommand::Go(GoLimit::MoveTime(ms)) => write!(f, "go movetime {ms}"),
            UciCommand::Go(GoLimit::Depth(depth)) => write!(f, "go depth {depth}"),
            UciCommand::Stop => write!(f, "stop"),
            UciCommand::SetOption { name, value } => {
                write!(f, "setoption name {name} value {value}")
            }
            UciCommand::Quit => write!(f, "quit"),
        }
    }
}

/// `info` 行の評価値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// 手番側から見たセンチポーン
    Cp(i32),
    /// N 手詰め。正なら手番側が詰ませる
    Mate(i32),
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Cp(cp) => write!(f, "cp {cp}"),
            Score::Mate(n) => write!(f, "mate {n}"),
        }
    }
}

/// `info` 行から読み取った探索情報
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineInfo {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    /// 経過時間（ミリ秒）
    pub time: Option<u64>,
    pub score: Option<Score>,
    pub multipv: Option<u32>,
    /// 読み筋（UCI 表記）
    pub pv: Vec<String>,
}

/// `bestmove` の指し手
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestMove {
    Move(String),
    /// `(none)` または `0000`。手番側に指せる手がない
    None,
}

impl BestMove {
    pub fn as_move(&self) -> Option<&str> {
        match self {
            BestMove::Move(mv) => Some(mv),
            BestMove::None => None,
        }
    }
}

/// セッションが反応する行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMessage {
    UciOk,
    ReadyOk,
    Info(EngineInfo),
    BestMove { best: BestMove, ponder: Option<String> },
}

/// 出力 1 行を分類する
///
/// `id` や `option`、`info string`、空行など読み捨てる行は `None`。
pub fn parse_line(line: &str) -> Option<EngineMessage> {
    let mut tokens = line.split_whitespace();
    match tokens.next()? {
        "uciok" => Some(EngineMessage::UciOk),
        "readyok" => Some(EngineMessage::ReadyOk),
        "info" => parse_info(tokens).map(EngineMessage::Info),
        "bestmove" => Some(parse_bestmove(tokens)),
        _ => None,
    }
}

fn parse_bestmove<'a>(mut tokens: impl Iterator<Item = &'a str>) -> EngineMessage {
    let best = match tokens.next() {
        None | Some("(none)") | Some("0000") => BestMove::None,
        Some(mv) => BestMove::Move(mv.to_string()),
    };
    let ponder = match (tokens.next(), tokens.next()) {
        (Some("ponder"), Some(mv)) if mv != "(none)" && mv != "0000" => Some(mv.to_string()),
        _ => None,
    };
    EngineMessage::BestMove { best, ponder }
}

fn parse_info<'a>(mut tokens: impl Iterator<Item = &'a str>) -> Option<EngineInfo> {
    let mut info = EngineInfo::default();

    while let Some(key) = tokens.next() {
        match key {
            "string" => return None,
            "depth" => info.depth = tokens.next().and_then(|v| v.parse().ok()),
            "seldepth" => info.seldepth = tokens.next().and_then(|v| v.parse().ok()),
            "nodes" => info.nodes = tokens.next().and_then(|v| v.parse().ok()),
            "nps" => info.nps = tokens.next().and_then(|v| v.parse().ok()),
            "time" => info.time = tokens.next().and_then(|v| v.parse().ok()),
            "multipv" => info.multipv = tokens.next().and_then(|v| v.parse().ok()),
            "score" => {
                let kind = tokens.next();
                let value = tokens.next().and_then(|v| v.parse::<i32>().ok());
                info.score = match (kind, value) {
                    (Some("cp"), Some(v)) => Some(Score::Cp(v)),
                    (Some("mate"), Some(v)) => Some(Score::Mate(v)),
                    _ => info.score,
                };
            }
            // pv は行末まで
            "pv" => {
                info.pv = tokens.by_ref().map(str::to_string).collect();
            }
            // 値を 1 つ取るが保持しないキー
            "currmove" | "currmovenumber" | "hashfull" | "tbhits" | "cpuload" => {
                tokens.next();
            }
            _ => {}
        }
    }
    Some(info)
}
