//! # rxiangqi-assist
//!
//! 象棋の対局補助。ルールエンジン（`rxiangqi-core`）と UCI エンジンセッション
//! （`rxiangqi-uci`）をつなぐ対局コントローラと、端末フロントエンド `rxiangqi`。
//!
//! - `controller`: 正本の局面・棋譜と探索依頼の管理
//! - `config`: TOML 設定
//! - `recognize`: 盤面認識器との境界
//! - `command`: 対話コマンドの解析

pub mod command;
pub mod config;
pub mod controller;
pub mod recognize;

pub use command::{parse_command, Command, CommandError};
pub use config::{AiSide, AssistConfig, ConfigError, EngineSection, GameSection};
pub use controller::{
    ControllerEvent, EngineLink, GameController, GameError, GameSettings, HistoryEntry,
    PendingSearch, SearchPurpose,
};
pub use recognize::{normalize, BoardLayout, BoardRecognizer, Recognition, RecognizeError, TextRecognizer};
