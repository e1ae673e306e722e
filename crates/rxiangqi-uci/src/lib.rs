//! # rxiangqi-uci
//!
//! UCI を話す外部エンジン（Pikafish 等）のプロセスを監視し、出力を構造化イベントに変換する。
//!
//! - `line_buffer`: stdout のバイト列を行に組み立てる
//! - `protocol`: 送信コマンドと受信行の解析
//! - `session`: プロセスのライフサイクル管理（起動・クラッシュ時の再起動・終了）

pub mod line_buffer;
pub mod protocol;
pub mod session;

pub use line_buffer::LineBuffer;
pub use protocol::{parse_line, BestMove, EngineInfo, EngineMessage, GoLimit, Score, UciCommand};
pub use session::{
    EngineEvent, EngineHandle, EngineSession, EventReceiver, RequestId, SessionConfig,
    SessionError, SessionState,
};
