//! # rxiangqi-core
//!
//! シャンチー（中国象棋）の盤面表現・FEN・合法性判定・中国式記譜。
//! I/O は持たない純粋なライブラリ。
//!
//! ## モジュール構成
//!
//! - `types`: 基本型（Color, PieceKind, Piece, Square, Move）
//! - `board`: 10×9 の盤面
//! - `fen`: 局面（Position）と FEN の解析・生成
//! - `rules`: 指し手・盤面の合法性判定、将帅対面の検出
//! - `notation`: 中国式棋譜表記（炮二平五 など）
//!

pub mod types;

pub mod board;
pub mod fen;

pub mod rules;

pub mod notation;

pub use board::Board;
pub use fen::{generate_position, parse_position, FenError, Position, FEN_STARTPOS};
pub use notation::notate;
pub use rules::{
    kings_facing, pseudo_legal_moves, validate_move, validate_position, MoveViolation,
    PositionViolation,
};
pub use types::{Color, CoordError, Move, Piece, PieceKind, Square};
