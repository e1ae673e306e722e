//! 基本型
//!
//! - `Color`: 手番（紅/黒）
//! - `PieceKind` / `Piece`: 駒種と駒
//! - `Square`: 10×9 盤の升
//! - `Move`: 指し手と UCI 座標表記

mod color;
mod moves;
mod piece;
mod square;

pub use color::Color;
pub use moves::{square_to_uci, CoordError, Move};
pub use piece::{Piece, PieceKind};
pub use square::Square;
