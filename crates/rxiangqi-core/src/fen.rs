//! 局面（Position）と FEN 形式の解析・出力
//!
//! 盤面部は 10 行を `/` で区切り、row 0（黒の最下段）から並べる。
//! 数字は連続する空き升、英字は駒（大文字 = 紅、小文字 = 黒）。
//! 続いて手番 `w`/`b`、残りのフィールドはエンジン互換のための固定値。

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::types::{Color, Move, Piece, Square};

/// 初期局面の FEN
pub const FEN_STARTPOS: &str = "rnbakabnr/9/1c5c1/p1p1p1p1p/9/9/P1P1P1P1P/1C5C1/9/RNBAKABNR w - - 0 1";

/// 手番以降に付加する固定フィールド
const FEN_TRAILER: &str = "- - 0 1";

/// FEN パースエラー
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    #[error("empty FEN")]
    Empty,
    #[error("expected 10 rows, got {0}")]
    RowCount(usize),
    #[error("row {row} describes {width} squares (expected 9)")]
    RowWidth { row: usize, width: usize },
    #[error("invalid piece character '{ch}' in row {row}")]
    Piece { row: usize, ch: char },
    #[error("invalid side to move '{0}' (expected 'w' or 'b')")]
    SideToMove(String),
}

/// 局面（盤面 + 手番）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub board: Board,
    pub side_to_move: Color,
}

impl Default for Position {
    fn default() -> Self {
        Self::startpos()
    }
}

impl Position {
    pub const fn new(board: Board, side_to_move: Color) -> Position {
        Position { board, side_to_move }
    }

    /// 初期局面
    pub fn startpos() -> Position {
        parse_position(FEN_STARTPOS).expect("FEN_STARTPOS is well-formed")
    }

    /// FEN 文字列から局面を作る
    pub fn from_fen(fen: &str) -> Result<Position, FenError> {
        parse_position(fen)
    }

    /// FEN 文字列を生成
    pub fn to_fen(&self) -> String {
        generate_position(&self.board, self.side_to_move)
    }

    /// 指し手を適用し、手番を入れ替えた局面を返す。合法性は見ない
    pub fn after_move(&self, mv: Move) -> Position {
        Position { board: self.board.with_move(mv), side_to_move: !self.side_to_move }
    }

    /// 180度回転した局面（手番はそのまま）
    pub fn rotated(&self) -> Position {
        Position { board: self.board.rotated(), side_to_move: self.side_to_move }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_fen())
    }
}

impl std::str::FromStr for Position {
    type Err = FenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_position(s)
    }
}

impl Serialize for Position {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_fen())
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_position(&s).map_err(serde::de::Error::custom)
    }
}

/// FEN 文字列を解析する
///
/// 手番フィールドは省略可能（省略時は紅番）。`r` も紅番として受け付ける。
pub fn parse_position(fen: &str) -> Result<Position, FenError> {
    let mut parts = fen.split_whitespace();
    let board_str = parts.next().ok_or(FenError::Empty)?;
    let board = parse_board(board_str)?;

    let side_to_move = match parts.next() {
        None | Some("w") | Some("r") => Color::Red,
        Some("b") => Color::Black,
        Some(other) => return Err(FenError::SideToMove(other.to_string())),
    };

    Ok(Position { board, side_to_move })
}

/// 盤面と手番から FEN 文字列を生成する
pub fn generate_position(board: &Board, side: Color) -> String {
    let mut result = String::with_capacity(96);

    for sq in Square::all() {
        if sq.col() == 0 && sq.row() > 0 {
            result.push('/');
        }
        // 空き升は直後に駒が来るか行末で数字にまとめる
        match board.piece_on(sq) {
            Some(pc) => {
                flush_empty(&mut result, board, sq);
                result.push(pc.fen_char());
            }
            None if sq.col() == Square::COLS - 1 => {
                flush_empty(&mut result, board, sq);
            }
            None => {}
        }
    }

    result.push(' ');
    result.push(side.fen_char());
    result.push(' ');
    result.push_str(FEN_TRAILER);
    result
}

/// `sq` の直前（`sq` が空き升かつ行末なら `sq` 自身も含む）にある空き升の連続数を書き出す
fn flush_empty(out: &mut String, board: &Board, sq: Square) {
    let end = if board.is_empty(sq) { sq.col() + 1 } else { sq.col() };
    let run = (0..end)
        .rev()
        .take_while(|&col| Square::new(sq.row(), col).is_some_and(|s| board.is_empty(s)))
        .count();
    if run > 0 {
        out.push_str(&run.to_string());
    }
}

fn parse_board(board_str: &str) -> Result<Board, FenError> {
    let rows: Vec<&str> = board_str.split('/').collect();
    if rows.len() != Square::ROWS as usize {
        return Err(FenError::RowCount(rows.len()));
    }

    let mut board = Board::empty();
    for (row_idx, row_str) in rows.iter().enumerate() {
        let mut width = 0usize;
        for c in row_str.chars() {
            if let Some(digit) = c.to_digit(10) {
                width += digit as usize;
            } else {
                let pc = Piece::from_fen_char(c).ok_or(FenError::Piece { row: row_idx, ch: c })?;
                if let Some(sq) = Square::new(row_idx as u8, width as u8) {
                    board.set(sq, Some(pc));
                }
                width += 1;
            }
            if width > Square::COLS as usize {
                return Err(FenError::RowWidth { row: row_idx, width });
            }
        }
        if width != Square::COLS as usize {
            return Err(FenError::RowWidth { row: row_idx, width });
        }
    }
    Ok(board)
}
