//! 指し手（Move）と UCI 座標表記

use serde::{Deserialize, Serialize};

use super::Square;

/// UCI 指し手文字列の解析エラー
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordError {
    #[error("move must be 4 characters, got '{0}'")]
    Length(String),
    #[error("invalid file '{0}' (expected a-i)")]
    File(char),
    #[error("invalid rank '{0}' (expected 0-9)")]
    Rank(char),
}

/// 指し手（移動元 → 移動先）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    pub from: Square,
    pub to: Square,
}

impl Move {
    #[inline]
    pub const fn new(from: Square, to: Square) -> Move {
        Move { from, to }
    }

    /// UCI 形式（例: `h2e2`）に変換
    ///
    /// 列 0〜8 を `a`〜`i`、行を段 `9 - row` に写す（row 9 が紅側の 0 段）。
    pub fn to_uci(self) -> String {
        let mut s = String::with_capacity(4);
        push_square(&mut s, self.from);
        push_square(&mut s, self.to);
        s
    }

    /// UCI 形式の文字列から指し手へ。`to_uci` の逆変換
    pub fn from_uci(s: &str) -> Result<Move, CoordError> {
        let chars: Vec<char> = s.trim().chars().collect();
        if chars.len() != 4 {
            return Err(CoordError::Length(s.to_string()));
        }
        let from = parse_square(chars[0], chars[1])?;
        let to = parse_square(chars[2], chars[3])?;
        Ok(Move { from, to })
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_uci())
    }
}

impl std::str::FromStr for Move {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Move::from_uci(s)
    }
}

/// 升を UCI の筋・段 2 文字に変換
pub fn square_to_uci(sq: Square) -> String {
    let mut s = String::with_capacity(2);
    push_square(&mut s, sq);
    s
}

fn push_square(out: &mut String, sq: Square) {
    out.push((b'a' + sq.col()) as char);
    out.push((b'0' + (Square::ROWS - 1 - sq.row())) as char);
}

fn parse_square(file: char, rank: char) -> Result<Square, CoordError> {
    if !('a'..='i').contains(&file) {
        return Err(CoordError::File(file));
    }
    let rank_num = rank.to_digit(10).ok_or(CoordError::Rank(rank))? as u8;
    let col = file as u8 - b'a';
    let row = Square::ROWS - 1 - rank_num;
    // to_digit(10) は 0..=9 なので row も盤内に収まる
    Square::new(row, col).ok_or(CoordError::Rank(rank))
}
