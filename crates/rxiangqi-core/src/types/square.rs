//! 升（Square）

use serde::{Deserialize, Serialize};

use super::Color;

/// 盤上の升（row 0 = 黒の最下段、row 9 = 紅の最下段）
///
/// 範囲外の座標は `Square::new` で弾くため、構築済みの値は常に盤内を指す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Square {
    row: u8,
    col: u8,
}

impl Square {
    /// 行数
    pub const ROWS: u8 = 10;
    /// 列数
    pub const COLS: u8 = 9;
    /// 升の数
    pub const NUM: usize = (Self::ROWS as usize) * (Self::COLS as usize);

    /// 行と列から升を作る。盤外なら `None`
    #[inline]
    pub const fn new(row: u8, col: u8) -> Option<Square> {
        if row < Self::ROWS && col < Self::COLS { Some(Square { row, col }) } else { None }
    }

    /// 符号付きの座標から升を作る。盤外なら `None`
    #[inline]
    pub fn from_signed(row: i8, col: i8) -> Option<Square> {
        if row < 0 || col < 0 {
            return None;
        }
        Square::new(row as u8, col as u8)
    }

    #[inline]
    pub const fn row(self) -> u8 {
        self.row
    }

    #[inline]
    pub const fn col(self) -> u8 {
        self.col
    }

    /// 配列インデックス（row-major）
    #[inline]
    pub const fn index(self) -> usize {
        (self.row as usize) * (Self::COLS as usize) + self.col as usize
    }

    /// 相対移動した升
    #[inline]
    pub fn offset(self, d_row: i8, d_col: i8) -> Option<Square> {
        Square::from_signed(self.row as i8 + d_row, self.col as i8 + d_col)
    }

    /// 指定手番の九宮の中かどうか
    #[inline]
    pub const fn in_palace(self, color: Color) -> bool {
        let col_ok = self.col >= 3 && self.col <= 5;
        let row_ok = match color {
            Color::Red => self.row >= 7,
            Color::Black => self.row <= 2,
        };
        col_ok && row_ok
    }

    /// 全ての升（row-major 順）
    pub fn all() -> impl Iterator<Item = Square> {
        (0..Self::ROWS).flat_map(|row| (0..Self::COLS).map(move |col| Square { row, col }))
    }

    /// 180度回転した升（盤面の上下反転 + 左右反転）
    #[inline]
    pub const fn rotated(self) -> Square {
        Square { row: Self::ROWS - 1 - self.row, col: Self::COLS - 1 - self.col }
    }
}

impl std::fmt::Display for Square {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}
