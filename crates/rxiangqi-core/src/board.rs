//! 盤面（Board）
//!
//! 10 行 × 9 列の升に駒を置くだけの値型。手番や履歴は持たない。
//! ルール判定・記譜は `&Board` を受け取り、盤面を書き換える場合は
//! `with_move` で新しい盤面を返す。

use crate::types::{Color, Move, Piece, PieceKind, Square};

/// 盤面
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Board {
    cells: [Option<Piece>; Square::NUM],
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

impl Board {
    /// 駒のない盤面
    pub const fn empty() -> Board {
        Board { cells: [None; Square::NUM] }
    }

    /// 升の駒
    #[inline]
    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        self.cells[sq.index()]
    }

    /// 升が空かどうか
    #[inline]
    pub fn is_empty(&self, sq: Square) -> bool {
        self.cells[sq.index()].is_none()
    }

    /// 升に駒を置く（`None` で取り除く）
    #[inline]
    pub fn set(&mut self, sq: Square, piece: Option<Piece>) {
        self.cells[sq.index()] = piece;
    }

    /// 指し手を適用した新しい盤面を返す。合法性は見ない
    pub fn with_move(&self, mv: Move) -> Board {
        let mut next = *self;
        let moving = next.piece_on(mv.from);
        next.set(mv.from, None);
        next.set(mv.to, moving);
        next
    }

    /// 盤上の駒を row-major 順に列挙
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        Square::all().filter_map(move |sq| self.piece_on(sq).map(|pc| (sq, pc)))
    }

    /// 指定した駒の枚数
    pub fn count(&self, piece: Piece) -> usize {
        self.cells.iter().filter(|c| **c == Some(piece)).count()
    }

    /// 帅/将の升（複数ある場合は最初に見つかったもの）
    pub fn king_square(&self, color: Color) -> Option<Square> {
        let king = Piece::new(color, PieceKind::King);
        self.pieces().find(|(_, pc)| *pc == king).map(|(sq, _)| sq)
    }

    /// 同じ列にある指定駒の升（row 昇順）
    pub fn squares_on_col(&self, col: u8, piece: Piece) -> Vec<Square> {
        (0..Square::ROWS)
            .filter_map(|row| Square::new(row, col))
            .filter(|sq| self.piece_on(*sq) == Some(piece))
            .collect()
    }

    /// 同じ行または列にある 2 升の間（両端を含まない）にある駒の数
    ///
    /// 一直線上にない場合は `None`。
    pub fn pieces_between(&self, a: Square, b: Square) -> Option<usize> {
        if a.row() == b.row() {
            let (lo, hi) = minmax(a.col(), b.col());
            Some(
                (lo + 1..hi)
                    .filter_map(|col| Square::new(a.row(), col))
                    .filter(|sq| !self.is_empty(*sq))
                    .count(),
            )
        } else if a.col() == b.col() {
            let (lo, hi) = minmax(a.row(), b.row());
            Some(
                (lo + 1..hi)
                    .filter_map(|row| Square::new(row, a.col()))
                    .filter(|sq| !self.is_empty(*sq))
                    .count(),
            )
        } else {
            None
        }
    }

    /// 180度回転した盤面（紅が上に写った画像の正規化用）
    pub fn rotated(&self) -> Board {
        let mut out = Board::empty();
        for (sq, pc) in self.pieces() {
            out.set(sq.rotated(), Some(pc));
        }
        out
    }
}

#[inline]
fn minmax(a: u8, b: u8) -> (u8, u8) {
    if a <= b { (a, b) } else { (b, a) }
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Board(")?;
        for sq in Square::all() {
            if sq.col() == 0 && sq.row() > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", self.piece_on(sq).map_or('.', Piece::fen_char))?;
        }
        write!(f, ")")
    }
}

/// 端末表示用。上が黒、下が紅
impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "   a  b  c  d  e  f  g  h  i")?;
        for sq in Square::all() {
            if sq.col() == 0 {
                write!(f, "{} ", Square::ROWS - 1 - sq.row())?;
            }
            match self.piece_on(sq) {
                Some(pc) => write!(f, " {}", pc.glyph())?,
                None => write!(f, " ・")?,
            }
            if sq.col() == Square::COLS - 1 {
                writeln!(f)?;
                if sq.row() == 4 {
                    writeln!(f, "   ~~~~~~~~~~~~~~~~~~~~~~~~~~")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(row: u8, col: u8) -> Square {
        Square::new(row, col).unwrap()
    }

    #[test]
    fn test_with_move_does_not_touch_source_board() {
        let mut board = Board::empty();
        let rook = Piece::new(Color::Red, PieceKind::Rook);
        board.set(sq(9, 0), Some(rook));
        let next = board.with_move(Move::new(sq(9, 0), sq(5, 0)));
        assert_eq!(board.piece_on(sq(9, 0)), Some(rook));
        assert_eq!(next.piece_on(sq(9, 0)), None);
        assert_eq!(next.piece_on(sq(5, 0)), Some(rook));
    }

    #[test]
    fn test_pieces_between() {
        let mut board = Board::empty();
        let pawn = Piece::new(Color::Black, PieceKind::Pawn);
        board.set(sq(3, 4), Some(pawn));
        board.set(sq(5, 4), Some(pawn));
        assert_eq!(board.pieces_between(sq(0, 4), sq(9, 4)), Some(2));
        assert_eq!(board.pieces_between(sq(3, 4), sq(5, 4)), Some(0));
        assert_eq!(board.pieces_between(sq(3, 0), sq(3, 8)), Some(1));
        assert_eq!(board.pieces_between(sq(0, 0), sq(1, 1)), None);
    }

    #[test]
    fn test_king_square_and_rotation() {
        let mut board = Board::empty();
        board.set(sq(9, 4), Some(Piece::new(Color::Red, PieceKind::King)));
        assert_eq!(board.king_square(Color::Red), Some(sq(9, 4)));
        assert_eq!(board.king_square(Color::Black), None);
        assert_eq!(board.rotated().king_square(Color::Red), Some(sq(0, 4)));
    }
}
