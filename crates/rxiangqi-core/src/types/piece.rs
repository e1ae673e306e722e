//! 駒種（PieceKind）と駒（Piece）

use serde::{Deserialize, Serialize};

use super::Color;

/// 駒種
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PieceKind {
    /// 帅/将
    King = 0,
    /// 仕/士
    Advisor = 1,
    /// 相/象
    Bishop = 2,
    /// 马
    Knight = 3,
    /// 车
    Rook = 4,
    /// 炮
    Cannon = 5,
    /// 兵/卒
    Pawn = 6,
}

impl PieceKind {
    /// 駒種の数
    pub const NUM: usize = 7;

    /// 全ての駒種
    pub const ALL: [PieceKind; 7] = [
        PieceKind::King,
        PieceKind::Advisor,
        PieceKind::Bishop,
        PieceKind::Knight,
        PieceKind::Rook,
        PieceKind::Cannon,
        PieceKind::Pawn,
    ];

    /// インデックスとして使用
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// 片方の手番が盤上に置ける最大枚数
    #[inline]
    pub const fn max_count(self) -> usize {
        match self {
            PieceKind::King => 1,
            PieceKind::Pawn => 5,
            _ => 2,
        }
    }

    /// 九宮から出られない駒かどうか
    #[inline]
    pub const fn is_palace_bound(self) -> bool {
        matches!(self, PieceKind::King | PieceKind::Advisor)
    }

    /// 斜めに動く駒（記譜で到達先を筋で表す駒）かどうか
    #[inline]
    pub const fn moves_diagonally(self) -> bool {
        matches!(self, PieceKind::Advisor | PieceKind::Bishop | PieceKind::Knight)
    }

    /// FEN の小文字表現
    #[inline]
    pub const fn fen_char(self) -> char {
        match self {
            PieceKind::King => 'k',
            PieceKind::Advisor => 'a',
            PieceKind::Bishop => 'b',
            PieceKind::Knight => 'n',
            PieceKind::Rook => 'r',
            PieceKind::Cannon => 'c',
            PieceKind::Pawn => 'p',
        }
    }

    /// FEN 文字から駒種へ（大文字小文字は区別しない）
    ///
    /// `e`（elephant）と `h`（horse）は別表記として受け付ける。
    pub const fn from_fen_char(c: char) -> Option<PieceKind> {
        match c.to_ascii_lowercase() {
            'k' => Some(PieceKind::King),
            'a' => Some(PieceKind::Advisor),
            'b' | 'e' => Some(PieceKind::Bishop),
            'n' | 'h' => Some(PieceKind::Knight),
            'r' => Some(PieceKind::Rook),
            'c' => Some(PieceKind::Cannon),
            'p' => Some(PieceKind::Pawn),
            _ => None,
        }
    }

    /// 英語名（複数形）。エラーメッセージ用
    pub const fn plural(self) -> &'static str {
        match self {
            PieceKind::King => "kings",
            PieceKind::Advisor => "advisors",
            PieceKind::Bishop => "bishops",
            PieceKind::Knight => "knights",
            PieceKind::Rook => "rooks",
            PieceKind::Cannon => "cannons",
            PieceKind::Pawn => "pawns",
        }
    }

    /// 英語名（単数形）
    pub const fn name(self) -> &'static str {
        match self {
            PieceKind::King => "king",
            PieceKind::Advisor => "advisor",
            PieceKind::Bishop => "bishop",
            PieceKind::Knight => "knight",
            PieceKind::Rook => "rook",
            PieceKind::Cannon => "cannon",
            PieceKind::Pawn => "pawn",
        }
    }
}

impl std::fmt::Display for PieceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 駒（手番 + 駒種）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub color: Color,
    pub kind: PieceKind,
}

impl Piece {
    #[inline]
    pub const fn new(color: Color, kind: PieceKind) -> Piece {
        Piece { color, kind }
    }

    /// FEN 文字（紅は大文字、黒は小文字）
    #[inline]
    pub const fn fen_char(self) -> char {
        let c = self.kind.fen_char();
        match self.color {
            Color::Red => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }

    /// FEN 文字から駒へ
    pub const fn from_fen_char(c: char) -> Option<Piece> {
        let kind = match PieceKind::from_fen_char(c) {
            Some(kind) => kind,
            None => return None,
        };
        let color = if c.is_ascii_uppercase() { Color::Red } else { Color::Black };
        Some(Piece { color, kind })
    }

    /// 中国式の駒名（簡体字）
    pub const fn glyph(self) -> char {
        match (self.color, self.kind) {
            (Color::Red, PieceKind::King) => '帅',
            (Color::Red, PieceKind::Advisor) => '仕',
            (Color::Red, PieceKind::Bishop) => '相',
            (Color::Red, PieceKind::Pawn) => '兵',
            (Color::Black, PieceKind::King) => '将',
            (Color::Black, PieceKind::Advisor) => '士',
            (Color::Black, PieceKind::Bishop) => '象',
            (Color::Black, PieceKind::Pawn) => '卒',
            (_, PieceKind::Knight) => '马',
            (_, PieceKind::Rook) => '车',
            (_, PieceKind::Cannon) => '炮',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fen_char_roundtrip() {
        for color in Color::ALL {
            for kind in PieceKind::ALL {
                let pc = Piece::new(color, kind);
                assert_eq!(Piece::from_fen_char(pc.fen_char()), Some(pc));
            }
        }
    }

    #[test]
    fn test_fen_aliases() {
        assert_eq!(Piece::from_fen_char('E'), Some(Piece::new(Color::Red, PieceKind::Bishop)));
        assert_eq!(Piece::from_fen_char('h'), Some(Piece::new(Color::Black, PieceKind::Knight)));
        assert_eq!(Piece::from_fen_char('x'), None);
    }

    #[test]
    fn test_glyph_is_color_specific() {
        assert_eq!(Piece::new(Color::Red, PieceKind::King).glyph(), '帅');
        assert_eq!(Piece::new(Color::Black, PieceKind::King).glyph(), '将');
        assert_eq!(Piece::new(Color::Black, PieceKind::Pawn).glyph(), '卒');
    }
}
