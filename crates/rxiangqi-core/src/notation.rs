//! 中国式棋譜表記（例: 炮二平五、前车进一）
//!
//! 紅は漢数字（一〜九）で自分から見て右から筋を数え、黒は全角数字（１〜９）で
//! 黒から見て右から数える。同じ筋に同種の駒が 2 枚以上あるときは
//! 筋の代わりに前/后（3 枚なら前/中/后）を駒名の前に置く。

use crate::board::Board;
use crate::types::{Color, Move, Piece, Square};

const RED_NUMERALS: [char; 9] = ['一', '二', '三', '四', '五', '六', '七', '八', '九'];
const BLACK_NUMERALS: [char; 9] = ['１', '２', '３', '４', '５', '６', '７', '８', '９'];

/// 4 枚以上並んだ場合の序数（前から順）
const ORDINALS: [char; 5] = ['一', '二', '三', '四', '五'];

/// 指し手を中国式表記に変換する
///
/// 移動元に駒がない場合は UCI 表記をそのまま返す。合法性は見ない。
pub fn notate(board: &Board, mv: Move) -> String {
    let Some(piece) = board.piece_on(mv.from) else {
        log::debug!("notate: no piece on the source square of {mv}");
        return mv.to_uci();
    };
    let color = piece.color;

    let mut out = String::with_capacity(12);
    match same_file_prefix(board, piece, mv.from) {
        Some(prefix) => {
            out.push(prefix);
            out.push(piece.glyph());
        }
        None => {
            out.push(piece.glyph());
            out.push(file_numeral(color, mv.from.col()));
        }
    }

    let d_row = mv.to.row() as i8 - mv.from.row() as i8;
    let advance = d_row * color.forward();
    out.push(match advance.signum() {
        1 => '进',
        -1 => '退',
        _ => '平',
    });

    if advance == 0 || piece.kind.moves_diagonally() {
        out.push(file_numeral(color, mv.to.col()));
    } else {
        out.push(count_numeral(color, advance.unsigned_abs()));
    }
    out
}

/// 筋番号の表記
fn file_numeral(color: Color, col: u8) -> char {
    match color {
        Color::Red => RED_NUMERALS[(Square::COLS - 1 - col) as usize],
        Color::Black => BLACK_NUMERALS[col as usize],
    }
}

/// 進退の歩数の表記（1〜9）
fn count_numeral(color: Color, n: u8) -> char {
    let idx = n.clamp(1, 9) as usize - 1;
    match color {
        Color::Red => RED_NUMERALS[idx],
        Color::Black => BLACK_NUMERALS[idx],
    }
}

/// 同じ筋に同種同色の駒が複数あるときの前置詞
fn same_file_prefix(board: &Board, piece: Piece, from: Square) -> Option<char> {
    let mut stack = board.squares_on_col(from.col(), piece);
    if stack.len() < 2 {
        return None;
    }
    // 相手陣に近い方が前。紅は row が小さい方、黒は row が大きい方
    if piece.color == Color::Black {
        stack.reverse();
    }
    let rank = stack.iter().position(|sq| *sq == from)?;
    let prefix = match (stack.len(), rank) {
        (2, 0) | (3, 0) => '前',
        (3, 1) => '中',
        (2, _) | (3, _) => '后',
        (_, i) => ORDINALS[i.min(ORDINALS.len() - 1)],
    };
    Some(prefix)
}
