//! 合法性判定
//!
//! - `validate_position`: 盤面全体の構造チェック（枚数・兵の位置・九宮・河・将帅対面）
//! - `validate_move`: 1 手の駒別ルール判定 + 着手後の将帅対面チェック
//! - `kings_facing`: 将帅対面（飛将）の検出
//!
//! 王手・詰みの探索はここでは行わない。詰み/ステイルメイトの判定は外部エンジンに
//! 深さ 1 の探索をさせ、`bestmove (none)` を「指し手なし」とみなして行う。

use crate::board::Board;
use crate::fen::Position;
use crate::types::{Color, Move, Piece, PieceKind, Square};

/// 盤面全体の構造違反
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionViolation {
    #[error("missing {0} king")]
    MissingKing(Color),
    #[error("multiple {0} kings")]
    MultipleKings(Color),
    #[error("too many {color} {}", .kind.plural())]
    TooMany { color: Color, kind: PieceKind },
    #[error("{0} pawn position")]
    PawnPosition(Color),
    #[error("{color} {} outside palace", .kind.name())]
    OutsidePalace { color: Color, kind: PieceKind },
    #[error("{0} bishop crossed the river")]
    BishopCrossedRiver(Color),
    #[error("kings face each other on an open file")]
    FlyingGeneral,
}

/// 指し手のルール違反
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveViolation {
    #[error("no piece on the source square")]
    EmptySource,
    #[error("destination equals source")]
    NoMovement,
    #[error("cannot capture own piece")]
    OwnPieceCapture,
    #[error("king moves exactly one step orthogonally")]
    KingStep,
    #[error("advisor moves exactly one step diagonally")]
    AdvisorStep,
    #[error("{0} must stay inside the palace")]
    OutsidePalace(PieceKind),
    #[error("bishop moves exactly two steps diagonally")]
    BishopStep,
    #[error("bishop cannot cross the river")]
    RiverCrossing,
    #[error("bishop eye is blocked")]
    BishopEyeBlocked,
    #[error("knight moves in an L shape")]
    KnightShape,
    #[error("knight leg is blocked")]
    KnightLegBlocked,
    #[error("{0} moves along a rank or file")]
    NotStraight(PieceKind),
    #[error("path is blocked")]
    PathBlocked,
    #[error("cannon capture needs exactly one screen, found {found}")]
    CannonScreen { found: usize },
    #[error("pawn moves exactly one step")]
    PawnStep,
    #[error("pawn cannot move backward")]
    PawnBackward,
    #[error("pawn cannot move sideways before crossing the river")]
    PawnSideways,
    #[error("move leaves the kings facing each other")]
    FlyingGeneral,
}

/// 盤面全体が構造的に正しいかを判定する
///
/// 枚数 → 兵の位置 → 九宮/河 → 将帅対面 の順に調べ、最初の違反を返す。
pub fn validate_position(position: &Position) -> Result<(), PositionViolation> {
    let board = &position.board;

    for color in Color::ALL {
        for kind in PieceKind::ALL {
            let n = board.count(Piece::new(color, kind));
            match kind {
                PieceKind::King if n == 0 => return Err(PositionViolation::MissingKing(color)),
                PieceKind::King if n > 1 => return Err(PositionViolation::MultipleKings(color)),
                _ if n > kind.max_count() => {
                    return Err(PositionViolation::TooMany { color, kind });
                }
                _ => {}
            }
        }
    }

    for (sq, pc) in board.pieces() {
        if pc.kind == PieceKind::Pawn && !pawn_square_ok(pc.color, sq) {
            return Err(PositionViolation::PawnPosition(pc.color));
        }
    }

    for (sq, pc) in board.pieces() {
        if pc.kind.is_palace_bound() && !sq.in_palace(pc.color) {
            return Err(PositionViolation::OutsidePalace { color: pc.color, kind: pc.kind });
        }
        if pc.kind == PieceKind::Bishop && !pc.color.is_own_half(sq.row()) {
            return Err(PositionViolation::BishopCrossedRiver(pc.color));
        }
    }

    if kings_facing(board) {
        return Err(PositionViolation::FlyingGeneral);
    }
    Ok(())
}

/// 兵/卒が立てる升か
///
/// 紅は row ≤ 6、黒は row ≥ 3。河を渡る前は偶数列（0,2,4,6,8）のみ。
fn pawn_square_ok(color: Color, sq: Square) -> bool {
    let behind_baseline = match color {
        Color::Red => sq.row() > 6,
        Color::Black => sq.row() < 3,
    };
    if behind_baseline {
        return false;
    }
    !color.is_own_half(sq.row()) || sq.col() % 2 == 0
}

/// 将帅が同じ列で向かい合い、間に駒がないか
pub fn kings_facing(board: &Board) -> bool {
    match (board.king_square(Color::Red), board.king_square(Color::Black)) {
        (Some(red), Some(black)) if red.col() == black.col() => {
            board.pieces_between(red, black) == Some(0)
        }
        _ => false,
    }
}

/// 1 手の合法性を判定する
///
/// 手番は見ない（手番の管理は呼び出し側の責務）。駒別ルールを通過した後、
/// 着手後の盤面で将帅対面をどちらの玉についても調べる。
pub fn validate_move(board: &Board, mv: Move) -> Result<(), MoveViolation> {
    let piece = board.piece_on(mv.from).ok_or(MoveViolation::EmptySource)?;
    if mv.from == mv.to {
        return Err(MoveViolation::NoMovement);
    }
    let target = board.piece_on(mv.to);
    if target.is_some_and(|t| t.color == piece.color) {
        return Err(MoveViolation::OwnPieceCapture);
    }

    let d_row = mv.to.row() as i8 - mv.from.row() as i8;
    let d_col = mv.to.col() as i8 - mv.from.col() as i8;

    match piece.kind {
        PieceKind::King => check_king(piece.color, mv, d_row, d_col)?,
        PieceKind::Advisor => check_advisor(piece.color, mv, d_row, d_col)?,
        PieceKind::Bishop => check_bishop(board, piece.color, mv, d_row, d_col)?,
        PieceKind::Knight => check_knight(board, mv, d_row, d_col)?,
        PieceKind::Rook => check_rook(board, mv)?,
        PieceKind::Cannon => check_cannon(board, mv, target.is_some())?,
        PieceKind::Pawn => check_pawn(piece.color, mv, d_row, d_col)?,
    }

    if kings_facing(&board.with_move(mv)) {
        return Err(MoveViolation::FlyingGeneral);
    }
    Ok(())
}

fn check_king(color: Color, mv: Move, d_row: i8, d_col: i8) -> Result<(), MoveViolation> {
    if d_row.abs() + d_col.abs() != 1 {
        return Err(MoveViolation::KingStep);
    }
    if !mv.to.in_palace(color) {
        return Err(MoveViolation::OutsidePalace(PieceKind::King));
    }
    Ok(())
}

fn check_advisor(color: Color, mv: Move, d_row: i8, d_col: i8) -> Result<(), MoveViolation> {
    if d_row.abs() != 1 || d_col.abs() != 1 {
        return Err(MoveViolation::AdvisorStep);
    }
    if !mv.to.in_palace(color) {
        return Err(MoveViolation::OutsidePalace(PieceKind::Advisor));
    }
    Ok(())
}

fn check_bishop(
    board: &Board,
    color: Color,
    mv: Move,
    d_row: i8,
    d_col: i8,
) -> Result<(), MoveViolation> {
    if d_row.abs() != 2 || d_col.abs() != 2 {
        return Err(MoveViolation::BishopStep);
    }
    if !color.is_own_half(mv.to.row()) {
        return Err(MoveViolation::RiverCrossing);
    }
    let eye = mv.from.offset(d_row / 2, d_col / 2).ok_or(MoveViolation::BishopStep)?;
    if !board.is_empty(eye) {
        return Err(MoveViolation::BishopEyeBlocked);
    }
    Ok(())
}

fn check_knight(board: &Board, mv: Move, d_row: i8, d_col: i8) -> Result<(), MoveViolation> {
    let leg = match (d_row.abs(), d_col.abs()) {
        (2, 1) => mv.from.offset(d_row / 2, 0),
        (1, 2) => mv.from.offset(0, d_col / 2),
        _ => return Err(MoveViolation::KnightShape),
    };
    let leg = leg.ok_or(MoveViolation::KnightShape)?;
    if !board.is_empty(leg) {
        return Err(MoveViolation::KnightLegBlocked);
    }
    Ok(())
}

fn check_rook(board: &Board, mv: Move) -> Result<(), MoveViolation> {
    match board.pieces_between(mv.from, mv.to) {
        None => Err(MoveViolation::NotStraight(PieceKind::Rook)),
        Some(0) => Ok(()),
        Some(_) => Err(MoveViolation::PathBlocked),
    }
}

fn check_cannon(board: &Board, mv: Move, capture: bool) -> Result<(), MoveViolation> {
    let between =
        board.pieces_between(mv.from, mv.to).ok_or(MoveViolation::NotStraight(PieceKind::Cannon))?;
    match (capture, between) {
        (false, 0) | (true, 1) => Ok(()),
        (false, _) => Err(MoveViolation::PathBlocked),
        (true, found) => Err(MoveViolation::CannonScreen { found }),
    }
}

fn check_pawn(color: Color, mv: Move, d_row: i8, d_col: i8) -> Result<(), MoveViolation> {
    if d_row.abs() + d_col.abs() != 1 {
        return Err(MoveViolation::PawnStep);
    }
    if d_row == -color.forward() {
        return Err(MoveViolation::PawnBackward);
    }
    // 河を渡ったかは移動元で判定する
    if d_col != 0 && color.is_own_half(mv.from.row()) {
        return Err(MoveViolation::PawnSideways);
    }
    Ok(())
}

/// 指定手番の駒について `validate_move` を通る手をすべて列挙する
///
/// 自玉への王手放置は考慮しない。
pub fn pseudo_legal_moves(board: &Board, color: Color) -> Vec<Move> {
    let mut moves = Vec::new();
    for (from, pc) in board.pieces() {
        if pc.color != color {
            continue;
        }
        for to in Square::all() {
            let mv = Move::new(from, to);
            if validate_move(board, mv).is_ok() {
                moves.push(mv);
            }
        }
    }
    moves
}
