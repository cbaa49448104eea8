//! Legal move generation and position classification.
//!
//! Both operations are pure functions over a [`Board`] snapshot: no
//! mutable state is owned here, so the server can validate a
//! client-submitted move without trusting anything the client says
//! about the board.

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::square::Square;
use crate::types::{Color, Piece, PieceKind};

/// A single applied or proposed move, piece-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub from: Square,
    pub to: Square,
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    None,
    Check,
    Checkmate,
    Stalemate,
}

/// All legal destination squares for the piece standing on `from`.
///
/// A destination is legal iff it satisfies the piece's movement rule,
/// the hypothetical resulting board does not leave the mover's own
/// General attacked, and the two Generals do not end up facing each
/// other on an open file.
pub fn legal_moves(board: &Board, from: Square) -> Vec<Square> {
    let Some(piece) = board.piece_on(from) else {
        return Vec::new();
    };
    pseudo_moves(board, from, piece)
        .into_iter()
        .filter(|&to| !moving_leaves_mover_exposed(board, from, to, piece.color))
        .collect()
}

/// All (from, to) legal moves for every piece of `color`.
pub fn legal_moves_for_side(board: &Board, color: Color) -> Vec<Move> {
    board
        .pieces_of(color)
        .into_iter()
        .flat_map(|(from, _)| {
            legal_moves(board, from)
                .into_iter()
                .map(move |to| Move { from, to })
        })
        .collect()
}

/// Classify `side_to_move`'s situation on `board`.
pub fn classify(board: &Board, side_to_move: Color) -> Classification {
    let in_check = is_in_check(board, side_to_move);
    let has_move = !legal_moves_for_side(board, side_to_move).is_empty();
    match (in_check, has_move) {
        (true, false) => Classification::Checkmate,
        (false, false) => Classification::Stalemate,
        (true, true) => Classification::Check,
        (false, true) => Classification::None,
    }
}

/// Is `color`'s General currently attacked?
pub fn is_in_check(board: &Board, color: Color) -> bool {
    match board.general_square(color) {
        Some(sq) => is_square_attacked(board, sq, color.opposite()) || flying_general(board),
        // A General-less board can't occur under normal play; treat as not in check.
        None => false,
    }
}

/// The illegal "flying general" facing: both Generals present, sharing
/// a file, with nothing between them.
fn flying_general(board: &Board) -> bool {
    let (Some(red), Some(black)) = (
        board.general_square(Color::Red),
        board.general_square(Color::Black),
    ) else {
        return false;
    };
    red.file == black.file && board.count_between(red, black) == Some(0)
}

/// Does any piece of `attacker_color` attack `target` under its
/// movement rule (ignoring whose turn it is and whether the attacker's
/// own General would then be exposed)?
fn is_square_attacked(board: &Board, target: Square, attacker_color: Color) -> bool {
    board
        .pieces_of(attacker_color)
        .into_iter()
        .any(|(from, piece)| pseudo_moves(board, from, piece).contains(&target))
}

fn moving_leaves_mover_exposed(board: &Board, from: Square, to: Square, mover: Color) -> bool {
    let mut next = board.clone();
    next.apply(from, to);
    is_in_check(&next, mover)
}

/// Movement-rule-only destinations for `piece` standing at `from`:
/// board bounds, palace/river confinement, blocking, and the Cannon's
/// screen rule, but NOT post-move check legality.
fn pseudo_moves(board: &Board, from: Square, piece: Piece) -> Vec<Square> {
    match piece.kind {
        PieceKind::General => step_moves(board, from, piece.color, &ORTHOGONAL, true),
        PieceKind::Advisor => step_moves(board, from, piece.color, &DIAGONAL, true),
        PieceKind::Elephant => elephant_moves(board, from, piece.color),
        PieceKind::Horse => horse_moves(board, from, piece.color),
        PieceKind::Chariot => sliding_moves(board, from, piece.color, &ORTHOGONAL),
        PieceKind::Cannon => cannon_moves(board, from, piece.color),
        PieceKind::Soldier => soldier_moves(board, from, piece.color),
    }
}

const ORTHOGONAL: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const DIAGONAL: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

fn landable(board: &Board, color: Color, to: Square) -> bool {
    to.in_bounds()
        && match board.piece_on(to) {
            None => true,
            Some(p) => p.color != color,
        }
}

fn step_moves(
    board: &Board,
    from: Square,
    color: Color,
    deltas: &[(i8, i8)],
    palace_confined: bool,
) -> Vec<Square> {
    deltas
        .iter()
        .map(|&(df, dr)| from.offset(df, dr))
        .filter(|&to| landable(board, color, to))
        .filter(|&to| !palace_confined || Board::in_palace(color, to))
        .collect()
}

fn elephant_moves(board: &Board, from: Square, color: Color) -> Vec<Square> {
    DIAGONAL
        .iter()
        .filter_map(|&(df, dr)| {
            let eye = from.offset(df, dr);
            let to = from.offset(df * 2, dr * 2);
            if !to.in_bounds() || board.piece_on(eye).is_some() {
                return None;
            }
            if !Board::home_side(color, to.rank) {
                return None;
            }
            landable(board, color, to).then_some(to)
        })
        .collect()
}

fn horse_moves(board: &Board, from: Square, color: Color) -> Vec<Square> {
    const JUMPS: [(i8, i8, i8, i8); 8] = [
        (1, 0, 2, 1),
        (1, 0, 2, -1),
        (-1, 0, -2, 1),
        (-1, 0, -2, -1),
        (0, 1, 1, 2),
        (0, 1, -1, 2),
        (0, -1, 1, -2),
        (0, -1, -1, -2),
    ];
    JUMPS
        .iter()
        .filter_map(|&(lf, lr, df, dr)| {
            let leg = from.offset(lf, lr);
            let to = from.offset(df, dr);
            if board.piece_on(leg).is_some() {
                return None;
            }
            landable(board, color, to).then_some(to)
        })
        .collect()
}

fn sliding_moves(board: &Board, from: Square, color: Color, deltas: &[(i8, i8)]) -> Vec<Square> {
    let mut out = Vec::new();
    for &(df, dr) in deltas {
        let mut to = from.offset(df, dr);
        while to.in_bounds() {
            match board.piece_on(to) {
                None => {
                    out.push(to);
                }
                Some(p) => {
                    if p.color != color {
                        out.push(to);
                    }
                    break;
                }
            }
            to = to.offset(df, dr);
        }
    }
    out
}

fn cannon_moves(board: &Board, from: Square, color: Color) -> Vec<Square> {
    let mut out = Vec::new();
    for &(df, dr) in &ORTHOGONAL {
        let mut to = from.offset(df, dr);
        let mut screened = false;
        while to.in_bounds() {
            match (board.piece_on(to), screened) {
                (None, false) => out.push(to),
                (None, true) => {}
                (Some(_), false) => screened = true,
                (Some(p), true) => {
                    if p.color != color {
                        out.push(to);
                    }
                    break;
                }
            }
            to = to.offset(df, dr);
        }
    }
    out
}

fn soldier_moves(board: &Board, from: Square, color: Color) -> Vec<Square> {
    let forward = match color {
        Color::Red => 1,
        Color::Black => -1,
    };
    let mut deltas = vec![(0, forward)];
    if Board::has_crossed_river(color, from) {
        deltas.push((1, 0));
        deltas.push((-1, 0));
    }
    deltas
        .into_iter()
        .map(|(df, dr)| from.offset(df, dr))
        .filter(|&to| landable(board, color, to))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Color;

    #[test]
    fn opening_cannon_move_is_legal() {
        let board = Board::initial();
        let from = Square::new(1, 2);
        let moves = legal_moves(&board, from);
        assert!(moves.contains(&Square::new(1, 6)));
    }

    #[test]
    fn flying_general_facing_is_illegal() {
        let mut board = Board::empty();
        board.set(
            Square::new(4, 0),
            Some(Piece { kind: PieceKind::General, color: Color::Red }),
        );
        board.set(
            Square::new(4, 9),
            Some(Piece { kind: PieceKind::General, color: Color::Black }),
        );
        board.set(
            Square::new(4, 5),
            Some(Piece { kind: PieceKind::Chariot, color: Color::Red }),
        );
        let from = Square::new(4, 5);
        let moves = legal_moves(&board, from);
        // Moving off the shared file is fine; sliding to where it would
        // expose both Generals facing each other is not.
        assert!(!moves.contains(&Square::new(4, 8)));
    }

    #[test]
    fn cannon_capture_requires_exactly_one_screen() {
        let mut board = Board::empty();
        board.set(
            Square::new(4, 0),
            Some(Piece { kind: PieceKind::General, color: Color::Red }),
        );
        board.set(
            Square::new(4, 9),
            Some(Piece { kind: PieceKind::General, color: Color::Black }),
        );
        board.set(
            Square::new(1, 2),
            Some(Piece { kind: PieceKind::Cannon, color: Color::Red }),
        );
        board.set(
            Square::new(1, 5),
            Some(Piece { kind: PieceKind::Soldier, color: Color::Black }),
        );
        board.set(
            Square::new(1, 7),
            Some(Piece { kind: PieceKind::Horse, color: Color::Black }),
        );
        let moves = legal_moves(&board, Square::new(1, 2));
        assert!(moves.contains(&Square::new(1, 7)));

        // Remove the screen: capture is no longer possible.
        let mut no_screen = board.clone();
        no_screen.set(Square::new(1, 5), None);
        let moves = legal_moves(&no_screen, Square::new(1, 2));
        assert!(!moves.contains(&Square::new(1, 7)));
    }

    #[test]
    fn elephant_cannot_cross_river_or_jump_blocked_eye() {
        let mut board = Board::empty();
        board.set(
            Square::new(4, 0),
            Some(Piece { kind: PieceKind::General, color: Color::Red }),
        );
        board.set(
            Square::new(4, 9),
            Some(Piece { kind: PieceKind::General, color: Color::Black }),
        );
        board.set(
            Square::new(2, 3),
            Some(Piece { kind: PieceKind::Elephant, color: Color::Red }),
        );
        let moves = legal_moves(&board, Square::new(2, 3));
        assert!(moves.contains(&Square::new(0, 1)));
        assert!(moves.contains(&Square::new(4, 1)));
        assert!(!moves.contains(&Square::new(0, 5))); // would cross the river
        assert!(!moves.contains(&Square::new(4, 5))); // would cross the river
    }

    #[test]
    fn legal_move_never_leaves_own_general_attacked() {
        let board = Board::initial();
        for (from, _) in board.pieces_of(Color::Red) {
            for to in legal_moves(&board, from) {
                let mut next = board.clone();
                next.apply(from, to);
                assert!(!is_in_check(&next, Color::Red));
            }
        }
    }

    #[test]
    fn classify_lone_general_with_every_flight_square_covered_is_stalemate() {
        // A lone Red General at the center of its palace with each of its
        // three reachable squares raked by a different Black Chariot: Red
        // has no legal move and is not currently in check.
        let mut board = Board::empty();
        board.set(
            Square::new(4, 0),
            Some(Piece { kind: PieceKind::General, color: Color::Red }),
        );
        board.set(
            Square::new(8, 9),
            Some(Piece { kind: PieceKind::General, color: Color::Black }),
        );
        board.set(
            Square::new(3, 9),
            Some(Piece { kind: PieceKind::Chariot, color: Color::Black }),
        );
        board.set(
            Square::new(5, 9),
            Some(Piece { kind: PieceKind::Chariot, color: Color::Black }),
        );
        board.set(
            Square::new(0, 1),
            Some(Piece { kind: PieceKind::Chariot, color: Color::Black }),
        );
        assert!(!is_in_check(&board, Color::Red));
        assert!(legal_moves(&board, Square::new(4, 0)).is_empty());
        assert_eq!(classify(&board, Color::Red), Classification::Stalemate);
    }
}
