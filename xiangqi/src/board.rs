//! Board snapshot: a 9x10 grid of optional pieces, plus the geometric
//! invariants (palace, river) that piece movement is defined against.

use serde::{Deserialize, Serialize};

use crate::square::{Square, FILES, RANKS};
use crate::types::{Color, Piece, PieceKind};

/// A 9-file x 10-rank grid. Files 0..8, Red occupies ranks 0..4, Black
/// occupies ranks 5..9. No I/O, no interior mutability: every mutation
/// returns a new logical state via `&mut self` on an owned clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    squares: [[Option<Piece>; FILES as usize]; RANKS as usize],
}

impl Board {
    pub fn empty() -> Self {
        Self {
            squares: [[None; FILES as usize]; RANKS as usize],
        }
    }

    /// The standard Xiangqi starting position.
    pub fn initial() -> Self {
        let mut board = Self::empty();
        use PieceKind::*;

        let back_rank = [
            Chariot, Horse, Elephant, Advisor, General, Advisor, Elephant, Horse, Chariot,
        ];
        for (file, kind) in back_rank.iter().enumerate() {
            board.set(Square::new(file as i8, 0), Some(Piece { kind: *kind, color: Color::Red }));
            board.set(Square::new(file as i8, 9), Some(Piece { kind: *kind, color: Color::Black }));
        }
        for file in [1, 7] {
            board.set(Square::new(file, 2), Some(Piece { kind: Cannon, color: Color::Red }));
            board.set(Square::new(file, 7), Some(Piece { kind: Cannon, color: Color::Black }));
        }
        for file in [0, 2, 4, 6, 8] {
            board.set(Square::new(file, 3), Some(Piece { kind: Soldier, color: Color::Red }));
            board.set(Square::new(file, 6), Some(Piece { kind: Soldier, color: Color::Black }));
        }
        board
    }

    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        if !sq.in_bounds() {
            return None;
        }
        self.squares[sq.rank as usize][sq.file as usize]
    }

    pub fn set(&mut self, sq: Square, piece: Option<Piece>) {
        self.squares[sq.rank as usize][sq.file as usize] = piece;
    }

    /// Apply a move without any legality checking. Returns the captured
    /// piece, if any.
    pub fn apply(&mut self, from: Square, to: Square) -> Option<Piece> {
        let piece = self.piece_on(from);
        let captured = self.piece_on(to);
        self.set(from, None);
        self.set(to, piece);
        captured
    }

    pub fn pieces_of(&self, color: Color) -> Vec<(Square, Piece)> {
        let mut out = Vec::new();
        for rank in 0..RANKS {
            for file in 0..FILES {
                let sq = Square::new(file, rank);
                if let Some(p) = self.piece_on(sq) {
                    if p.color == color {
                        out.push((sq, p));
                    }
                }
            }
        }
        out
    }

    pub fn general_square(&self, color: Color) -> Option<Square> {
        self.pieces_of(color)
            .into_iter()
            .find(|(_, p)| p.kind == PieceKind::General)
            .map(|(sq, _)| sq)
    }

    /// Whichever side owns `color`'s home half, ranks 0..=4 for Red and
    /// 5..=9 for Black.
    pub fn home_side(color: Color, rank: i8) -> bool {
        match color {
            Color::Red => (0..5).contains(&rank),
            Color::Black => (5..10).contains(&rank),
        }
    }

    pub fn in_palace(color: Color, sq: Square) -> bool {
        if !(3..=5).contains(&sq.file) {
            return false;
        }
        match color {
            Color::Red => (0..=2).contains(&sq.rank),
            Color::Black => (7..=9).contains(&sq.rank),
        }
    }

    /// True once `sq` has crossed the river for `color` (gaining a
    /// soldier its sideways motion).
    pub fn has_crossed_river(color: Color, sq: Square) -> bool {
        match color {
            Color::Red => sq.rank >= 5,
            Color::Black => sq.rank <= 4,
        }
    }

    /// Count of (non-empty) squares strictly between `from` and `to`
    /// along a straight orthogonal line. Returns `None` if the two
    /// squares are not on a shared rank or file.
    pub fn count_between(&self, from: Square, to: Square) -> Option<usize> {
        if from.file == to.file {
            let (lo, hi) = (from.rank.min(to.rank), from.rank.max(to.rank));
            Some(
                ((lo + 1)..hi)
                    .filter(|&r| self.piece_on(Square::new(from.file, r)).is_some())
                    .count(),
            )
        } else if from.rank == to.rank {
            let (lo, hi) = (from.file.min(to.file), from.file.max(to.file));
            Some(
                ((lo + 1)..hi)
                    .filter(|&f| self.piece_on(Square::new(f, from.rank)).is_some())
                    .count(),
            )
        } else {
            None
        }
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::initial()
    }
}

impl std::fmt::Display for Board {
    /// A FEN-like, rank-by-rank board notation: one `/`-separated group
    /// per rank from 9 down to 0, run-length-encoded empty counts, and a
    /// letter per piece (uppercase Red, lowercase Black). Not a real FEN —
    /// there is no side-to-move or move-count suffix; callers that need
    /// those append them separately.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for rank in (0..RANKS).rev() {
            let mut empties = 0u8;
            for file in 0..FILES {
                match self.piece_on(Square::new(file, rank)) {
                    None => empties += 1,
                    Some(piece) => {
                        if empties > 0 {
                            write!(f, "{empties}")?;
                            empties = 0;
                        }
                        let ch = match piece.kind {
                            PieceKind::General => 'g',
                            PieceKind::Advisor => 'a',
                            PieceKind::Elephant => 'e',
                            PieceKind::Horse => 'h',
                            PieceKind::Chariot => 'r',
                            PieceKind::Cannon => 'c',
                            PieceKind::Soldier => 's',
                        };
                        let ch = if piece.color == Color::Red {
                            ch.to_ascii_uppercase()
                        } else {
                            ch
                        };
                        write!(f, "{ch}")?;
                    }
                }
            }
            if empties > 0 {
                write!(f, "{empties}")?;
            }
            if rank > 0 {
                write!(f, "/")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_layout_has_sixteen_per_side() {
        let board = Board::initial();
        assert_eq!(board.pieces_of(Color::Red).len(), 16);
        assert_eq!(board.pieces_of(Color::Black).len(), 16);
    }

    #[test]
    fn generals_start_in_palace_center() {
        let board = Board::initial();
        assert_eq!(board.general_square(Color::Red), Some(Square::new(4, 0)));
        assert_eq!(board.general_square(Color::Black), Some(Square::new(4, 9)));
    }

    #[test]
    fn palace_bounds() {
        assert!(Board::in_palace(Color::Red, Square::new(4, 1)));
        assert!(!Board::in_palace(Color::Red, Square::new(2, 1)));
        assert!(!Board::in_palace(Color::Red, Square::new(4, 3)));
        assert!(Board::in_palace(Color::Black, Square::new(4, 8)));
    }

    #[test]
    fn initial_notation_starts_with_black_back_rank() {
        let board = Board::initial();
        let notation = board.to_string();
        assert!(notation.starts_with("rheagaehr"));
        assert_eq!(notation.matches('/').count(), 9);
    }

    #[test]
    fn count_between_straight_line() {
        let board = Board::initial();
        // Between the two red cannons' files isn't a straight line; use the
        // same-file corridor between a red chariot and the river instead.
        assert_eq!(
            board.count_between(Square::new(0, 0), Square::new(0, 4)),
            Some(1)
        );
    }
}
