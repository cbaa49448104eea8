//! A played-out game: the current board plus its move history, with
//! undo-by-replay so reverting to an earlier position never has to trust
//! incremental unmake logic.

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::moves::{self, Classification};
use crate::square::Square;
use crate::types::{Color, PieceKind};

/// One recorded ply. Immutable once pushed onto the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub from: Square,
    pub to: Square,
    pub piece: PieceKind,
    pub captured: Option<PieceKind>,
    pub is_check: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("no piece on the source square")]
    NoPieceAtSource,
    #[error("that square does not hold the mover's own piece")]
    NotMoversPiece,
    #[error("the piece kind supplied does not match the board")]
    PieceKindMismatch,
    #[error("that move is not legal")]
    Illegal,
}

/// A game in progress: the position reached by replaying `history` from
/// the initial setup.
#[derive(Debug, Clone)]
pub struct Game {
    board: Board,
    side_to_move: Color,
    history: Vec<MoveRecord>,
}

impl Game {
    pub fn new() -> Self {
        Self {
            board: Board::initial(),
            side_to_move: Color::Red,
            history: Vec::new(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    pub fn move_count(&self) -> usize {
        self.history.len()
    }

    pub fn classify(&self) -> Classification {
        moves::classify(&self.board, self.side_to_move)
    }

    /// Validate and apply a move by the side to move. The caller supplies
    /// the piece kind it believes is moving; a mismatch is an error
    /// rather than silently trusting the client.
    pub fn apply_move(
        &mut self,
        from: Square,
        to: Square,
        claimed_kind: PieceKind,
    ) -> Result<MoveRecord, MoveError> {
        let piece = self.board.piece_on(from).ok_or(MoveError::NoPieceAtSource)?;
        if piece.color != self.side_to_move {
            return Err(MoveError::NotMoversPiece);
        }
        if piece.kind != claimed_kind {
            return Err(MoveError::PieceKindMismatch);
        }
        if !moves::legal_moves(&self.board, from).contains(&to) {
            return Err(MoveError::Illegal);
        }

        let captured = self.board.apply(from, to).map(|p| p.kind);
        self.side_to_move = self.side_to_move.opposite();
        let is_check = moves::is_in_check(&self.board, self.side_to_move);

        let record = MoveRecord { from, to, piece: piece.kind, captured, is_check };
        self.history.push(record.clone());
        Ok(record)
    }

    /// Truncate the history to `keep` moves and replay from the initial
    /// position. Used by rollback: the caller passes `target_move_number
    /// - 1` as `keep`.
    pub fn truncate_and_replay(&mut self, keep: usize) {
        self.history.truncate(keep);
        self.board = Board::initial();
        self.side_to_move = Color::Red;
        let records = std::mem::take(&mut self.history);
        for record in &records {
            self.board.apply(record.from, record.to);
            self.side_to_move = self.side_to_move.opposite();
        }
        self.history = records;
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_cannon_move_updates_turn_and_count() {
        let mut game = Game::new();
        let record = game
            .apply_move(Square::new(1, 2), Square::new(1, 6), PieceKind::Cannon)
            .unwrap();
        assert_eq!(record.captured, None);
        assert_eq!(game.move_count(), 1);
        assert_eq!(game.side_to_move(), Color::Black);
        assert_eq!(game.classify(), Classification::None);
    }

    #[test]
    fn rollback_to_move_number_minus_one_restores_exact_board() {
        let mut game = Game::new();
        let before = game.board().clone();
        game.apply_move(Square::new(1, 2), Square::new(1, 6), PieceKind::Cannon)
            .unwrap();
        game.apply_move(Square::new(1, 7), Square::new(4, 7), PieceKind::Cannon)
            .unwrap();
        assert_eq!(game.move_count(), 2);

        game.truncate_and_replay(0);
        assert_eq!(game.move_count(), 0);
        assert_eq!(game.board(), &before);
        assert_eq!(game.side_to_move(), Color::Red);
    }

    #[test]
    fn illegal_move_is_rejected_and_state_is_unchanged() {
        let mut game = Game::new();
        let before = game.board().clone();
        let err = game
            .apply_move(Square::new(4, 0), Square::new(4, 8), PieceKind::General)
            .unwrap_err();
        assert_eq!(err, MoveError::Illegal);
        assert_eq!(game.board(), &before);
        assert_eq!(game.move_count(), 0);
    }

    #[test]
    fn piece_kind_mismatch_is_rejected() {
        let mut game = Game::new();
        let err = game
            .apply_move(Square::new(1, 2), Square::new(1, 6), PieceKind::Chariot)
            .unwrap_err();
        assert_eq!(err, MoveError::PieceKindMismatch);
    }
}
