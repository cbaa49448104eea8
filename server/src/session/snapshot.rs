//! Full, immutable snapshot of a session's state (§4.3), the payload
//! behind `game_state` wire frames and `Subscribe`/`GetSnapshot` replies.

use xiangqi::{Color, MoveRecord};

#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub game_id: String,
    /// FEN-like board rendering (`Board`'s `Display` impl) for the wire's
    /// `fen_like` field. Not a real FEN: no side-to-move/move-count suffix,
    /// those are their own snapshot fields.
    pub board_notation: String,
    pub side_to_move: Color,
    pub move_count: usize,
    pub red_rollback_budget: u8,
    pub black_rollback_budget: u8,
    pub red_remaining_seconds: u32,
    pub black_remaining_seconds: u32,
    pub in_check: bool,
    pub history: Vec<MoveRecord>,
}
