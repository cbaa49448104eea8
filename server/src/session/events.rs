//! Events broadcast from a session actor to every attached seat (§4.3/§6).
//! `MoveResult` has no variant here: it is a unicast reply to the mover's
//! own `MakeMove` command, not something the table shares.

use xiangqi::{Color, MoveRecord};

use super::snapshot::SessionSnapshot;
use crate::persistence::GameResult;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Sent to both seats after any state-changing command.
    StateChanged(SessionSnapshot),
    /// The move the opponent just made, for the non-mover's benefit.
    OpponentMove { mover_color: Color, move_number: usize, record: MoveRecord },
    Timer { red_seconds: u32, black_seconds: u32 },
    RollbackRequested { requested_by: Color, target_move_number: usize },
    RollbackResult { accepted: bool, rollbacks_remaining: u8 },
    DrawOffered { offered_by: Color },
    DrawDeclined,
    GameEnd {
        result: GameResult,
        winner_device_id: Option<String>,
        winner_color: Option<Color>,
        timeout_color: Option<Color>,
    },
    ConnectionStatus { device_id: String, color: Color, connected: bool },
}
