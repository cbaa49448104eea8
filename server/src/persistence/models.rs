//! Domain records that cross the persistence boundary (§3, §6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    Active,
    Completed,
    Abandoned,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Active => "active",
            GameStatus::Completed => "completed",
            GameStatus::Abandoned => "abandoned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(GameStatus::Active),
            "completed" => Some(GameStatus::Completed),
            "abandoned" => Some(GameStatus::Abandoned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    Checkmate,
    Timeout,
    Resignation,
    Abandonment,
    Draw,
    Stalemate,
}

impl GameResult {
    pub fn as_str(self) -> &'static str {
        match self {
            GameResult::Checkmate => "checkmate",
            GameResult::Timeout => "timeout",
            GameResult::Resignation => "resignation",
            GameResult::Abandonment => "abandonment",
            GameResult::Draw => "draw",
            GameResult::Stalemate => "stalemate",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "checkmate" => Some(GameResult::Checkmate),
            "timeout" => Some(GameResult::Timeout),
            "resignation" => Some(GameResult::Resignation),
            "abandonment" => Some(GameResult::Abandonment),
            "draw" => Some(GameResult::Draw),
            "stalemate" => Some(GameResult::Stalemate),
            _ => None,
        }
    }
}

/// A game row. `winner_device_id`/`result` are set only once the game
/// leaves `Active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    pub red_device_id: String,
    pub black_device_id: String,
    pub status: GameStatus,
    pub turn_timeout_seconds: u32,
    pub red_rollback_budget: u8,
    pub black_rollback_budget: u8,
    pub total_moves: u32,
    pub created_at: i64,
    pub winner_device_id: Option<String>,
    pub result: Option<GameResult>,
}

/// A recorded ply (§3 "Move"), immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMove {
    pub game_id: String,
    pub move_number: u32,
    pub mover_device_id: String,
    pub from_square: String,
    pub to_square: String,
    pub piece_type: String,
    pub captured_piece_type: Option<String>,
    pub is_check: bool,
    pub created_at: i64,
}

/// Aggregate stats the user collaborator exposes via `user.update_stats`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UserStats {
    pub total_games: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}
