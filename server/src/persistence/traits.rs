//! Async repository trait definitions for the persistence layer.
//!
//! Methods return `impl Future + Send` rather than using `async fn` so the
//! futures are guaranteed `Send`, the same reason the teacher's persistence
//! traits do it: these futures get driven from inside `tokio::spawn`ed
//! session actors.

use std::future::Future;

use super::models::{GameRecord, StoredMove, UserStats};
use super::PersistenceError;

pub trait GameRepository: Send + Sync {
    fn create(&self, game: &GameRecord) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn update(&self, game: &GameRecord) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn get_by_id(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<GameRecord>, PersistenceError>> + Send;
    fn history_by_player(
        &self,
        device_id: &str,
        limit: u32,
        offset: u32,
    ) -> impl Future<Output = Result<Vec<GameRecord>, PersistenceError>> + Send;
    fn count_by_player(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<u64, PersistenceError>> + Send;
    fn active_by_player(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<Vec<GameRecord>, PersistenceError>> + Send;
}

pub trait MoveRepository: Send + Sync {
    fn create(&self, mv: &StoredMove) -> impl Future<Output = Result<(), PersistenceError>> + Send;
    fn get_by_game(
        &self,
        game_id: &str,
    ) -> impl Future<Output = Result<Vec<StoredMove>, PersistenceError>> + Send;
    fn delete_after(
        &self,
        game_id: &str,
        move_number: u32,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

pub trait UserRepository: Send + Sync {
    fn get_by_id(
        &self,
        device_id: &str,
    ) -> impl Future<Output = Result<Option<UserStats>, PersistenceError>> + Send;
    fn update_stats(
        &self,
        device_id: &str,
        stats: UserStats,
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}

/// Resolves the concrete repository types for a given backend, the same
/// generic-manager trick the teacher's `Persistence` trait uses so session
/// and matchmaker managers stay backend-agnostic.
pub trait Persistence: Send + Sync + 'static {
    type Games: GameRepository;
    type Moves: MoveRepository;
    type Users: UserRepository;
}
