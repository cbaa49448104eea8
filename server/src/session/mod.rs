//! Manages every live session actor (§4.3/§5): one actor task per game,
//! addressed by a cheap `SessionHandle`. A session is created lazily the
//! first time a socket attaches for a known game id, per §5.

mod actor;
pub mod commands;
pub mod events;
pub mod handle;
pub mod snapshot;
mod state;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};

use crate::persistence::{GameRepository, MoveRepository, UserRepository};
use actor::run_session_actor;
pub use commands::SessionError;
pub use events::SessionEvent;
pub use handle::SessionHandle;
pub use snapshot::SessionSnapshot;
use state::SessionState;

const COMMAND_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Parameters needed to stand up a brand-new session actor. Everything
/// here comes straight off the `GameRecord` the matchmaker created.
pub struct NewSession<'a> {
    pub game_id: &'a str,
    pub red_device_id: &'a str,
    pub black_device_id: &'a str,
    pub turn_timeout_seconds: u32,
    pub red_rollback_budget: u8,
    pub black_rollback_budget: u8,
}

pub struct SessionManager<G, M, U> {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    games: Arc<G>,
    moves: Arc<M>,
    users: Arc<U>,
}

impl<G, M, U> SessionManager<G, M, U>
where
    G: GameRepository + 'static,
    M: MoveRepository + 'static,
    U: UserRepository + 'static,
{
    pub fn new(games: Arc<G>, moves: Arc<M>, users: Arc<U>) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), games, moves, users }
    }

    /// Returns the handle for `game_id`, spawning the actor on first call.
    /// `new` is consulted only on that first call. Takes `self` as an
    /// `Arc` so the spawned actor can hold a reference back to the
    /// manager, for scheduling its own removal once the game ends (§6).
    pub async fn get_or_create(self: &Arc<Self>, new: NewSession<'_>) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(new.game_id) {
            return handle.clone();
        }
        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get(new.game_id) {
            return handle.clone();
        }

        let state = SessionState::new(
            new.game_id.to_string(),
            new.red_device_id.to_string(),
            new.black_device_id.to_string(),
            new.turn_timeout_seconds,
            new.red_rollback_budget,
            new.black_rollback_budget,
        );
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(run_session_actor(
            state,
            cmd_rx,
            cmd_tx.clone(),
            event_tx,
            self.games.clone(),
            self.moves.clone(),
            self.users.clone(),
            Some(self.clone()),
        ));

        let handle = SessionHandle::new(new.game_id.to_string(), cmd_tx);
        sessions.insert(new.game_id.to_string(), handle.clone());
        handle
    }

    pub async fn get(&self, game_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(game_id).cloned()
    }

    /// Tears a session down: shuts its actor down and drops the handle so
    /// a later attach to the same id would have to re-create it (which
    /// only matters for already-terminal games, since a fresh attach to a
    /// live one always finds the handle still registered).
    pub async fn remove(&self, game_id: &str) {
        if let Some(handle) = self.sessions.write().await.remove(game_id) {
            handle.shutdown().await;
        }
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// §6 shutdown: stop every live session actor. Each actor's command
    /// queue is FIFO, so a `Shutdown` sent after whatever command is
    /// already in flight only runs once that command (and the persistence
    /// it performed) has completed.
    pub async fn shutdown_all(&self) {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        for handle in handles {
            handle.shutdown().await;
        }
        self.sessions.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::sqlite::{Database, SqliteGameRepository, SqliteMoveRepository, SqliteUserRepository};
    use crate::persistence::{GameRecord, GameStatus};

    type TestManager = SessionManager<SqliteGameRepository, SqliteMoveRepository, SqliteUserRepository>;

    async fn manager() -> (Arc<TestManager>, GameRecord) {
        let db = Database::new_in_memory().await.expect("open in-memory db");
        let games = Arc::new(SqliteGameRepository::new(db.pool().clone()));
        let moves = Arc::new(SqliteMoveRepository::new(db.pool().clone()));
        let users = Arc::new(SqliteUserRepository::new(db.pool().clone()));
        let record = GameRecord {
            id: "game-42".into(),
            red_device_id: "red-device".into(),
            black_device_id: "black-device".into(),
            status: GameStatus::Active,
            turn_timeout_seconds: 300,
            red_rollback_budget: 3,
            black_rollback_budget: 3,
            total_moves: 0,
            created_at: 0,
            winner_device_id: None,
            result: None,
        };
        games.create(&record).await.expect("seed game");
        (Arc::new(SessionManager::new(games, moves, users)), record)
    }

    #[tokio::test]
    async fn get_or_create_returns_the_same_handle_on_repeat_calls() {
        let (manager, record) = manager().await;
        let new = NewSession {
            game_id: &record.id,
            red_device_id: &record.red_device_id,
            black_device_id: &record.black_device_id,
            turn_timeout_seconds: record.turn_timeout_seconds,
            red_rollback_budget: record.red_rollback_budget,
            black_rollback_budget: record.black_rollback_budget,
        };
        let first = manager.get_or_create(new).await;
        let new = NewSession {
            game_id: &record.id,
            red_device_id: &record.red_device_id,
            black_device_id: &record.black_device_id,
            turn_timeout_seconds: record.turn_timeout_seconds,
            red_rollback_budget: record.red_rollback_budget,
            black_rollback_budget: record.black_rollback_budget,
        };
        let second = manager.get_or_create(new).await;
        assert_eq!(first.game_id(), second.game_id());
        assert_eq!(manager.active_count().await, 1);
        first.shutdown().await;
    }

    #[tokio::test]
    async fn remove_drops_the_handle() {
        let (manager, record) = manager().await;
        let new = NewSession {
            game_id: &record.id,
            red_device_id: &record.red_device_id,
            black_device_id: &record.black_device_id,
            turn_timeout_seconds: record.turn_timeout_seconds,
            red_rollback_budget: record.red_rollback_budget,
            black_rollback_budget: record.black_rollback_budget,
        };
        manager.get_or_create(new).await;
        manager.remove(&record.id).await;
        assert_eq!(manager.active_count().await, 0);
        assert!(manager.get(&record.id).await.is_none());
    }
}
