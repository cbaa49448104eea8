//! Persistence collaborator contract (§6).
//!
//! The core treats durable storage as an external collaborator: it asks to
//! persist a game record, a move record, and player stat updates, and never
//! reaches into SQL itself from the session or matchmaker layers. [`sqlite`]
//! is the one concrete backend this crate ships so the service is runnable
//! end to end; other backends only need to implement [`traits`].

pub mod models;
pub mod sqlite;
pub mod traits;

pub use models::{GameRecord, GameResult, GameStatus, StoredMove, UserStats};
pub use traits::{GameRepository, MoveRepository, Persistence, UserRepository};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Sqlx(#[from] ::sqlx::Error),
    #[error("migration error: {0}")]
    Migration(String),
    #[error("not found")]
    NotFound,
}
