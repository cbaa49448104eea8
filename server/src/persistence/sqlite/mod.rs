//! SQLite-backed repository implementations.
//!
//! [`Database`] wraps a `sqlx::SqlitePool` configured with WAL mode, foreign
//! keys enabled at the connection level, and embedded migrations
//! (`migrations/0001_initial.sql`) run automatically by [`Database::open`].

mod database;
mod game_repo;
mod move_repo;
mod user_repo;

pub use database::Database;
pub use game_repo::SqliteGameRepository;
pub use move_repo::SqliteMoveRepository;
pub use user_repo::SqliteUserRepository;

/// Production persistence provider backed by SQLite.
pub struct SqlitePersistence;

impl crate::persistence::Persistence for SqlitePersistence {
    type Games = SqliteGameRepository;
    type Moves = SqliteMoveRepository;
    type Users = SqliteUserRepository;
}
