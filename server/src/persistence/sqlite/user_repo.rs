//! SQLite-backed [`UserRepository`].

use sqlx::{Row, SqlitePool};

use crate::persistence::models::UserStats;
use crate::persistence::traits::UserRepository;
use crate::persistence::PersistenceError;

#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl UserRepository for SqliteUserRepository {
    async fn get_by_id(&self, device_id: &str) -> Result<Option<UserStats>, PersistenceError> {
        let row = sqlx::query("SELECT * FROM users WHERE device_id = ?")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(None),
            Some(row) => Ok(Some(UserStats {
                total_games: row.try_get::<i64, _>("total_games")? as u32,
                wins: row.try_get::<i64, _>("wins")? as u32,
                losses: row.try_get::<i64, _>("losses")? as u32,
                draws: row.try_get::<i64, _>("draws")? as u32,
            })),
        }
    }

    async fn update_stats(&self, device_id: &str, stats: UserStats) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO users (device_id, total_games, wins, losses, draws)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(device_id) DO UPDATE SET
                total_games = excluded.total_games,
                wins = excluded.wins,
                losses = excluded.losses,
                draws = excluded.draws",
        )
        .bind(device_id)
        .bind(stats.total_games as i64)
        .bind(stats.wins as i64)
        .bind(stats.losses as i64)
        .bind(stats.draws as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::sqlite::Database;

    #[tokio::test]
    async fn update_stats_upserts() {
        let db = Database::new_in_memory().await.unwrap();
        let repo = SqliteUserRepository::new(db.pool().clone());
        assert!(repo.get_by_id("device-1").await.unwrap().is_none());

        let stats = UserStats { total_games: 1, wins: 1, losses: 0, draws: 0 };
        repo.update_stats("device-1", stats).await.unwrap();
        let loaded = repo.get_by_id("device-1").await.unwrap().unwrap();
        assert_eq!(loaded.wins, 1);

        let stats2 = UserStats { total_games: 2, wins: 1, losses: 1, draws: 0 };
        repo.update_stats("device-1", stats2).await.unwrap();
        let loaded2 = repo.get_by_id("device-1").await.unwrap().unwrap();
        assert_eq!(loaded2.total_games, 2);
        assert_eq!(loaded2.losses, 1);
    }
}
