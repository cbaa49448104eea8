//! SQLite-backed [`GameRepository`].

use sqlx::{Row, SqlitePool};

use crate::persistence::models::{GameRecord, GameResult, GameStatus};
use crate::persistence::traits::GameRepository;
use crate::persistence::PersistenceError;

#[derive(Clone)]
pub struct SqliteGameRepository {
    pool: SqlitePool,
}

impl SqliteGameRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<GameRecord, PersistenceError> {
    let status_str: String = row.try_get("status")?;
    let result_str: Option<String> = row.try_get("result")?;
    Ok(GameRecord {
        id: row.try_get("id")?,
        red_device_id: row.try_get("red_device_id")?,
        black_device_id: row.try_get("black_device_id")?,
        status: GameStatus::from_str(&status_str).unwrap_or(GameStatus::Active),
        turn_timeout_seconds: row.try_get::<i64, _>("turn_timeout_seconds")? as u32,
        red_rollback_budget: row.try_get::<i64, _>("red_rollback_budget")? as u8,
        black_rollback_budget: row.try_get::<i64, _>("black_rollback_budget")? as u8,
        total_moves: row.try_get::<i64, _>("total_moves")? as u32,
        created_at: row.try_get("created_at")?,
        winner_device_id: row.try_get("winner_device_id")?,
        result: result_str.and_then(|s| GameResult::from_str(&s)),
    })
}

impl GameRepository for SqliteGameRepository {
    async fn create(&self, game: &GameRecord) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO games (id, red_device_id, black_device_id, status, turn_timeout_seconds,
                red_rollback_budget, black_rollback_budget, total_moves, created_at,
                winner_device_id, result)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&game.id)
        .bind(&game.red_device_id)
        .bind(&game.black_device_id)
        .bind(game.status.as_str())
        .bind(game.turn_timeout_seconds as i64)
        .bind(game.red_rollback_budget as i64)
        .bind(game.black_rollback_budget as i64)
        .bind(game.total_moves as i64)
        .bind(game.created_at)
        .bind(&game.winner_device_id)
        .bind(game.result.map(GameResult::as_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, game: &GameRecord) -> Result<(), PersistenceError> {
        sqlx::query(
            "UPDATE games SET status = ?, red_rollback_budget = ?, black_rollback_budget = ?,
                total_moves = ?, winner_device_id = ?, result = ?
             WHERE id = ?",
        )
        .bind(game.status.as_str())
        .bind(game.red_rollback_budget as i64)
        .bind(game.black_rollback_budget as i64)
        .bind(game.total_moves as i64)
        .bind(&game.winner_device_id)
        .bind(game.result.map(GameResult::as_str))
        .bind(&game.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<GameRecord>, PersistenceError> {
        let row = sqlx::query("SELECT * FROM games WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn history_by_player(
        &self,
        device_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<GameRecord>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT * FROM games WHERE red_device_id = ? OR black_device_id = ?
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(device_id)
        .bind(device_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn count_by_player(&self, device_id: &str) -> Result<u64, PersistenceError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM games WHERE red_device_id = ? OR black_device_id = ?",
        )
        .bind(device_id)
        .bind(device_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }

    async fn active_by_player(&self, device_id: &str) -> Result<Vec<GameRecord>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT * FROM games WHERE (red_device_id = ? OR black_device_id = ?) AND status = 'active'",
        )
        .bind(device_id)
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }
}
