//! SQLite-backed [`MoveRepository`].

use sqlx::{Row, SqlitePool};

use crate::persistence::models::StoredMove;
use crate::persistence::traits::MoveRepository;
use crate::persistence::PersistenceError;

#[derive(Clone)]
pub struct SqliteMoveRepository {
    pool: SqlitePool,
}

impl SqliteMoveRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl MoveRepository for SqliteMoveRepository {
    async fn create(&self, mv: &StoredMove) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO moves (game_id, move_number, mover_device_id, from_square, to_square,
                piece_type, captured_piece_type, is_check, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&mv.game_id)
        .bind(mv.move_number as i64)
        .bind(&mv.mover_device_id)
        .bind(&mv.from_square)
        .bind(&mv.to_square)
        .bind(&mv.piece_type)
        .bind(&mv.captured_piece_type)
        .bind(mv.is_check)
        .bind(mv.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_game(&self, game_id: &str) -> Result<Vec<StoredMove>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT * FROM moves WHERE game_id = ? ORDER BY move_number ASC",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(StoredMove {
                    game_id: row.try_get("game_id")?,
                    move_number: row.try_get::<i64, _>("move_number")? as u32,
                    mover_device_id: row.try_get("mover_device_id")?,
                    from_square: row.try_get("from_square")?,
                    to_square: row.try_get("to_square")?,
                    piece_type: row.try_get("piece_type")?,
                    captured_piece_type: row.try_get("captured_piece_type")?,
                    is_check: row.try_get("is_check")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn delete_after(&self, game_id: &str, move_number: u32) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM moves WHERE game_id = ? AND move_number > ?")
            .bind(game_id)
            .bind(move_number as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
