//! FIFO pairing queue (§4.2).
//!
//! The queue itself is treated as an external collaborator the same way
//! persistence is (§6): [`QueueStore`] defines the atomic "add, then scan
//! from the head" contract and a per-device mailbox for match results; this
//! crate ships [`InMemoryQueueStore`] as the one concrete backend.

mod store;

use std::sync::Arc;
use std::time::Instant;

use rand::Rng;
use uuid::Uuid;

use crate::persistence::{GameRecord, GameRepository, GameStatus, PersistenceError};
use xiangqi::Color;

pub use store::{InMemoryQueueStore, MailboxEntry, QueueEntry, QueueJoinResult, QueueStore};

#[derive(Debug, thiserror::Error)]
pub enum MatchmakerError {
    #[error("device is already in the queue")]
    AlreadyInQueue,
    #[error("failed to persist matched game: {0}")]
    PersistenceFailed(#[from] PersistenceError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    Waiting {
        position: u32,
        estimated_wait_seconds: u32,
    },
    Matched {
        game_id: String,
        opponent_device_id: String,
        opponent_name: String,
        assigned_color: Color,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Idle,
    Waiting {
        position: u32,
        estimated_wait_seconds: u32,
    },
    Matched {
        game_id: String,
        opponent_device_id: String,
        opponent_name: String,
        assigned_color: Color,
    },
}

fn effective_turn_timeout(a: u32, b: u32, default: u32) -> u32 {
    match (a > 0, b > 0) {
        (true, true) => a.min(b),
        (true, false) => a,
        (false, true) => b,
        (false, false) => default,
    }
}

fn mailbox_to_status(mailbox: MailboxEntry) -> Status {
    Status::Matched {
        game_id: mailbox.game_id,
        opponent_device_id: mailbox.opponent_device_id,
        opponent_name: mailbox.opponent_name,
        assigned_color: mailbox.assigned_color,
    }
}

/// Pairs waiting devices into games, per §4.2's algorithm.
pub struct Matchmaker<Q, G> {
    store: Arc<Q>,
    games: Arc<G>,
    default_turn_timeout_seconds: u32,
}

impl<Q, G> Matchmaker<Q, G>
where
    Q: QueueStore,
    G: GameRepository,
{
    pub fn new(store: Arc<Q>, games: Arc<G>, default_turn_timeout_seconds: u32) -> Self {
        Self {
            store,
            games,
            default_turn_timeout_seconds,
        }
    }

    #[tracing::instrument(skip(self), fields(device_id = %device_id))]
    pub async fn join(
        &self,
        device_id: String,
        display_name: String,
        turn_timeout_seconds: u32,
    ) -> Result<JoinOutcome, MatchmakerError> {
        if self.store.contains(&device_id) {
            return Err(MatchmakerError::AlreadyInQueue);
        }

        let entry = QueueEntry {
            device_id: device_id.clone(),
            display_name: display_name.clone(),
            turn_timeout_seconds,
            joined_at: Instant::now(),
        };

        match self.store.join(entry.clone()) {
            QueueJoinResult::Waiting { position } => Ok(JoinOutcome::Waiting {
                position,
                estimated_wait_seconds: position * 10,
            }),
            QueueJoinResult::Matched { opponent } => {
                self.complete_match(entry, opponent).await
            }
        }
    }

    async fn complete_match(
        &self,
        caller: QueueEntry,
        opponent: QueueEntry,
    ) -> Result<JoinOutcome, MatchmakerError> {
        let caller_is_red = rand::thread_rng().gen_bool(0.5);
        let (red_id, black_id) = if caller_is_red {
            (caller.device_id.clone(), opponent.device_id.clone())
        } else {
            (opponent.device_id.clone(), caller.device_id.clone())
        };
        let turn_timeout_seconds = effective_turn_timeout(
            caller.turn_timeout_seconds,
            opponent.turn_timeout_seconds,
            self.default_turn_timeout_seconds,
        );
        let game_id = Uuid::new_v4().to_string();
        let game = GameRecord {
            id: game_id.clone(),
            red_device_id: red_id,
            black_device_id: black_id,
            status: GameStatus::Active,
            turn_timeout_seconds,
            red_rollback_budget: 3,
            black_rollback_budget: 3,
            total_moves: 0,
            created_at: chrono::Utc::now().timestamp(),
            winner_device_id: None,
            result: None,
        };

        if let Err(err) = self.games.create(&game).await {
            tracing::warn!(error = %err, "match persistence failed, rolling back queue entries");
            self.store.reinsert(caller.clone(), opponent.clone());
            return Err(err.into());
        }

        let caller_color = if caller_is_red { Color::Red } else { Color::Black };
        let opponent_color = caller_color.opposite();

        self.store.put_mailbox(
            &caller.device_id,
            MailboxEntry {
                game_id: game_id.clone(),
                opponent_device_id: opponent.device_id.clone(),
                opponent_name: opponent.display_name.clone(),
                assigned_color: caller_color,
            },
        );
        self.store.put_mailbox(
            &opponent.device_id,
            MailboxEntry {
                game_id: game_id.clone(),
                opponent_device_id: caller.device_id.clone(),
                opponent_name: caller.display_name.clone(),
                assigned_color: opponent_color,
            },
        );

        Ok(JoinOutcome::Matched {
            game_id,
            opponent_device_id: opponent.device_id,
            opponent_name: opponent.display_name,
            assigned_color: caller_color,
        })
    }

    /// Idempotent: leaving a device id that isn't queued is a no-op.
    pub fn leave(&self, device_id: &str) {
        self.store.leave(device_id);
    }

    pub fn status(&self, device_id: &str) -> Status {
        if let Some(mailbox) = self.store.peek_mailbox(device_id) {
            return mailbox_to_status(mailbox);
        }
        match self.store.position(device_id) {
            Some(position) => Status::Waiting {
                position,
                estimated_wait_seconds: position * 10,
            },
            None => Status::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::sqlite::{Database, SqliteGameRepository};

    async fn new_matchmaker() -> Matchmaker<InMemoryQueueStore, SqliteGameRepository> {
        let db = Database::new_in_memory().await.unwrap();
        let games = Arc::new(SqliteGameRepository::new(db.pool().clone()));
        let store = Arc::new(InMemoryQueueStore::new());
        Matchmaker::new(store, games, 300)
    }

    #[tokio::test]
    async fn first_joiner_waits_second_joiner_matches() {
        let mm = new_matchmaker().await;

        let a = mm
            .join("device-a".into(), "Alice".into(), 0)
            .await
            .unwrap();
        assert_eq!(
            a,
            JoinOutcome::Waiting {
                position: 1,
                estimated_wait_seconds: 10
            }
        );

        let b = mm
            .join("device-b".into(), "Bob".into(), 0)
            .await
            .unwrap();
        let JoinOutcome::Matched {
            game_id,
            opponent_device_id,
            assigned_color,
            ..
        } = b
        else {
            panic!("expected a match");
        };
        assert_eq!(opponent_device_id, "device-a");

        // A's status query must now also reveal the match (mailbox window).
        let a_status = mm.status("device-a");
        match a_status {
            Status::Matched {
                game_id: gid,
                assigned_color: color,
                ..
            } => {
                assert_eq!(gid, game_id);
                assert_eq!(color, assigned_color.opposite());
            }
            other => panic!("expected Matched, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_join_is_rejected() {
        let mm = new_matchmaker().await;
        mm.join("device-a".into(), "Alice".into(), 0).await.unwrap();
        let err = mm
            .join("device-a".into(), "Alice".into(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, MatchmakerError::AlreadyInQueue));
    }

    #[tokio::test]
    async fn leave_is_idempotent_and_clears_waiting_status() {
        let mm = new_matchmaker().await;
        mm.join("device-a".into(), "Alice".into(), 0).await.unwrap();
        mm.leave("device-a");
        mm.leave("device-a");
        assert_eq!(mm.status("device-a"), Status::Idle);
    }

    #[tokio::test]
    async fn effective_timeout_prefers_smaller_nonzero_value() {
        let mm = new_matchmaker().await;
        mm.join("device-a".into(), "Alice".into(), 120)
            .await
            .unwrap();
        mm.join("device-b".into(), "Bob".into(), 0).await.unwrap();
        // both zero defaults to 300; one nonzero wins over zero/unset.
        assert_eq!(
            effective_turn_timeout(120, 0, mm.default_turn_timeout_seconds),
            120
        );
        assert_eq!(effective_turn_timeout(0, 0, mm.default_turn_timeout_seconds), 300);
        assert_eq!(effective_turn_timeout(90, 45, 300), 45);
    }

    /// §8 statistical fairness check: over many independent pairings the
    /// color assigned to the first joiner should land within
    /// `3 * sqrt(n)` of an even 50/50 split.
    #[tokio::test]
    async fn color_assignment_is_fair_over_many_trials() {
        let trials = 400;
        let mut red_count_for_first = 0u32;
        for i in 0..trials {
            let mm = new_matchmaker().await;
            let device_a = format!("a-{i}");
            let device_b = format!("b-{i}");
            mm.join(device_a.clone(), "A".into(), 0).await.unwrap();
            let outcome = mm.join(device_b, "B".into(), 0).await.unwrap();
            let JoinOutcome::Matched { assigned_color, .. } = outcome else {
                panic!("expected match");
            };
            // `assigned_color` is B's color; A's is the opposite.
            if assigned_color.opposite() == Color::Red {
                red_count_for_first += 1;
            }
        }
        let n = trials as f64;
        let deviation = (red_count_for_first as f64 - 0.5 * n).abs();
        assert!(
            deviation <= 3.0 * n.sqrt(),
            "deviation {deviation} exceeds 3*sqrt(n) = {}",
            3.0 * n.sqrt()
        );
    }
}
