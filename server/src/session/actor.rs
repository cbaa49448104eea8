//! The session actor (§4.3): the only task that ever touches a
//! `SessionState`. Everything else — handles, the bus, the matchmaker —
//! talks to it exclusively through `SessionCommand`s.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::Instrument;

use xiangqi::{Classification, Color};

use crate::persistence::{GameRepository, GameResult, GameStatus, MoveRepository, StoredMove, UserRepository};
use crate::timer::{self, TimerHandle};

use super::commands::{SessionCommand, SessionError};
use super::events::SessionEvent;
use super::snapshot::SessionSnapshot;
use super::state::{Phase, SessionState};
use super::SessionManager;

const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(30);
const DISCONNECT_GRACE: Duration = Duration::from_secs(60);
/// How long a terminal session lingers before `SessionManager` drops it,
/// so a just-finished client's final `get_snapshot`/reattach still finds
/// the actor alive.
const SESSION_DRAIN_DELAY: Duration = Duration::from_secs(30);

pub(crate) async fn run_session_actor<G, M, U>(
    state: SessionState,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    cmd_tx: mpsc::Sender<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
    games: Arc<G>,
    moves: Arc<M>,
    users: Arc<U>,
    manager: Option<Arc<SessionManager<G, M, U>>>,
) where
    G: GameRepository + 'static,
    M: MoveRepository + 'static,
    U: UserRepository + 'static,
{
    let game_id = state.game_id.clone();
    run_inner(state, cmd_rx, cmd_tx, event_tx, games, moves, users, manager)
        .instrument(tracing::info_span!("session", id = %game_id))
        .await;
}

struct Actor<G, M, U> {
    state: SessionState,
    cmd_tx: mpsc::Sender<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
    games: Arc<G>,
    moves: Arc<M>,
    users: Arc<U>,
    manager: Option<Arc<SessionManager<G, M, U>>>,
    timer: Option<TimerHandle>,
}

async fn run_inner<G, M, U>(
    state: SessionState,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    cmd_tx: mpsc::Sender<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
    games: Arc<G>,
    moves: Arc<M>,
    users: Arc<U>,
    manager: Option<Arc<SessionManager<G, M, U>>>,
) where
    G: GameRepository + 'static,
    M: MoveRepository + 'static,
    U: UserRepository + 'static,
{
    tracing::info!("session actor started");
    let mut actor = Actor { state, cmd_tx, event_tx, games, moves, users, manager, timer: None };

    while let Some(cmd) = cmd_rx.recv().await {
        if matches!(cmd, SessionCommand::Shutdown) {
            if let Some(timer) = &actor.timer {
                timer.stop().await;
            }
            break;
        }
        actor.handle(cmd).await;
    }

    tracing::info!("session actor exited");
}

impl<G, M, U> Actor<G, M, U>
where
    G: GameRepository,
    M: MoveRepository,
    U: UserRepository,
{
    async fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::AttachSeat { device_id, reply } => {
                let result = self.attach_seat(device_id).await;
                let _ = reply.send(result);
            }
            SessionCommand::DetachSeat { device_id } => {
                self.detach_seat(device_id).await;
            }
            SessionCommand::MakeMove { device_id, from, to, piece, reply } => {
                let result = self.make_move(device_id, from, to, piece).await;
                let _ = reply.send(result);
            }
            SessionCommand::RollbackRequest { device_id, reply } => {
                let result = self.rollback_request(device_id).await;
                let _ = reply.send(result);
            }
            SessionCommand::RollbackResponse { device_id, accept, reply } => {
                let result = self.rollback_response(device_id, accept).await;
                let _ = reply.send(result);
            }
            SessionCommand::DrawOffer { device_id, reply } => {
                let result = self.draw_offer(device_id).await;
                let _ = reply.send(result);
            }
            SessionCommand::DrawResponse { device_id, accept, reply } => {
                let result = self.draw_response(device_id, accept).await;
                let _ = reply.send(result);
            }
            SessionCommand::Resign { device_id, reply } => {
                let result = self.resign(device_id).await;
                let _ = reply.send(result);
            }
            SessionCommand::GetSnapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
            SessionCommand::Subscribe { reply } => {
                let snapshot = self.state.snapshot();
                let rx = self.event_tx.subscribe();
                let _ = reply.send((snapshot, rx));
            }
            SessionCommand::NegotiationTimedOut { epoch } => {
                self.negotiation_timed_out(epoch).await;
            }
            SessionCommand::DisconnectGraceElapsed { epoch } => {
                self.disconnect_grace_elapsed(epoch).await;
            }
            SessionCommand::TimerTick { red_seconds, black_seconds } => {
                self.state.set_remaining_seconds(red_seconds, black_seconds);
                let _ = self.event_tx.send(SessionEvent::Timer { red_seconds, black_seconds });
            }
            SessionCommand::TimerExpired { color } => {
                self.timer_expired(color).await;
            }
            SessionCommand::Shutdown => unreachable!("handled by the outer loop"),
        }
    }

    async fn attach_seat(
        &mut self,
        device_id: String,
    ) -> Result<(SessionSnapshot, broadcast::Receiver<SessionEvent>), SessionError> {
        let color = self.state.seat_color(&device_id).ok_or(SessionError::NotASeat)?;
        match color {
            Color::Red => self.state.red_connected = true,
            Color::Black => self.state.black_connected = true,
        }
        let _ = self
            .event_tx
            .send(SessionEvent::ConnectionStatus { device_id: device_id.clone(), color, connected: true });

        if self.state.phase == Phase::Pregame && self.state.both_connected() {
            self.state.phase = Phase::Playing;
            let timer = timer::spawn(self.cmd_tx.clone(), self.state.turn_timeout_seconds);
            timer
                .start(Color::Red, self.state.red_remaining_seconds, self.state.black_remaining_seconds)
                .await;
            self.timer = Some(timer);
        } else if self.state.both_connected() {
            // Reattachment after the other seat dropped alone: invalidate
            // the pending disconnect-grace task. Only resume the clock if
            // it was paused for the disconnect itself — an outstanding
            // rollback negotiation owns its own pause/resume independent
            // of connection state.
            self.state.disconnect_epoch += 1;
            if self.state.timer_runs() {
                if let Some(timer) = &self.timer {
                    timer.resume().await;
                }
            }
        }

        self.broadcast_state();
        Ok((self.state.snapshot(), self.event_tx.subscribe()))
    }

    async fn detach_seat(&mut self, device_id: String) {
        let Some(color) = self.state.seat_color(&device_id) else { return };
        match color {
            Color::Red => self.state.red_connected = false,
            Color::Black => self.state.black_connected = false,
        }
        let _ = self
            .event_tx
            .send(SessionEvent::ConnectionStatus { device_id: device_id.clone(), color, connected: false });

        if self.state.is_live() && !self.state.both_connected() {
            // Only pause here if the clock was actually ticking; a
            // negotiating rollback already paused it itself and owns its
            // own resume.
            if self.state.timer_runs() {
                if let Some(timer) = &self.timer {
                    timer.pause().await;
                }
            }
            self.state.disconnect_epoch += 1;
            let epoch = self.state.disconnect_epoch;
            let cmd_tx = self.cmd_tx.clone();
            tokio::spawn(async move {
                time::sleep(DISCONNECT_GRACE).await;
                let _ = cmd_tx.send(SessionCommand::DisconnectGraceElapsed { epoch }).await;
            });
        }
        self.broadcast_state();
    }

    async fn disconnect_grace_elapsed(&mut self, epoch: u64) {
        if epoch != self.state.disconnect_epoch || self.state.is_terminal() {
            return;
        }
        if self.state.both_connected() {
            return;
        }
        let winner_color = if self.state.red_connected {
            Some(Color::Red)
        } else if self.state.black_connected {
            Some(Color::Black)
        } else {
            None
        };
        let winner_device_id = winner_color.map(|c| self.state.device_id_for(c).to_string());
        self.state.end_by_abandonment(winner_device_id.clone());
        self.finish_game(GameResult::Abandonment, winner_device_id, None).await;
        self.broadcast_state();
    }

    async fn make_move(
        &mut self,
        device_id: String,
        from: xiangqi::Square,
        to: xiangqi::Square,
        piece: xiangqi::PieceKind,
    ) -> Result<SessionSnapshot, SessionError> {
        let before = self.state.clone();
        let applied = self.state.try_apply_move(&device_id, from, to, piece)?;

        let stored = StoredMove {
            game_id: self.state.game_id.clone(),
            move_number: self.state.game.move_count() as u32,
            mover_device_id: device_id.clone(),
            from_square: from.to_notation(),
            to_square: to.to_notation(),
            piece_type: piece.as_str().to_string(),
            captured_piece_type: applied.record.captured.map(|k| k.as_str().to_string()),
            is_check: applied.record.is_check,
            created_at: now(),
        };
        if let Err(err) = self.moves.create(&stored).await {
            tracing::error!(error = %err, "failed to persist move, reverting in-memory state");
            self.state = before;
            return Err(SessionError::MoveFailed(err.to_string()));
        }

        if applied.implicitly_declined_draw {
            let _ = self.event_tx.send(SessionEvent::DrawDeclined);
        }

        if let Some(timer) = &self.timer {
            timer
                .switch(applied.color.opposite(), Some((applied.color, self.state.turn_timeout_seconds)))
                .await;
        }
        match applied.color {
            Color::Red => self.state.red_remaining_seconds = self.state.turn_timeout_seconds,
            Color::Black => self.state.black_remaining_seconds = self.state.turn_timeout_seconds,
        }

        let _ = self.event_tx.send(SessionEvent::OpponentMove {
            mover_color: applied.color,
            move_number: self.state.game.move_count(),
            record: applied.record.clone(),
        });

        match applied.classification {
            Classification::Checkmate => {
                let winner_device_id = self.state.device_id_for(applied.color).to_string();
                self.state.end_by_classification(GameResult::Checkmate, winner_device_id.clone());
                self.finish_game(GameResult::Checkmate, Some(winner_device_id), None).await;
            }
            // In Xiangqi the side left with no legal reply loses, unlike
            // international chess: the mover who caused the stalemate wins.
            Classification::Stalemate => {
                let winner_device_id = self.state.device_id_for(applied.color).to_string();
                self.state.end_by_classification(GameResult::Stalemate, winner_device_id.clone());
                self.finish_game(GameResult::Stalemate, Some(winner_device_id), None).await;
            }
            Classification::Check | Classification::None => {}
        }

        self.persist_progress().await;
        self.broadcast_state();
        Ok(self.state.snapshot())
    }

    async fn rollback_request(&mut self, device_id: String) -> Result<(), SessionError> {
        let (requester, target) = self.state.begin_rollback_request(&device_id)?;
        if let Some(timer) = &self.timer {
            timer.pause().await;
        }
        self.spawn_negotiation_timeout();
        let _ = self
            .event_tx
            .send(SessionEvent::RollbackRequested { requested_by: requester, target_move_number: target });
        self.broadcast_state();
        Ok(())
    }

    async fn rollback_response(&mut self, device_id: String, accept: bool) -> Result<(), SessionError> {
        let (requester, target_move_number) = match &self.state.phase {
            Phase::NegotiatingRollback { requester, target_move_number } => (*requester, *target_move_number),
            _ => return Err(SessionError::NoPendingRequest),
        };
        let accepted = self.state.resolve_rollback_response(&device_id, accept)?;
        if accepted {
            if let Err(err) = self
                .moves
                .delete_after(&self.state.game_id, target_move_number.saturating_sub(1) as u32)
                .await
            {
                tracing::error!(error = %err, "failed to delete rolled-back moves");
            }
        }
        self.after_rollback_resolution(accepted, requester).await;
        Ok(())
    }

    async fn negotiation_timed_out(&mut self, epoch: u64) {
        if epoch != self.state.negotiation_epoch {
            return;
        }
        match &self.state.phase {
            Phase::NegotiatingRollback { requester, .. } => {
                let requester = *requester;
                self.state.timeout_rollback();
                self.after_rollback_resolution(false, requester).await;
            }
            Phase::NegotiatingDraw { .. } => {
                self.state.timeout_draw();
                let _ = self.event_tx.send(SessionEvent::DrawDeclined);
                self.broadcast_state();
            }
            _ => {}
        }
    }

    async fn after_rollback_resolution(&mut self, accepted: bool, requester: Color) {
        if let Some(timer) = &self.timer {
            if accepted {
                timer.switch(requester, None).await;
            } else {
                timer.resume().await;
            }
        }
        let rollbacks_remaining = match requester {
            Color::Red => self.state.red_rollback_budget,
            Color::Black => self.state.black_rollback_budget,
        };
        let _ = self.event_tx.send(SessionEvent::RollbackResult { accepted, rollbacks_remaining });
        self.persist_progress().await;
        self.broadcast_state();
    }

    async fn draw_offer(&mut self, device_id: String) -> Result<(), SessionError> {
        let offerer = self.state.begin_draw_offer(&device_id)?;
        self.spawn_negotiation_timeout();
        let _ = self.event_tx.send(SessionEvent::DrawOffered { offered_by: offerer });
        self.broadcast_state();
        Ok(())
    }

    async fn draw_response(&mut self, device_id: String, accept: bool) -> Result<(), SessionError> {
        // `resolve_draw_response` already moves `phase` to `Terminal` on
        // accept, or back to `Playing` on decline.
        let accepted = self.state.resolve_draw_response(&device_id, accept)?;
        if accepted {
            self.finish_game(GameResult::Draw, None, None).await;
        } else {
            let _ = self.event_tx.send(SessionEvent::DrawDeclined);
        }
        self.broadcast_state();
        Ok(())
    }

    async fn resign(&mut self, device_id: String) -> Result<(), SessionError> {
        let winner = self.state.resign(&device_id)?;
        let winner_device_id = self.state.device_id_for(winner).to_string();
        self.finish_game(GameResult::Resignation, Some(winner_device_id), None).await;
        self.broadcast_state();
        Ok(())
    }

    async fn timer_expired(&mut self, color: Color) {
        if self.state.is_terminal() {
            return;
        }
        self.state.end_on_timeout(color);
        let winner_device_id = self.state.device_id_for(color.opposite()).to_string();
        self.finish_game(GameResult::Timeout, Some(winner_device_id), Some(color)).await;
        self.broadcast_state();
    }

    /// Stops the timer, persists the final row and stat updates, broadcasts
    /// `GameEnd`, and schedules this session's removal from the manager.
    /// Assumes `state.phase` has already been moved to `Terminal` by the
    /// caller. Never broadcasts `StateChanged`; callers still own that.
    async fn finish_game(&mut self, result: GameResult, winner_device_id: Option<String>, timeout_color: Option<Color>) {
        if let Some(timer) = &self.timer {
            timer.stop().await;
        }
        self.persist_terminal(result, winner_device_id.clone()).await;
        let winner_color = winner_device_id.as_deref().and_then(|id| self.state.seat_color(id));
        let _ = self.event_tx.send(SessionEvent::GameEnd { result, winner_device_id, winner_color, timeout_color });
        self.schedule_removal();
    }

    /// §6: a terminal session is torn down after a drain delay rather than
    /// immediately, so a trailing `get_snapshot`/reattach from a just-ended
    /// client still finds the actor alive.
    fn schedule_removal(&self) {
        let Some(manager) = self.manager.clone() else { return };
        let game_id = self.state.game_id.clone();
        tokio::spawn(async move {
            time::sleep(SESSION_DRAIN_DELAY).await;
            manager.remove(&game_id).await;
        });
    }

    async fn persist_terminal(&self, result: GameResult, winner_device_id: Option<String>) {
        match self.games.get_by_id(&self.state.game_id).await {
            Ok(Some(mut record)) => {
                record.status = GameStatus::Completed;
                record.result = Some(result);
                record.winner_device_id = winner_device_id.clone();
                record.total_moves = self.state.game.move_count() as u32;
                record.red_rollback_budget = self.state.red_rollback_budget;
                record.black_rollback_budget = self.state.black_rollback_budget;
                if let Err(err) = self.games.update(&record).await {
                    tracing::error!(error = %err, "failed to persist terminal game state");
                }
            }
            Ok(None) => tracing::error!("game record missing at terminal transition"),
            Err(err) => tracing::error!(error = %err, "failed to load game record for terminal transition"),
        }
        self.update_player_stats(result, winner_device_id).await;
    }

    /// §4.3: both players' aggregate stats are requested from the user
    /// collaborator on every terminal transition, win/loss/draw attributed
    /// from `winner_device_id` (a `None` winner with a `Draw` result counts
    /// as a draw for both; a `None` winner otherwise — an abandonment with
    /// neither seat reconnecting — only bumps `total_games`).
    async fn update_player_stats(&self, result: GameResult, winner_device_id: Option<String>) {
        let (red_outcome, black_outcome) = match &winner_device_id {
            Some(winner) if *winner == self.state.red_device_id => (StatOutcome::Win, StatOutcome::Loss),
            Some(winner) if *winner == self.state.black_device_id => (StatOutcome::Loss, StatOutcome::Win),
            None if result == GameResult::Draw => (StatOutcome::Draw, StatOutcome::Draw),
            _ => (StatOutcome::NoResult, StatOutcome::NoResult),
        };
        self.apply_stat_outcome(&self.state.red_device_id, red_outcome).await;
        self.apply_stat_outcome(&self.state.black_device_id, black_outcome).await;
    }

    async fn apply_stat_outcome(&self, device_id: &str, outcome: StatOutcome) {
        let mut stats = match self.users.get_by_id(device_id).await {
            Ok(existing) => existing.unwrap_or_default(),
            Err(err) => {
                tracing::error!(error = %err, device_id, "failed to load player stats");
                return;
            }
        };
        stats.total_games += 1;
        match outcome {
            StatOutcome::Win => stats.wins += 1,
            StatOutcome::Loss => stats.losses += 1,
            StatOutcome::Draw => stats.draws += 1,
            StatOutcome::NoResult => {}
        }
        if let Err(err) = self.users.update_stats(device_id, stats).await {
            tracing::error!(error = %err, device_id, "failed to persist player stats");
        }
    }

    async fn persist_progress(&self) {
        if self.state.is_terminal() {
            return;
        }
        match self.games.get_by_id(&self.state.game_id).await {
            Ok(Some(mut record)) => {
                record.total_moves = self.state.game.move_count() as u32;
                record.red_rollback_budget = self.state.red_rollback_budget;
                record.black_rollback_budget = self.state.black_rollback_budget;
                if let Err(err) = self.games.update(&record).await {
                    tracing::error!(error = %err, "failed to persist game progress");
                }
            }
            Ok(None) => tracing::error!("game record missing"),
            Err(err) => tracing::error!(error = %err, "failed to load game record"),
        }
    }

    fn spawn_negotiation_timeout(&self) {
        let epoch = self.state.negotiation_epoch;
        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            time::sleep(NEGOTIATION_TIMEOUT).await;
            let _ = cmd_tx.send(SessionCommand::NegotiationTimedOut { epoch }).await;
        });
    }

    fn broadcast_state(&self) {
        let _ = self.event_tx.send(SessionEvent::StateChanged(self.state.snapshot()));
    }
}

enum StatOutcome {
    Win,
    Loss,
    Draw,
    NoResult,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::sqlite::{Database, SqliteGameRepository, SqliteMoveRepository, SqliteUserRepository};
    use crate::persistence::GameRecord;
    use xiangqi::{PieceKind, Square};

    async fn spawn_test_actor() -> (super::super::handle::SessionHandle, broadcast::Receiver<SessionEvent>) {
        let db = Database::new_in_memory().await.expect("open in-memory db");
        let games = Arc::new(SqliteGameRepository::new(db.pool().clone()));
        let moves = Arc::new(SqliteMoveRepository::new(db.pool().clone()));
        let users = Arc::new(SqliteUserRepository::new(db.pool().clone()));

        let record = GameRecord {
            id: "game-1".into(),
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

        let state = SessionState::new(
            record.id.clone(),
            record.red_device_id.clone(),
            record.black_device_id.clone(),
            record.turn_timeout_seconds,
            record.red_rollback_budget,
            record.black_rollback_budget,
        );
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = broadcast::channel(32);
        tokio::spawn(run_session_actor(state, cmd_rx, cmd_tx.clone(), event_tx, games, moves, users, None));
        (super::super::handle::SessionHandle::new(record.id, cmd_tx), event_rx)
    }

    #[tokio::test]
    async fn attaching_both_seats_starts_the_game() {
        let (handle, _rx) = spawn_test_actor().await;
        let (snapshot, _) = handle.attach_seat("red-device".into()).await.unwrap();
        assert_eq!(snapshot.move_count, 0);
        let (snapshot, _) = handle.attach_seat("black-device".into()).await.unwrap();
        assert_eq!(snapshot.side_to_move, Color::Red);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn a_legal_move_switches_the_side_to_move() {
        let (handle, _rx) = spawn_test_actor().await;
        handle.attach_seat("red-device".into()).await.unwrap();
        handle.attach_seat("black-device".into()).await.unwrap();

        let snapshot = handle
            .make_move("red-device".into(), Square::new(1, 2), Square::new(1, 6), PieceKind::Cannon)
            .await
            .unwrap();
        assert_eq!(snapshot.side_to_move, Color::Black);
        assert_eq!(snapshot.move_count, 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn resign_ends_the_game_and_stops_accepting_moves() {
        let (handle, mut rx) = spawn_test_actor().await;
        handle.attach_seat("red-device".into()).await.unwrap();
        handle.attach_seat("black-device".into()).await.unwrap();

        handle.resign("red-device".into()).await.unwrap();

        let mut saw_end = false;
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::GameEnd { result: GameResult::Resignation, winner_color, .. } = event {
                assert_eq!(winner_color, Some(Color::Black));
                saw_end = true;
            }
        }
        assert!(saw_end, "expected a GameEnd event");

        let err = handle
            .make_move("black-device".into(), Square::new(1, 7), Square::new(1, 3), PieceKind::Cannon)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::GameEnded);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn draw_offer_declined_by_a_move_clears_the_negotiation() {
        let (handle, mut rx) = spawn_test_actor().await;
        handle.attach_seat("red-device".into()).await.unwrap();
        handle.attach_seat("black-device".into()).await.unwrap();

        handle
            .make_move("red-device".into(), Square::new(1, 2), Square::new(1, 6), PieceKind::Cannon)
            .await
            .unwrap();
        handle.draw_offer("red-device".into()).await.unwrap();

        // The non-offerer may still move; doing so implicitly declines.
        let snapshot = handle
            .make_move("black-device".into(), Square::new(1, 7), Square::new(1, 3), PieceKind::Cannon)
            .await
            .unwrap();
        assert_eq!(snapshot.move_count, 2);

        let mut saw_decline = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, SessionEvent::DrawDeclined) {
                saw_decline = true;
            }
        }
        assert!(saw_decline, "expected an implicit DrawDeclined");
        handle.shutdown().await;
    }
}
