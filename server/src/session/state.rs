//! Internal mutable state for one game session (§4.3). Owned entirely by
//! the session actor; no locks, no async. The Rules Engine validates move
//! legality; everything here is turn/phase bookkeeping on top of it.

use xiangqi::{Color, Game, MoveError, PieceKind, Square};

use super::commands::SessionError;
use super::snapshot::SessionSnapshot;
use crate::persistence::GameResult;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Phase {
    Pregame,
    Playing,
    NegotiatingRollback { requester: Color, target_move_number: usize },
    NegotiatingDraw { offerer: Color },
    Terminal { result: GameResult, winner_device_id: Option<String> },
}

/// Result of a successful `try_apply_move`, carrying enough for the actor
/// to persist the move, drive the timer, and broadcast events without
/// re-deriving them from `SessionState`.
pub(crate) struct MoveApplied {
    pub color: Color,
    pub record: xiangqi::MoveRecord,
    pub classification: xiangqi::Classification,
    pub implicitly_declined_draw: bool,
}

#[derive(Clone)]
pub(crate) struct SessionState {
    pub game_id: String,
    pub red_device_id: String,
    pub black_device_id: String,
    pub turn_timeout_seconds: u32,
    pub game: Game,
    pub red_rollback_budget: u8,
    pub black_rollback_budget: u8,
    pub phase: Phase,
    pub red_connected: bool,
    pub black_connected: bool,
    pub red_remaining_seconds: u32,
    pub black_remaining_seconds: u32,
    /// Bumped every time a negotiation opens or resolves, so an ad-hoc 30s
    /// timeout task started for a since-resolved negotiation is ignored.
    pub negotiation_epoch: u64,
    /// Same staleness guard for the disconnect-grace task (§5).
    pub disconnect_epoch: u64,
}

impl SessionState {
    pub fn new(
        game_id: String,
        red_device_id: String,
        black_device_id: String,
        turn_timeout_seconds: u32,
        red_rollback_budget: u8,
        black_rollback_budget: u8,
    ) -> Self {
        Self {
            game_id,
            red_device_id,
            black_device_id,
            turn_timeout_seconds,
            game: Game::new(),
            red_rollback_budget,
            black_rollback_budget,
            phase: Phase::Pregame,
            red_connected: false,
            black_connected: false,
            red_remaining_seconds: turn_timeout_seconds,
            black_remaining_seconds: turn_timeout_seconds,
            negotiation_epoch: 0,
            disconnect_epoch: 0,
        }
    }

    pub fn seat_color(&self, device_id: &str) -> Option<Color> {
        if device_id == self.red_device_id {
            Some(Color::Red)
        } else if device_id == self.black_device_id {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn device_id_for(&self, color: Color) -> &str {
        match color {
            Color::Red => &self.red_device_id,
            Color::Black => &self.black_device_id,
        }
    }

    pub fn opponent_device_id(&self, color: Color) -> &str {
        self.device_id_for(color.opposite())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Terminal { .. })
    }

    pub fn both_connected(&self) -> bool {
        self.red_connected && self.black_connected
    }

    /// True for any phase where a dropped seat should start the
    /// disconnect-grace clock — the game is underway and not yet decided.
    /// `Pregame` doesn't count: a seat that never attached isn't "leaving".
    pub fn is_live(&self) -> bool {
        !matches!(self.phase, Phase::Pregame | Phase::Terminal { .. })
    }

    /// True when the turn timer is actually ticking in the current phase,
    /// as opposed to already paused by an outstanding rollback negotiation
    /// (which owns its own pause/resume independent of connection state).
    pub fn timer_runs(&self) -> bool {
        matches!(self.phase, Phase::Playing | Phase::NegotiatingDraw { .. })
    }

    pub fn decrement_rollback_budget(&mut self, color: Color) {
        match color {
            Color::Red => self.red_rollback_budget = self.red_rollback_budget.saturating_sub(1),
            Color::Black => self.black_rollback_budget = self.black_rollback_budget.saturating_sub(1),
        }
    }

    pub fn set_remaining_seconds(&mut self, red: u32, black: u32) {
        self.red_remaining_seconds = red;
        self.black_remaining_seconds = black;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let classification = self.game.classify();
        SessionSnapshot {
            game_id: self.game_id.clone(),
            board_notation: self.game.board().to_string(),
            side_to_move: self.game.side_to_move(),
            move_count: self.game.move_count(),
            red_rollback_budget: self.red_rollback_budget,
            black_rollback_budget: self.black_rollback_budget,
            red_remaining_seconds: self.red_remaining_seconds,
            black_remaining_seconds: self.black_remaining_seconds,
            in_check: matches!(
                classification,
                xiangqi::Classification::Check | xiangqi::Classification::Checkmate
            ),
            history: self.game.history().to_vec(),
        }
    }

    /// §4.3 `move`. Turn/phase ownership is checked here; square-level
    /// legality is delegated to `Game::apply_move`.
    ///
    /// A move arriving during `NegotiatingDraw` is allowed from the
    /// non-offerer ("offering a draw is not a turn") and implicitly
    /// declines the outstanding offer; `NegotiatingRollback` still blocks
    /// every move until resolved.
    pub fn try_apply_move(
        &mut self,
        device_id: &str,
        from: Square,
        to: Square,
        piece: PieceKind,
    ) -> Result<MoveApplied, SessionError> {
        let color = self.seat_color(device_id).ok_or(SessionError::NotASeat)?;
        if self.is_terminal() {
            return Err(SessionError::GameEnded);
        }
        let implicitly_declined_draw = match self.phase {
            Phase::Playing => false,
            Phase::NegotiatingDraw { .. } => true,
            _ => return Err(SessionError::NotPlaying),
        };
        if color != self.game.side_to_move() {
            return Err(SessionError::NotYourTurn);
        }
        let record = self
            .game
            .apply_move(from, to, piece)
            .map_err(|err| match err {
                MoveError::Illegal => SessionError::IllegalMove,
                MoveError::NoPieceAtSource | MoveError::NotMoversPiece | MoveError::PieceKindMismatch => {
                    SessionError::IllegalMove
                }
            })?;
        if implicitly_declined_draw {
            self.phase = Phase::Playing;
            self.negotiation_epoch += 1;
        }
        let classification = self.game.classify();
        Ok(MoveApplied { color, record, classification, implicitly_declined_draw })
    }

    /// §4.3 `rollback_request`. Returns the target move number the
    /// negotiation opens against.
    pub fn begin_rollback_request(&mut self, device_id: &str) -> Result<(Color, usize), SessionError> {
        let color = self.seat_color(device_id).ok_or(SessionError::NotASeat)?;
        if self.is_terminal() {
            return Err(SessionError::GameEnded);
        }
        if self.phase != Phase::Playing {
            return Err(SessionError::RollbackPending);
        }
        let move_count = self.game.move_count();
        if move_count == 0 || self.game.side_to_move() == color {
            // Either nobody has moved yet, or it's the requester's own
            // turn — meaning their last move isn't the latest ply.
            return Err(SessionError::NotYourTurn);
        }
        let budget = match color {
            Color::Red => self.red_rollback_budget,
            Color::Black => self.black_rollback_budget,
        };
        if budget == 0 {
            return Err(SessionError::NoRollbacksRemaining);
        }
        self.phase = Phase::NegotiatingRollback { requester: color, target_move_number: move_count };
        self.negotiation_epoch += 1;
        Ok((color, move_count))
    }

    /// §4.3 `rollback_response`. `None` accept value means the 30s
    /// negotiation window elapsed.
    pub fn resolve_rollback_response(
        &mut self,
        device_id: &str,
        accept: bool,
    ) -> Result<bool, SessionError> {
        let Phase::NegotiatingRollback { requester, target_move_number } = &self.phase else {
            return Err(SessionError::NoPendingRequest);
        };
        let (requester, target_move_number) = (*requester, *target_move_number);
        let responder = self.seat_color(device_id).ok_or(SessionError::NotASeat)?;
        if responder != requester.opposite() {
            return Err(SessionError::NotTheResponder);
        }
        self.resolve_rollback(accept, requester, target_move_number);
        Ok(accept)
    }

    pub fn timeout_rollback(&mut self) {
        if let Phase::NegotiatingRollback { requester, target_move_number } = &self.phase {
            let (requester, target_move_number) = (*requester, *target_move_number);
            self.resolve_rollback(false, requester, target_move_number);
        }
    }

    fn resolve_rollback(&mut self, accept: bool, requester: Color, target_move_number: usize) {
        if accept {
            self.game.truncate_and_replay(target_move_number.saturating_sub(1));
            self.decrement_rollback_budget(requester);
        }
        self.phase = Phase::Playing;
        self.negotiation_epoch += 1;
    }

    /// §4.3 `draw_offer`. Offering is not a turn — either seat may offer
    /// regardless of whose move it is.
    pub fn begin_draw_offer(&mut self, device_id: &str) -> Result<Color, SessionError> {
        let color = self.seat_color(device_id).ok_or(SessionError::NotASeat)?;
        if self.is_terminal() {
            return Err(SessionError::GameEnded);
        }
        if self.phase != Phase::Playing {
            return Err(SessionError::RollbackPending);
        }
        self.phase = Phase::NegotiatingDraw { offerer: color };
        self.negotiation_epoch += 1;
        Ok(color)
    }

    pub fn resolve_draw_response(&mut self, device_id: &str, accept: bool) -> Result<bool, SessionError> {
        let Phase::NegotiatingDraw { offerer } = &self.phase else {
            return Err(SessionError::NoPendingRequest);
        };
        let offerer = *offerer;
        let responder = self.seat_color(device_id).ok_or(SessionError::NotASeat)?;
        if responder != offerer.opposite() {
            return Err(SessionError::NotTheResponder);
        }
        self.resolve_draw(accept);
        Ok(accept)
    }

    pub fn timeout_draw(&mut self) {
        if matches!(self.phase, Phase::NegotiatingDraw { .. }) {
            self.resolve_draw(false);
        }
    }

    fn resolve_draw(&mut self, accept: bool) {
        self.negotiation_epoch += 1;
        if accept {
            self.phase = Phase::Terminal { result: GameResult::Draw, winner_device_id: None };
        } else {
            self.phase = Phase::Playing;
        }
    }

    /// §4.3 `resign`. Allowed any time before the game is already over.
    pub fn resign(&mut self, device_id: &str) -> Result<Color, SessionError> {
        let color = self.seat_color(device_id).ok_or(SessionError::NotASeat)?;
        if self.is_terminal() {
            return Err(SessionError::GameEnded);
        }
        let winner = color.opposite();
        self.phase = Phase::Terminal {
            result: GameResult::Resignation,
            winner_device_id: Some(self.device_id_for(winner).to_string()),
        };
        Ok(winner)
    }

    pub fn end_on_timeout(&mut self, expired_color: Color) {
        let winner = expired_color.opposite();
        self.phase = Phase::Terminal {
            result: GameResult::Timeout,
            winner_device_id: Some(self.device_id_for(winner).to_string()),
        };
    }

    /// Terminal transition driven by the Rules Engine's own classification
    /// of the position after a move (checkmate or a losing stalemate).
    pub fn end_by_classification(&mut self, result: GameResult, winner_device_id: String) {
        self.phase = Phase::Terminal { result, winner_device_id: Some(winner_device_id) };
    }

    /// §5: both seats failed to reconnect within the disconnect-grace
    /// window. `winner_device_id` is `None` if neither seat came back.
    pub fn end_by_abandonment(&mut self, winner_device_id: Option<String>) {
        self.phase = Phase::Terminal { result: GameResult::Abandonment, winner_device_id };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_state() -> SessionState {
        SessionState::new("g1".into(), "red-device".into(), "black-device".into(), 300, 3, 3)
    }

    #[test]
    fn move_rejected_before_playing() {
        let mut state = new_state();
        let err = state
            .try_apply_move("red-device", Square::new(1, 2), Square::new(1, 6), PieceKind::Cannon)
            .unwrap_err();
        assert_eq!(err, SessionError::NotPlaying);
    }

    #[test]
    fn move_out_of_turn_is_rejected() {
        let mut state = new_state();
        state.phase = Phase::Playing;
        let err = state
            .try_apply_move("black-device", Square::new(1, 7), Square::new(1, 3), PieceKind::Cannon)
            .unwrap_err();
        assert_eq!(err, SessionError::NotYourTurn);
    }

    #[test]
    fn rollback_request_requires_a_move_and_budget() {
        let mut state = new_state();
        state.phase = Phase::Playing;
        let err = state.begin_rollback_request("red-device").unwrap_err();
        assert_eq!(err, SessionError::NotYourTurn);

        state
            .try_apply_move("red-device", Square::new(1, 2), Square::new(1, 6), PieceKind::Cannon)
            .unwrap();
        let (color, target) = state.begin_rollback_request("red-device").unwrap();
        assert_eq!(color, Color::Red);
        assert_eq!(target, 1);
        assert!(matches!(state.phase, Phase::NegotiatingRollback { .. }));
    }

    #[test]
    fn rollback_accept_restores_requesters_turn_and_spends_budget() {
        let mut state = new_state();
        state.phase = Phase::Playing;
        state
            .try_apply_move("red-device", Square::new(1, 2), Square::new(1, 6), PieceKind::Cannon)
            .unwrap();
        state.begin_rollback_request("red-device").unwrap();

        let accepted = state.resolve_rollback_response("black-device", true).unwrap();
        assert!(accepted);
        assert_eq!(state.red_rollback_budget, 2);
        assert_eq!(state.game.move_count(), 0);
        assert_eq!(state.game.side_to_move(), Color::Red);
        assert_eq!(state.phase, Phase::Playing);
    }

    #[test]
    fn rollback_response_from_requester_is_rejected() {
        let mut state = new_state();
        state.phase = Phase::Playing;
        state
            .try_apply_move("red-device", Square::new(1, 2), Square::new(1, 6), PieceKind::Cannon)
            .unwrap();
        state.begin_rollback_request("red-device").unwrap();
        let err = state.resolve_rollback_response("red-device", true).unwrap_err();
        assert_eq!(err, SessionError::NotTheResponder);
    }

    #[test]
    fn draw_offer_and_decline_returns_to_playing() {
        let mut state = new_state();
        state.phase = Phase::Playing;
        state.begin_draw_offer("red-device").unwrap();
        let accepted = state.resolve_draw_response("black-device", false).unwrap();
        assert!(!accepted);
        assert_eq!(state.phase, Phase::Playing);
    }

    #[test]
    fn draw_accept_ends_the_game_as_a_draw() {
        let mut state = new_state();
        state.phase = Phase::Playing;
        state.begin_draw_offer("black-device").unwrap();
        state.resolve_draw_response("red-device", true).unwrap();
        assert!(matches!(
            state.phase,
            Phase::Terminal { result: GameResult::Draw, winner_device_id: None }
        ));
    }

    #[test]
    fn resign_ends_the_game_with_the_opponent_winning() {
        let mut state = new_state();
        state.phase = Phase::Playing;
        let winner = state.resign("red-device").unwrap();
        assert_eq!(winner, Color::Black);
        assert!(matches!(state.phase, Phase::Terminal { result: GameResult::Resignation, .. }));
    }

    #[test]
    fn timeout_ends_the_game_for_the_expired_side() {
        let mut state = new_state();
        state.phase = Phase::Playing;
        state.end_on_timeout(Color::Red);
        match state.phase {
            Phase::Terminal { result: GameResult::Timeout, winner_device_id } => {
                assert_eq!(winner_device_id, Some("black-device".to_string()));
            }
            other => panic!("expected Terminal/Timeout, got {other:?}"),
        }
    }
}
