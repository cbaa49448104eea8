//! Commands sent to a session actor (§4.3). Every request the public API
//! can make embeds a `oneshot` reply; events fed back by the timer and the
//! ad-hoc negotiation/grace timeout tasks carry none — they are posted
//! into the same queue as client commands so the actor never needs a
//! second inbox.

use tokio::sync::{broadcast, oneshot};

use xiangqi::{Color, PieceKind, Square};

use super::events::SessionEvent;
use super::snapshot::SessionSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("seat does not belong to this game")]
    NotASeat,
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("the game has already ended")]
    GameEnded,
    #[error("moves are not accepted while a negotiation is outstanding or before both seats attach")]
    NotPlaying,
    #[error("illegal move")]
    IllegalMove,
    #[error("no rollback requests remaining")]
    NoRollbacksRemaining,
    #[error("a negotiation is already pending")]
    RollbackPending,
    #[error("there is no pending request to respond to")]
    NoPendingRequest,
    #[error("it is not the opponent's turn to respond")]
    NotTheResponder,
    #[error("failed to persist move: {0}")]
    MoveFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Commands a `SessionHandle` can issue, plus the internal events the turn
/// timer and ad-hoc timeout tasks post back into the same queue.
pub enum SessionCommand {
    AttachSeat {
        device_id: String,
        reply:
            oneshot::Sender<Result<(SessionSnapshot, broadcast::Receiver<SessionEvent>), SessionError>>,
    },
    DetachSeat {
        device_id: String,
    },
    MakeMove {
        device_id: String,
        from: Square,
        to: Square,
        piece: PieceKind,
        reply: oneshot::Sender<Result<SessionSnapshot, SessionError>>,
    },
    RollbackRequest {
        device_id: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    RollbackResponse {
        device_id: String,
        accept: bool,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    DrawOffer {
        device_id: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    DrawResponse {
        device_id: String,
        accept: bool,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Resign {
        device_id: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    GetSnapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Subscribe {
        reply: oneshot::Sender<(SessionSnapshot, broadcast::Receiver<SessionEvent>)>,
    },
    /// Fired by an ad-hoc 30s task started when a negotiation opens; `epoch`
    /// lets the actor ignore a timeout that fired for an already-resolved
    /// negotiation.
    NegotiationTimedOut {
        epoch: u64,
    },
    /// Fired by an ad-hoc grace task started when the second seat detaches;
    /// same staleness guard as above.
    DisconnectGraceElapsed {
        epoch: u64,
    },
    TimerTick {
        red_seconds: u32,
        black_seconds: u32,
    },
    TimerExpired {
        color: Color,
    },
    Shutdown,
}
