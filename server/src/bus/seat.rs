//! One actix actor per attached seat (§4.5). Bridges a raw WebSocket to a
//! `SessionHandle`: inbound wire frames become session commands, session
//! events become outbound wire frames.

use std::time::{Duration, Instant};

use actix::prelude::*;
use actix::fut::ActorFutureExt;
use actix_web_actors::ws;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;

use xiangqi::Color;

use crate::session::{SessionEvent, SessionHandle, SessionSnapshot};
use crate::wire::{self, InboundMessage, OutboundMessage};

/// Ping cadence. The spec calls for "approximately every 54s"; actix's
/// `run_interval` jitter is irrelevant at this grain.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(54);
/// A seat that hasn't produced a successful read in this long is dead.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_INBOUND_FRAME_BYTES: usize = 512;
/// Bounded outbound buffer per seat. A full buffer means a stalled client;
/// the bus drops the seat rather than let it block the broadcast.
const OUTBOUND_BUFFER_DEPTH: usize = 256;

pub struct WsSeat {
    game_id: String,
    device_id: String,
    color: Color,
    session: SessionHandle,
    last_read: Instant,
    initial_snapshot: Option<SessionSnapshot>,
    events: Option<broadcast::Receiver<SessionEvent>>,
}

impl WsSeat {
    pub fn new(
        game_id: String,
        device_id: String,
        color: Color,
        session: SessionHandle,
        initial_snapshot: SessionSnapshot,
        events: broadcast::Receiver<SessionEvent>,
    ) -> Self {
        Self {
            game_id,
            device_id,
            color,
            session,
            last_read: Instant::now(),
            initial_snapshot: Some(initial_snapshot),
            events: Some(events),
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_read) > CLIENT_TIMEOUT {
                tracing::info!(device_id = %act.device_id, game_id = %act.game_id, "seat heartbeat timeout");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        self.last_read = Instant::now();
        if text.len() > MAX_INBOUND_FRAME_BYTES {
            tracing::warn!(device_id = %self.device_id, len = text.len(), "inbound frame too large, dropping seat");
            ctx.stop();
            return;
        }

        let message = match wire::decode_inbound(text) {
            Ok(message) => message,
            Err(err) => {
                let code = match err {
                    wire::WireError::InvalidMessage => "invalid_message",
                    wire::WireError::UnknownType => "unknown_type",
                };
                send_now(ctx, OutboundMessage::Error(wire::ErrorPayload { code, message: err.to_string() }));
                return;
            }
        };

        match message {
            InboundMessage::Join => {
                let session = self.session.clone();
                let game_id = self.game_id.clone();
                spawn_reply(ctx, async move { session.get_snapshot().await }, move |res, ctx| {
                    match res {
                        Ok(snapshot) => send_now(ctx, OutboundMessage::GameState(game_state_payload(&game_id, &snapshot))),
                        Err(err) => send_error(ctx, err),
                    }
                });
            }
            InboundMessage::Move { from, to, piece } => {
                let session = self.session.clone();
                let device_id = self.device_id.clone();
                spawn_reply(
                    ctx,
                    async move { session.make_move(device_id, from, to, piece).await },
                    |res, ctx| {
                        let payload = match res {
                            Ok(_) => wire::MoveResultPayload { success: true, error: None },
                            Err(err) => wire::MoveResultPayload { success: false, error: Some(err.to_string()) },
                        };
                        send_now(ctx, OutboundMessage::MoveResult(payload));
                    },
                );
            }
            InboundMessage::RollbackRequest => {
                let session = self.session.clone();
                let device_id = self.device_id.clone();
                spawn_ack(ctx, async move { session.rollback_request(device_id).await });
            }
            InboundMessage::RollbackResponse { accept } => {
                let session = self.session.clone();
                let device_id = self.device_id.clone();
                spawn_ack(ctx, async move { session.rollback_response(device_id, accept).await });
            }
            InboundMessage::DrawOffer => {
                let session = self.session.clone();
                let device_id = self.device_id.clone();
                spawn_ack(ctx, async move { session.draw_offer(device_id).await });
            }
            InboundMessage::DrawResponse { accept } => {
                let session = self.session.clone();
                let device_id = self.device_id.clone();
                spawn_ack(ctx, async move { session.draw_response(device_id, accept).await });
            }
            InboundMessage::Resign => {
                let session = self.session.clone();
                let device_id = self.device_id.clone();
                spawn_ack(ctx, async move { session.resign(device_id).await });
            }
            InboundMessage::Ping => {
                send_now(ctx, OutboundMessage::Pong(wire::PongPayload { server_time: now_rfc3339() }));
            }
        }
    }
}

impl Actor for WsSeat {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_heartbeat(ctx);

        let initial = self.initial_snapshot.take().expect("set once at construction");
        let events = self.events.take().expect("set once at construction");
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER_DEPTH);

        let _ = outbound_tx.try_send(OutboundMessage::GameState(game_state_payload(&self.game_id, &initial)).to_json(now_rfc3339(), new_message_id()));

        tokio::spawn(forward_events(events, outbound_tx, self.color));
        ctx.add_stream(ReceiverStream::new(outbound_rx));

        tracing::info!(device_id = %self.device_id, game_id = %self.game_id, "seat attached");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        let session = self.session.clone();
        let device_id = self.device_id.clone();
        tokio::spawn(async move { session.detach_seat(device_id).await });
        tracing::info!(device_id = %self.device_id, game_id = %self.game_id, "seat detached");
    }
}

/// The outbound forwarder feeds already-serialized JSON strings; this
/// stream just writes them to the socket, then stops the actor once the
/// forwarder gives up (buffer full, or the session's event channel closed).
impl StreamHandler<String> for WsSeat {
    fn handle(&mut self, item: String, ctx: &mut Self::Context) {
        ctx.text(item);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSeat {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_text(&text, ctx),
            Ok(ws::Message::Ping(data)) => {
                self.last_read = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_read = Instant::now();
            }
            Ok(ws::Message::Binary(_)) => {
                send_now(ctx, OutboundMessage::Error(wire::ErrorPayload {
                    code: "invalid_message",
                    message: "binary frames are not supported".into(),
                }));
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(err) => {
                tracing::warn!(device_id = %self.device_id, error = %err, "ws protocol error");
                ctx.stop();
            }
        }
    }
}

/// Reads the session's broadcast channel and re-serializes each event as
/// an outbound wire frame, writing it into the seat's bounded buffer. If
/// the buffer is full the seat is slow: drop the sender and let the
/// actor's `StreamHandler::finished` tear the connection down.
async fn forward_events(
    mut events: broadcast::Receiver<SessionEvent>,
    outbound_tx: mpsc::Sender<String>,
    seat_color: Color,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return,
        };
        let Some(message) = translate_event(event, seat_color) else { continue };
        let frame = message.to_json(now_rfc3339(), new_message_id());
        if outbound_tx.try_send(frame).is_err() {
            return;
        }
    }
}

fn translate_event(event: SessionEvent, seat_color: Color) -> Option<OutboundMessage> {
    match event {
        SessionEvent::StateChanged(snapshot) => {
            Some(OutboundMessage::GameState(game_state_payload(&snapshot.game_id, &snapshot)))
        }
        SessionEvent::OpponentMove { mover_color, move_number, record } => {
            if mover_color == seat_color {
                return None;
            }
            Some(OutboundMessage::OpponentMove(wire::OpponentMovePayload {
                from: record.from.to_notation(),
                to: record.to.to_notation(),
                piece_type: record.piece.as_str().to_string(),
                captured: record.captured.map(|kind| kind.as_str().to_string()),
                check: record.is_check,
                move_number,
            }))
        }
        SessionEvent::Timer { red_seconds, black_seconds } => Some(OutboundMessage::Timer(wire::TimerPayload {
            red_remaining_seconds: red_seconds,
            black_remaining_seconds: black_seconds,
            active_side: None,
        })),
        SessionEvent::RollbackRequested { requested_by, target_move_number } => {
            Some(OutboundMessage::RollbackRequested(wire::RollbackRequestedPayload {
                requester_color: wire::color_wire(requested_by),
                target_move_number,
            }))
        }
        SessionEvent::RollbackResult { accepted, rollbacks_remaining } => {
            Some(OutboundMessage::RollbackResult(wire::RollbackResultPayload { accepted, rollbacks_remaining }))
        }
        SessionEvent::DrawOffered { offered_by } => {
            Some(OutboundMessage::DrawOffered(wire::DrawOfferedPayload { offerer_color: wire::color_wire(offered_by) }))
        }
        SessionEvent::DrawDeclined => Some(OutboundMessage::DrawDeclined {}),
        SessionEvent::GameEnd { result, winner_device_id, winner_color, timeout_color } => {
            Some(OutboundMessage::GameEnd(wire::GameEndPayload {
                result_type: result.as_str(),
                winner_id: winner_device_id,
                winner_color: winner_color.map(wire::color_wire),
                timeout_color: timeout_color.map(wire::color_wire),
            }))
        }
        SessionEvent::ConnectionStatus { device_id, connected, .. } => {
            Some(OutboundMessage::ConnectionStatus(wire::ConnectionStatusPayload {
                status: if connected { "connected" } else { "disconnected" },
                player_id: device_id,
            }))
        }
    }
}

fn game_state_payload(game_id: &str, snapshot: &SessionSnapshot) -> wire::GameStatePayload {
    wire::GameStatePayload {
        game_id: game_id.to_string(),
        fen_like: snapshot.board_notation.clone(),
        side_to_move: wire::color_wire(snapshot.side_to_move),
        move_count: snapshot.move_count,
        red_rollbacks_remaining: snapshot.red_rollback_budget,
        black_rollbacks_remaining: snapshot.black_rollback_budget,
        red_remaining_seconds: snapshot.red_remaining_seconds,
        black_remaining_seconds: snapshot.black_remaining_seconds,
        in_check: snapshot.in_check,
        history: snapshot
            .history
            .iter()
            .enumerate()
            .map(|(index, record)| wire::MoveRecordWire {
                move_number: index + 1,
                from: record.from.to_notation(),
                to: record.to.to_notation(),
                piece_type: record.piece.as_str().to_string(),
                captured: record.captured.map(|kind| kind.as_str().to_string()),
                check: record.is_check,
            })
            .collect(),
    }
}

fn send_now(ctx: &mut ws::WebsocketContext<WsSeat>, message: OutboundMessage) {
    ctx.text(message.to_json(now_rfc3339(), new_message_id()));
}

fn send_error(ctx: &mut ws::WebsocketContext<WsSeat>, error: crate::session::SessionError) {
    let code = session_error_code(&error);
    send_now(ctx, OutboundMessage::Error(wire::ErrorPayload { code, message: error.to_string() }));
}

/// Maps each session-state error to its wire vocabulary code (§6/§7).
fn session_error_code(error: &crate::session::SessionError) -> &'static str {
    use crate::session::SessionError;
    match error {
        SessionError::NotASeat => "not_a_seat",
        SessionError::NotYourTurn => "not_your_turn",
        SessionError::GameEnded => "game_ended",
        SessionError::NotPlaying => "not_playing",
        SessionError::IllegalMove => "illegal_move",
        SessionError::NoRollbacksRemaining => "no_rollbacks",
        SessionError::RollbackPending => "rollback_pending",
        SessionError::NoPendingRequest => "no_request",
        SessionError::NotTheResponder => "not_the_responder",
        SessionError::MoveFailed(_) => "move_failed",
        SessionError::Internal(_) => "internal_error",
    }
}

/// Runs `fut` to completion off the actor, then hands the result back to
/// `then` with a fresh `&mut ws::WebsocketContext`, exactly the shape
/// `ActorFutureExt::map` wants for bridging tokio futures into actix.
fn spawn_reply<F, T, Handler>(ctx: &mut ws::WebsocketContext<WsSeat>, fut: F, then: Handler)
where
    F: std::future::Future<Output = T> + 'static,
    Handler: FnOnce(T, &mut ws::WebsocketContext<WsSeat>) + 'static,
{
    ctx.spawn(actix::fut::wrap_future::<_, WsSeat>(fut).map(move |res, _act, ctx| then(res, ctx)));
}

fn spawn_ack<F>(ctx: &mut ws::WebsocketContext<WsSeat>, fut: F)
where
    F: std::future::Future<Output = Result<(), crate::session::SessionError>> + 'static,
{
    spawn_reply(ctx, fut, |res, ctx| {
        if let Err(err) = res {
            send_error(ctx, err);
        }
    });
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
