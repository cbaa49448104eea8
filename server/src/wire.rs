//! The JSON-over-socket wire protocol: one frame per text message,
//! `{ "type", "payload", "timestamp", "message_id" }`. Decoding validates
//! only shape — session-state legality is the Game Session's job.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use xiangqi::{Color, PieceKind, Square};

#[derive(Debug, Clone, thiserror::Error)]
pub enum WireError {
    #[error("invalid_message")]
    InvalidMessage,
    #[error("unknown_type")]
    UnknownType,
}

fn color_str(color: Color) -> &'static str {
    match color {
        Color::Red => "red",
        Color::Black => "black",
    }
}

fn piece_str(kind: PieceKind) -> &'static str {
    kind.as_str()
}

// ---------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MovePayload {
    pub from: String,
    pub to: String,
    pub piece_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptPayload {
    pub accept: bool,
}

/// A decoded inbound frame. `join` carries no payload: seat identity is
/// established at attach time (device id + game id from the connection
/// itself), this variant is the client's explicit request for a fresh
/// `game_state` snapshot once the socket is open.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Join,
    Move { from: Square, to: Square, piece: PieceKind },
    RollbackRequest,
    RollbackResponse { accept: bool },
    DrawOffer,
    DrawResponse { accept: bool },
    Resign,
    Ping,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    r#type: String,
    #[serde(default)]
    payload: Value,
}

pub fn decode_inbound(raw: &str) -> Result<InboundMessage, WireError> {
    let frame: RawFrame = serde_json::from_str(raw).map_err(|_| WireError::InvalidMessage)?;
    match frame.r#type.as_str() {
        "join" => Ok(InboundMessage::Join),
        "move" => {
            let payload: MovePayload =
                serde_json::from_value(frame.payload).map_err(|_| WireError::InvalidMessage)?;
            let from = Square::parse(&payload.from).ok_or(WireError::InvalidMessage)?;
            let to = Square::parse(&payload.to).ok_or(WireError::InvalidMessage)?;
            let piece = PieceKind::from_str(&payload.piece_type).ok_or(WireError::InvalidMessage)?;
            Ok(InboundMessage::Move { from, to, piece })
        }
        "rollback_request" => Ok(InboundMessage::RollbackRequest),
        "rollback_response" => {
            let payload: AcceptPayload =
                serde_json::from_value(frame.payload).map_err(|_| WireError::InvalidMessage)?;
            Ok(InboundMessage::RollbackResponse { accept: payload.accept })
        }
        "draw_offer" => Ok(InboundMessage::DrawOffer),
        "draw_response" => {
            let payload: AcceptPayload =
                serde_json::from_value(frame.payload).map_err(|_| WireError::InvalidMessage)?;
            Ok(InboundMessage::DrawResponse { accept: payload.accept })
        }
        "resign" => Ok(InboundMessage::Resign),
        "ping" => Ok(InboundMessage::Ping),
        _ => Err(WireError::UnknownType),
    }
}

// ---------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct MoveRecordWire {
    pub move_number: usize,
    pub from: String,
    pub to: String,
    pub piece_type: String,
    pub captured: Option<String>,
    pub check: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameStatePayload {
    pub game_id: String,
    pub fen_like: String,
    pub side_to_move: &'static str,
    pub move_count: usize,
    pub red_rollbacks_remaining: u8,
    pub black_rollbacks_remaining: u8,
    pub red_remaining_seconds: u32,
    pub black_remaining_seconds: u32,
    pub in_check: bool,
    pub history: Vec<MoveRecordWire>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpponentMovePayload {
    pub from: String,
    pub to: String,
    pub piece_type: String,
    pub captured: Option<String>,
    pub check: bool,
    pub move_number: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveResultPayload {
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimerPayload {
    pub red_remaining_seconds: u32,
    pub black_remaining_seconds: u32,
    pub active_side: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackRequestedPayload {
    pub requester_color: &'static str,
    pub target_move_number: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackResultPayload {
    pub accepted: bool,
    pub rollbacks_remaining: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct DrawOfferedPayload {
    pub offerer_color: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameEndPayload {
    pub result_type: &'static str,
    pub winner_id: Option<String>,
    pub winner_color: Option<&'static str>,
    pub timeout_color: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatusPayload {
    pub status: &'static str,
    pub player_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PongPayload {
    pub server_time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboundMessage {
    GameState(GameStatePayload),
    OpponentMove(OpponentMovePayload),
    MoveResult(MoveResultPayload),
    Timer(TimerPayload),
    RollbackRequested(RollbackRequestedPayload),
    RollbackResult(RollbackResultPayload),
    DrawOffered(DrawOfferedPayload),
    DrawDeclined {},
    GameEnd(GameEndPayload),
    ConnectionStatus(ConnectionStatusPayload),
    Pong(PongPayload),
    Error(ErrorPayload),
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    #[serde(flatten)]
    pub message: OutboundMessage,
    pub timestamp: String,
    pub message_id: String,
}

impl OutboundMessage {
    pub fn into_frame(self, timestamp: String, message_id: String) -> OutboundFrame {
        OutboundFrame { message: self, timestamp, message_id }
    }

    pub fn to_json(self, timestamp: String, message_id: String) -> String {
        serde_json::to_string(&self.into_frame(timestamp, message_id))
            .expect("outbound frame always serializes")
    }
}

pub fn color_wire(color: Color) -> &'static str {
    color_str(color)
}

pub fn piece_wire(kind: PieceKind) -> &'static str {
    piece_str(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_move_frame() {
        let raw = r#"{"type":"move","payload":{"from":"b2","to":"b6","piece_type":"cannon"},"timestamp":"t","message_id":"m1"}"#;
        let msg = decode_inbound(raw).unwrap();
        match msg {
            InboundMessage::Move { from, to, piece } => {
                assert_eq!(from, Square::new(1, 2));
                assert_eq!(to, Square::new(1, 6));
                assert_eq!(piece, PieceKind::Cannon);
            }
            other => panic!("expected Move, got {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let raw = r#"{"type":"teleport","payload":{}}"#;
        assert!(matches!(decode_inbound(raw), Err(WireError::UnknownType)));
    }

    #[test]
    fn malformed_json_is_invalid_message() {
        assert!(matches!(decode_inbound("not json"), Err(WireError::InvalidMessage)));
    }

    #[test]
    fn outbound_frame_shape_matches_wire_contract() {
        let frame = OutboundMessage::Pong(PongPayload { server_time: "now".into() })
            .into_frame("ts".into(), "mid".into());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "pong");
        assert_eq!(json["payload"]["server_time"], "now");
        assert_eq!(json["timestamp"], "ts");
        assert_eq!(json["message_id"], "mid");
    }
}
