//! The Matchmaker's HTTP surface: join/leave/status over plain JSON. The
//! Session Bus's WebSocket upgrade lives in [`crate::bus`]; this module
//! only covers queueing.

use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::matchmaker::{JoinOutcome, Matchmaker, MatchmakerError, QueueStore, Status};
use crate::persistence::GameRepository;
use crate::wire::color_wire;

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub device_id: String,
    pub display_name: String,
    #[serde(default)]
    pub turn_timeout_seconds: u32,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JoinResponse {
    Waiting { position: u32, estimated_wait_seconds: u32 },
    Matched {
        game_id: String,
        opponent_device_id: String,
        opponent_name: String,
        assigned_color: &'static str,
    },
}

impl From<JoinOutcome> for JoinResponse {
    fn from(outcome: JoinOutcome) -> Self {
        match outcome {
            JoinOutcome::Waiting { position, estimated_wait_seconds } => {
                JoinResponse::Waiting { position, estimated_wait_seconds }
            }
            JoinOutcome::Matched { game_id, opponent_device_id, opponent_name, assigned_color } => {
                JoinResponse::Matched {
                    game_id,
                    opponent_device_id,
                    opponent_name,
                    assigned_color: color_wire(assigned_color),
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusResponse {
    Idle,
    Waiting { position: u32, estimated_wait_seconds: u32 },
    Matched {
        game_id: String,
        opponent_device_id: String,
        opponent_name: String,
        assigned_color: &'static str,
    },
}

impl From<Status> for StatusResponse {
    fn from(status: Status) -> Self {
        match status {
            Status::Idle => StatusResponse::Idle,
            Status::Waiting { position, estimated_wait_seconds } => {
                StatusResponse::Waiting { position, estimated_wait_seconds }
            }
            Status::Matched { game_id, opponent_device_id, opponent_name, assigned_color } => {
                StatusResponse::Matched {
                    game_id,
                    opponent_device_id,
                    opponent_name,
                    assigned_color: color_wire(assigned_color),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeviceQuery {
    pub device_id: String,
}

pub async fn join<Q, G>(
    matchmaker: web::Data<std::sync::Arc<Matchmaker<Q, G>>>,
    body: web::Json<JoinRequest>,
) -> impl Responder
where
    Q: QueueStore + 'static,
    G: GameRepository + 'static,
{
    let body = body.into_inner();
    match matchmaker.join(body.device_id, body.display_name, body.turn_timeout_seconds).await {
        Ok(outcome) => HttpResponse::Ok().json(JoinResponse::from(outcome)),
        Err(MatchmakerError::AlreadyInQueue) => {
            HttpResponse::Conflict().json(serde_json::json!({ "error": "already_in_queue" }))
        }
        Err(err @ MatchmakerError::PersistenceFailed(_)) => {
            tracing::error!(error = %err, "matchmaker join failed");
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub async fn leave<Q, G>(
    matchmaker: web::Data<std::sync::Arc<Matchmaker<Q, G>>>,
    query: web::Query<DeviceQuery>,
) -> impl Responder
where
    Q: QueueStore + 'static,
    G: GameRepository + 'static,
{
    matchmaker.leave(&query.device_id);
    HttpResponse::NoContent().finish()
}

pub async fn status<Q, G>(
    matchmaker: web::Data<std::sync::Arc<Matchmaker<Q, G>>>,
    query: web::Query<DeviceQuery>,
) -> impl Responder
where
    Q: QueueStore + 'static,
    G: GameRepository + 'static,
{
    HttpResponse::Ok().json(StatusResponse::from(matchmaker.status(&query.device_id)))
}
