//! The Session Bus (§4.5): accepts the WebSocket upgrade, validates the
//! seat, and hands the connection off to a per-seat actor. Everything
//! after the handshake lives in [`seat`].

mod seat;

use std::sync::Arc;

use actix_web::{web, Error as ActixError, HttpRequest, HttpResponse};
use actix_web_actors::ws;

use crate::persistence::{GameRepository, UserRepository};
use crate::session::{NewSession, SessionManager};

pub use seat::WsSeat;

/// Shared state handed to every route, generic over the persistence
/// collaborators the way `Matchmaker`/`SessionManager` already are.
pub struct AppState<G, M, U> {
    pub session_manager: Arc<SessionManager<G, M, U>>,
    pub games: Arc<G>,
}

/// `GET /ws/{game_id}` — the seat's device id comes from the `X-Device-ID`
/// header, falling back to a `device_id` query parameter (§6).
pub async fn ws_attach<G, M, U>(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    data: web::Data<AppState<G, M, U>>,
) -> Result<HttpResponse, ActixError>
where
    G: GameRepository + 'static,
    M: crate::persistence::MoveRepository + 'static,
    U: UserRepository + 'static,
{
    let game_id = path.into_inner();
    let Some(device_id) = device_id_from_request(&req) else {
        return Ok(HttpResponse::BadRequest().body("missing device id"));
    };

    let record = match data.games.get_by_id(&game_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return Ok(HttpResponse::NotFound().body("unknown game")),
        Err(err) => {
            tracing::error!(error = %err, "failed to load game record for seat attach");
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    let color = if device_id == record.red_device_id {
        xiangqi::Color::Red
    } else if device_id == record.black_device_id {
        xiangqi::Color::Black
    } else {
        return Ok(HttpResponse::Forbidden().body("device id is not a seat in this game"));
    };

    let session = data
        .session_manager
        .get_or_create(NewSession {
            game_id: &record.id,
            red_device_id: &record.red_device_id,
            black_device_id: &record.black_device_id,
            turn_timeout_seconds: record.turn_timeout_seconds,
            red_rollback_budget: record.red_rollback_budget,
            black_rollback_budget: record.black_rollback_budget,
        })
        .await;

    let (snapshot, events) = match session.attach_seat(device_id.clone()).await {
        Ok(attached) => attached,
        Err(err) => {
            tracing::info!(device_id = %device_id, game_id = %game_id, error = %err, "seat attach refused");
            return Ok(HttpResponse::Forbidden().body(err.to_string()));
        }
    };

    let seat = WsSeat::new(game_id, device_id, color, session, snapshot, events);
    ws::start(seat, &req, stream)
}

fn device_id_from_request(req: &HttpRequest) -> Option<String> {
    if let Some(header) = req.headers().get("X-Device-ID") {
        if let Ok(value) = header.to_str() {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    req.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == "device_id").then(|| value.to_string())
        })
    })
}
