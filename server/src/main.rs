mod bus;
mod config;
mod http;
mod matchmaker;
mod persistence;
mod session;
mod timer;
mod wire;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use tokio::signal::unix::{signal, SignalKind};

use matchmaker::{InMemoryQueueStore, Matchmaker};
use persistence::sqlite::{Database, SqliteGameRepository, SqliteMoveRepository, SqliteUserRepository};
use session::SessionManager;

/// How long shutdown waits for in-flight persistence before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::fmt::format::FmtSpan;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!("starting Xiangqi server");

    let db_path = config::get_db_path();
    tracing::info!(path = %db_path.display(), "using SQLite database");
    let database = Database::open(&db_path).await?;

    let games = Arc::new(SqliteGameRepository::new(database.pool().clone()));
    let moves = Arc::new(SqliteMoveRepository::new(database.pool().clone()));
    let users = Arc::new(SqliteUserRepository::new(database.pool().clone()));
    let session_manager = Arc::new(SessionManager::new(games.clone(), moves.clone(), users.clone()));

    let queue_store = Arc::new(InMemoryQueueStore::new());
    let matchmaker = Arc::new(Matchmaker::new(queue_store, games.clone(), config::default_turn_timeout_seconds()));

    let bus_state = web::Data::new(bus::AppState { session_manager: session_manager.clone(), games: games.clone() });
    let matchmaker_data = web::Data::new(matchmaker.clone());

    let bind_addr = config::get_bind_addr();
    tracing::info!(addr = %bind_addr, "binding HTTP/WebSocket listener");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(bus_state.clone())
            .app_data(matchmaker_data.clone())
            .route(
                "/ws/{game_id}",
                web::get().to(bus::ws_attach::<SqliteGameRepository, SqliteMoveRepository, SqliteUserRepository>),
            )
            .route("/queue/join", web::post().to(http::join::<InMemoryQueueStore, SqliteGameRepository>))
            .route("/queue/leave", web::post().to(http::leave::<InMemoryQueueStore, SqliteGameRepository>))
            .route("/queue/status", web::get().to(http::status::<InMemoryQueueStore, SqliteGameRepository>))
    })
    .shutdown_timeout(SHUTDOWN_GRACE.as_secs())
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let shutdown_session_manager = session_manager.clone();
    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down gracefully"),
        }

        server_handle.stop(true).await;

        if tokio::time::timeout(SHUTDOWN_GRACE, shutdown_session_manager.shutdown_all()).await.is_err() {
            tracing::warn!("session shutdown did not complete within the grace period");
        }
    });

    server.await?;
    tracing::info!("server shut down");
    Ok(())
}
