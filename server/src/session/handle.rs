//! Cheap, cloneable handle to a running session actor (§4.3/§5).

use tokio::sync::{broadcast, mpsc, oneshot};

use xiangqi::{PieceKind, Square};

use super::commands::*;
use super::events::SessionEvent;
use super::snapshot::SessionSnapshot;

#[derive(Clone)]
pub struct SessionHandle {
    game_id: String,
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub(crate) fn new(game_id: String, cmd_tx: mpsc::Sender<SessionCommand>) -> Self {
        Self { game_id, cmd_tx }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub async fn attach_seat(
        &self,
        device_id: String,
    ) -> Result<(SessionSnapshot, broadcast::Receiver<SessionEvent>), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::AttachSeat { device_id, reply: tx }).await?;
        rx.await
            .map_err(|_| SessionError::Internal("reply dropped".into()))?
    }

    pub async fn detach_seat(&self, device_id: String) {
        let _ = self.cmd_tx.send(SessionCommand::DetachSeat { device_id }).await;
    }

    pub async fn make_move(
        &self,
        device_id: String,
        from: Square,
        to: Square,
        piece: PieceKind,
    ) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::MakeMove { device_id, from, to, piece, reply: tx })
            .await?;
        rx.await.map_err(|_| SessionError::Internal("reply dropped".into()))?
    }

    pub async fn rollback_request(&self, device_id: String) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::RollbackRequest { device_id, reply: tx }).await?;
        rx.await.map_err(|_| SessionError::Internal("reply dropped".into()))?
    }

    pub async fn rollback_response(&self, device_id: String, accept: bool) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::RollbackResponse { device_id, accept, reply: tx })
            .await?;
        rx.await.map_err(|_| SessionError::Internal("reply dropped".into()))?
    }

    pub async fn draw_offer(&self, device_id: String) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::DrawOffer { device_id, reply: tx }).await?;
        rx.await.map_err(|_| SessionError::Internal("reply dropped".into()))?
    }

    pub async fn draw_response(&self, device_id: String, accept: bool) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::DrawResponse { device_id, accept, reply: tx }).await?;
        rx.await.map_err(|_| SessionError::Internal("reply dropped".into()))?
    }

    pub async fn resign(&self, device_id: String) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Resign { device_id, reply: tx }).await?;
        rx.await.map_err(|_| SessionError::Internal("reply dropped".into()))?
    }

    pub async fn get_snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::GetSnapshot { reply: tx }).await?;
        rx.await.map_err(|_| SessionError::Internal("reply dropped".into()))
    }

    pub async fn subscribe(
        &self,
    ) -> Result<(SessionSnapshot, broadcast::Receiver<SessionEvent>), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Subscribe { reply: tx }).await?;
        rx.await.map_err(|_| SessionError::Internal("reply dropped".into()))
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown).await;
    }

    async fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::Internal("session actor closed".into()))
    }
}
