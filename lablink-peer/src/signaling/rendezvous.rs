use crate::error::SignalingError;
use async_trait::async_trait;
use lablink_core::Signal;
use tokio::sync::mpsc;

/// События внешнего сервиса рандеву.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendezvousEvent {
    Open,
    Closed,
    Error(String),
    Status(String),
    Signal(Signal),
}

/// Трейт, который должен реализовать внешний сервис рандеву,
/// чтобы сессия могла обменяться начальным offer/answer и ICE.
#[async_trait]
pub trait RendezvousChannel: Send + Sync {
    /// Открыть канал. События доставляются в `events` в порядке отправки.
    async fn open(
        &self,
        events: mpsc::UnboundedSender<RendezvousEvent>,
    ) -> Result<(), SignalingError>;

    /// Отправить сообщение; `signal.peer_id` это адресат.
    async fn send(&self, signal: Signal) -> Result<(), SignalingError>;

    async fn close(&self);
}
