use crate::link::NegotiationState;
use lablink_core::{PeerId, SdpKind};
use std::sync::Arc;
use thiserror::Error;

/// Ошибки транспорта рандеву и жизненного цикла сессии.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalingError {
    #[error("rendezvous channel could not be opened: {0}")]
    Open(String),
    #[error("rendezvous credentials rejected: {0}")]
    InvalidCredentials(String),
    #[error("failed to deliver signal: {0}")]
    Send(String),
    #[error("rendezvous service reported an error: {0}")]
    Remote(String),
    #[error("signaling session is not open")]
    NotOpen,
    #[error("signaling session already started")]
    AlreadyStarted,
    #[error("signaling session is closed")]
    Closed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("received {received} while negotiation is {state:?}")]
    OutOfOrder {
        received: &'static str,
        state: NegotiationState,
    },
    #[error("expected an {expected:?} description, got {actual:?}")]
    UnexpectedDescription { expected: SdpKind, actual: SdpKind },
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("malformed control message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("control channel has not been established")]
    Missing,
    #[error("control channel transport: {0}")]
    Transport(#[from] webrtc::Error),
}

#[derive(Debug, Error)]
pub enum PeerLinkError {
    #[error("webrtc: {0}")]
    WebRtc(#[from] webrtc::Error),
    #[error("label '{0}' is reserved for the control channel")]
    ReservedLabel(String),
    #[error("peer link is closed")]
    Closed,
    #[error("remote description was not applied")]
    RemoteDescriptionMissing,
    #[error("renegotiation abandoned: link closed before the control channel became ready")]
    RenegotiationAbandoned,
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error(transparent)]
    Control(#[from] ControlError),
}

/// Ошибка, которую сессия отдает наружу через [`crate::SessionEvent::Error`].
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error(transparent)]
    Signaling(#[from] SignalingError),
    #[error("negotiation with peer {peer_id} failed: {source}")]
    Negotiation {
        peer_id: PeerId,
        #[source]
        source: Arc<PeerLinkError>,
    },
}

impl SessionError {
    pub(crate) fn negotiation(peer_id: PeerId, error: impl Into<Arc<PeerLinkError>>) -> Self {
        Self::Negotiation {
            peer_id,
            source: error.into(),
        }
    }
}
