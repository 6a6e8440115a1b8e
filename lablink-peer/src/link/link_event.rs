use crate::error::{ControlError, PeerLinkError};
use crate::link::control_channel::ControlChannel;
use crate::link::media_stream::MediaStream;
use crate::link::negotiator::NegotiationState;
use lablink_core::{IceCandidate, PeerId, SessionDescription};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::track::track_remote::TrackRemote;

/// События PeerLink для владельца ссылки (драйверы, UI).
#[derive(Clone)]
pub enum PeerEvent {
    LocalStreamAdded { label: String, stream: MediaStream },
    RemoteStreamAdded(MediaStream),
    LocalDataChannelOpened(Arc<RTCDataChannel>),
    RemoteDataChannelOpened(Arc<RTCDataChannel>),
    ControlReady,
    NegotiationStateChanged(NegotiationState),
    ConnectionStateChanged(RTCPeerConnectionState),
    NegotiationFailed(Arc<PeerLinkError>),
    Closed,
}

impl fmt::Debug for PeerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerEvent::LocalStreamAdded { label, stream } => f
                .debug_struct("LocalStreamAdded")
                .field("label", label)
                .field("stream", stream)
                .finish(),
            PeerEvent::RemoteStreamAdded(stream) => {
                f.debug_tuple("RemoteStreamAdded").field(stream).finish()
            }
            PeerEvent::LocalDataChannelOpened(dc) => f
                .debug_tuple("LocalDataChannelOpened")
                .field(&dc.label())
                .finish(),
            PeerEvent::RemoteDataChannelOpened(dc) => f
                .debug_tuple("RemoteDataChannelOpened")
                .field(&dc.label())
                .finish(),
            PeerEvent::ControlReady => f.write_str("ControlReady"),
            PeerEvent::NegotiationStateChanged(state) => f
                .debug_tuple("NegotiationStateChanged")
                .field(state)
                .finish(),
            PeerEvent::ConnectionStateChanged(state) => f
                .debug_tuple("ConnectionStateChanged")
                .field(state)
                .finish(),
            PeerEvent::NegotiationFailed(error) => {
                f.debug_tuple("NegotiationFailed").field(error).finish()
            }
            PeerEvent::Closed => f.write_str("Closed"),
        }
    }
}

/// Внутренние команды задачи ссылки. Колбэки webrtc только публикуют их.
pub(crate) enum LinkCommand {
    NegotiationNeeded,
    ControlBound(ControlChannel),
    ControlReady,
    RemoteOffer(SessionDescription),
    RemoteAnswer(SessionDescription),
    ControlMalformed(ControlError),
    RemoteTrack(Arc<TrackRemote>),
    RemoteDataChannel(Arc<RTCDataChannel>),
    StateChanged(RTCPeerConnectionState),
    Shutdown,
}

/// Что ссылка сообщает своей сигнальной сессии.
pub(crate) enum LinkSignal {
    LocalCandidate {
        peer_id: PeerId,
        link_id: Uuid,
        candidate: IceCandidate,
    },
    NegotiationFailed {
        peer_id: PeerId,
        error: Arc<PeerLinkError>,
    },
    Closed {
        peer_id: PeerId,
        link_id: Uuid,
    },
}
