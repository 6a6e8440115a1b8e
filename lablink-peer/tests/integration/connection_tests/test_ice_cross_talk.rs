use std::time::Duration;

use lablink_core::{IceCandidate, PeerId, Signal, SignalMessage};
use lablink_peer::RendezvousEvent;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use crate::integration::init_tracing;
use crate::utils::connect_pair;

fn stray_candidate() -> SignalMessage {
    SignalMessage::IceCandidate {
        candidate: IceCandidate {
            candidate: "candidate:842163049 1 udp 1677729535 203.0.113.7 61000 typ srflx raddr 0.0.0.0 rport 0".to_owned(),
            sdp_mid: Some("0".to_owned()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        },
    }
}

#[tokio::test]
async fn test_candidate_for_unknown_peer_is_dropped() {
    init_tracing();

    let pair = connect_pair().await.expect("Pair failed to connect");
    let ghost = PeerId::from("X");

    // Lab multiplexes peers; a candidate from a peer it has no link for is cross-talk
    let delivered = pair.hub.inject(
        &PeerId::master(),
        RendezvousEvent::Signal(Signal::new(ghost.clone(), stray_candidate())),
    );
    assert!(delivered);

    // The user only knows the master
    pair.hub.inject(
        &pair.user_id,
        RendezvousEvent::Signal(Signal::new(ghost.clone(), stray_candidate())),
    );

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(pair.lab_link.connection_state(), RTCPeerConnectionState::Connected);
    assert_eq!(pair.user_link.connection_state(), RTCPeerConnectionState::Connected);
    assert!(pair.lab.session.peer(&ghost).is_none());
    assert_eq!(pair.lab.session.peers().len(), 1);
    assert_eq!(pair.lab.errors().await, 0, "Cross-talk must not surface as an error");
    assert_eq!(pair.user.errors().await, 0);

    pair.user_link.close().await.expect("Failed to close user link");
}
