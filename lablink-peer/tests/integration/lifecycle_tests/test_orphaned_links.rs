use std::sync::Arc;
use std::time::Duration;

use lablink_core::PeerId;
use lablink_peer::{
    LocalRendezvousHub, RendezvousEvent, SessionError, SessionEvent, SignalingError,
};

use crate::integration::init_tracing;
use crate::utils::{
    AnswerRejectingRendezvous, SIGNAL_TIMEOUT_MS, silent_master, start_lab_on, start_user,
};

/// The answer never leaves the lab: the link built for it is closed and
/// dropped instead of lingering unannounced in the peer map.
#[tokio::test]
async fn test_unsent_answer_discards_link() {
    init_tracing();

    let hub = LocalRendezvousHub::new();
    let user_id = PeerId::from("unanswered-user");
    let lab = start_lab_on(Arc::new(AnswerRejectingRendezvous::new(hub.master_channel())))
        .await
        .expect("Lab failed to start");
    let _user = start_user(&hub, &user_id).await.expect("User failed to start");

    let error = lab
        .events
        .wait_for(|e| matches!(e, SessionEvent::Error(_)), SIGNAL_TIMEOUT_MS)
        .await
        .expect("Send failure was not reported");
    assert!(matches!(
        error,
        SessionEvent::Error(SessionError::Signaling(SignalingError::Send(_)))
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(lab.session.peers().is_empty(), "Link must not stay registered");
    assert!(lab.session.peer(&user_id).is_none());
    let connected = lab
        .events
        .count(|e| matches!(e, SessionEvent::PeerConnected(_)))
        .await;
    assert_eq!(connected, 0);
}

/// A second `Open` on the offerer side replaces the master link instead of
/// leaking the first one.
#[tokio::test]
async fn test_reopen_retires_master_link() {
    init_tracing();

    let hub = LocalRendezvousHub::new();
    let _master_rx = silent_master(&hub).await.expect("Master failed to open");
    let user_id = PeerId::from("reopening-user");
    let user = start_user(&hub, &user_id).await.expect("User failed to start");

    let first = user
        .wait_for_peer(&PeerId::master())
        .await
        .expect("No first master link");

    assert!(hub.inject(&user_id, RendezvousEvent::Open));
    let second = user
        .wait_for_peer_except(&PeerId::master(), Some(first.link_id()))
        .await
        .expect("No replacement master link");

    assert!(first.is_closed(), "First master link must be closed");
    assert!(!second.is_closed());
    let peers = user.session.peers();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].link_id(), second.link_id());

    second.close().await.expect("Failed to close link");
}
