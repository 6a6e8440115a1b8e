use lablink_core::PeerId;
use lablink_peer::{
    LocalRendezvousHub, NegotiationState, PeerEvent, PeerLinkError, SessionError, SessionEvent,
};

use crate::integration::init_tracing;
use crate::utils::{EventLog, SIGNAL_TIMEOUT_MS, silent_master, start_user, synthetic_video};

/// A deferred renegotiation that never gets a ready control channel is
/// surfaced when the link closes.
#[tokio::test]
async fn test_pending_renegotiation_is_reported_on_close() {
    init_tracing();

    let hub = LocalRendezvousHub::new();
    let _master = silent_master(&hub).await.expect("Master failed to open");
    let user = start_user(&hub, &PeerId::from("stranded"))
        .await
        .expect("User failed to start");

    let link = user
        .wait_for_peer(&PeerId::master())
        .await
        .expect("No link on user side");
    let events = EventLog::spawn(link.events().expect("events already taken"));

    let (stream, _track) = synthetic_video("never-sent");
    link.add_stream(stream, "cam")
        .await
        .expect("Adding before ready is allowed");

    let pending = events
        .wait_for(
            |e| {
                matches!(
                    e,
                    PeerEvent::NegotiationStateChanged(NegotiationState::RenegotiationPending)
                )
            },
            SIGNAL_TIMEOUT_MS,
        )
        .await;
    assert!(pending.is_some(), "Request should be deferred");
    assert!(!link.is_ready());

    link.close().await.expect("Failed to close link");

    let failed = events
        .wait_for(
            |e| {
                matches!(e, PeerEvent::NegotiationFailed(err)
                    if matches!(**err, PeerLinkError::RenegotiationAbandoned))
            },
            SIGNAL_TIMEOUT_MS,
        )
        .await;
    assert!(failed.is_some(), "Abandoned renegotiation must be surfaced");

    let session_error = user
        .events
        .wait_for(
            |e| {
                matches!(e, SessionEvent::Error(SessionError::Negotiation { source, .. })
                    if matches!(**source, PeerLinkError::RenegotiationAbandoned))
            },
            SIGNAL_TIMEOUT_MS,
        )
        .await;
    assert!(session_error.is_some());

    let failed_at = events
        .position(|e| matches!(e, PeerEvent::NegotiationFailed(_)))
        .await
        .expect("NegotiationFailed recorded");
    let closed_at = events
        .position(|e| matches!(e, PeerEvent::Closed))
        .await
        .expect("Closed recorded");
    assert!(failed_at < closed_at);
}
