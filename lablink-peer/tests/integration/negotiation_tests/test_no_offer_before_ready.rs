use lablink_core::PeerId;
use lablink_peer::{LocalRendezvousHub, NegotiationState, PeerEvent};

use crate::integration::init_tracing;
use crate::utils::{
    EventLog, MEDIA_TIMEOUT_MS, pump_samples, start_lab, start_user, synthetic_video,
    wait_for_remote_stream,
};

/// A stream added right after the link appears is held back until the
/// control channel probe exchange completes, then renegotiated.
#[tokio::test]
async fn test_stream_added_before_ready_waits_for_probe() {
    init_tracing();

    let hub = LocalRendezvousHub::new();
    let user_id = PeerId::from("eager-user");
    let lab = start_lab(&hub).await.expect("Lab failed to start");
    let user = start_user(&hub, &user_id).await.expect("User failed to start");

    let user_link = user
        .wait_for_peer(&PeerId::master())
        .await
        .expect("No link on user side");
    let user_events = EventLog::spawn(user_link.events().expect("events already taken"));

    let (stream, track) = synthetic_video("early-cam");
    user_link
        .add_stream(stream, "cam")
        .await
        .expect("Failed to add stream");
    assert_ne!(
        user_link.negotiation_state(),
        NegotiationState::AwaitingRemoteAnswer,
        "No renegotiation offer may be in flight before the control channel is ready"
    );
    let pump = pump_samples(track);

    let lab_link = lab.wait_for_peer(&user_id).await.expect("No link on lab side");
    let lab_events = EventLog::spawn(lab_link.events().expect("events already taken"));

    wait_for_remote_stream(&lab_events, "early-cam")
        .await
        .expect("Deferred renegotiation never completed");

    let ready_at = user_events
        .position(|e| matches!(e, PeerEvent::ControlReady))
        .await
        .expect("Control channel never became ready");
    let first_offer_at = user_events
        .position(|e| {
            matches!(
                e,
                PeerEvent::NegotiationStateChanged(NegotiationState::AwaitingRemoteAnswer)
            )
        })
        .await
        .expect("No renegotiation offer was sent");
    let pending_at = user_events
        .position(|e| {
            matches!(
                e,
                PeerEvent::NegotiationStateChanged(NegotiationState::RenegotiationPending)
            )
        })
        .await
        .expect("Request was not deferred");

    assert!(pending_at < ready_at);
    assert!(ready_at < first_offer_at, "sdpOffer sent before probe exchange");

    let _ = lab_events
        .wait_for(|e| matches!(e, PeerEvent::ControlReady), MEDIA_TIMEOUT_MS)
        .await;

    pump.abort();
    user_link.close().await.expect("Failed to close user link");
    lab_link.close().await.expect("Failed to close lab link");
}
