use lablink_peer::{NegotiationState, PeerEvent};

use crate::integration::init_tracing;
use crate::utils::{
    SIGNAL_TIMEOUT_MS, connect_pair, pump_samples, synthetic_video, wait_for_remote_stream,
    wait_for_stable,
};

/// The lab side can start a renegotiation too: its sdpOffer travels to the
/// user, who answers it.
#[tokio::test]
async fn test_lab_stream_reaches_the_user() {
    init_tracing();

    let pair = connect_pair().await.expect("Pair failed to connect");

    let (stream, track) = synthetic_video("lab-cam");
    pair.lab_link
        .add_stream(stream, "overview")
        .await
        .expect("Failed to add lab stream");
    let pump = pump_samples(track);

    let remote = wait_for_remote_stream(&pair.user_events, "lab-cam")
        .await
        .expect("User never saw the lab stream");
    assert_eq!(remote.track_count(), 1);

    let offered = pair
        .lab_events
        .position(|e| {
            matches!(
                e,
                PeerEvent::NegotiationStateChanged(NegotiationState::AwaitingRemoteAnswer)
            )
        })
        .await;
    assert!(offered.is_some(), "Lab should have sent the offer");
    let answered = pair
        .user_events
        .position(|e| {
            matches!(
                e,
                PeerEvent::NegotiationStateChanged(NegotiationState::AwaitingLocalAnswer)
            )
        })
        .await;
    assert!(answered.is_some(), "User should have answered a remote offer");

    wait_for_stable(&pair.lab_link, SIGNAL_TIMEOUT_MS)
        .await
        .expect("Lab link never settled");
    wait_for_stable(&pair.user_link, SIGNAL_TIMEOUT_MS)
        .await
        .expect("User link never settled");
    assert_eq!(pair.lab.errors().await, 0);
    assert_eq!(pair.user.errors().await, 0);

    pump.abort();
    pair.user_link.close().await.expect("Failed to close user link");
    pair.lab_link.close().await.expect("Failed to close lab link");
}
