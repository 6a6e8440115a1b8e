use std::time::Duration;

use lablink_peer::{
    NegotiationError, NegotiationState, PeerEvent, PeerLinkError, SessionError, SessionEvent,
};

use crate::integration::init_tracing;
use crate::utils::{
    ConnectedPair, SIGNAL_TIMEOUT_MS, connect_pair, pump_samples, synthetic_video,
    wait_for_remote_stream,
};

async fn send_raw(pair: &ConnectedPair, text: &str) {
    let control = pair
        .user_link
        .control_channel()
        .expect("User link has no control channel");
    control
        .data_channel()
        .send_text(text.to_owned())
        .await
        .expect("Failed to write to control channel");
}

async fn wait_for_lab_failure(pair: &ConnectedPair) -> PeerEvent {
    pair.lab_events
        .wait_for(|e| matches!(e, PeerEvent::NegotiationFailed(_)), SIGNAL_TIMEOUT_MS)
        .await
        .expect("Lab link did not report the failure")
}

async fn assert_lab_session_error(pair: &ConnectedPair) {
    let event = pair
        .lab
        .events
        .wait_for(|e| matches!(e, SessionEvent::Error(_)), SIGNAL_TIMEOUT_MS)
        .await
        .expect("Lab session did not report the failure");
    match event {
        SessionEvent::Error(SessionError::Negotiation { peer_id, .. }) => {
            assert_eq!(peer_id, pair.user_id);
        }
        other => panic!("Unexpected session event {:?}", other),
    }
}

/// Link must still negotiate after a fault.
async fn assert_lab_link_usable(pair: &ConnectedPair, stream_id: &str) {
    assert!(!pair.lab_link.is_closed());
    assert!(pair.lab_link.is_ready());
    assert_eq!(pair.lab_link.negotiation_state(), NegotiationState::Stable);

    let (stream, track) = synthetic_video(stream_id);
    pair.user_link
        .add_stream(stream, "after-fault")
        .await
        .expect("Failed to add stream");
    let pump = pump_samples(track);
    wait_for_remote_stream(&pair.lab_events, stream_id)
        .await
        .expect("Renegotiation after the fault failed");
    pump.abort();
}

#[tokio::test]
async fn test_unparseable_offer_is_reported() {
    init_tracing();

    let pair = connect_pair().await.expect("Pair failed to connect");
    send_raw(
        &pair,
        r#"{"type":"sdpOffer","sdpOffer":{"type":"offer","sdp":"not an sdp"}}"#,
    )
    .await;

    match wait_for_lab_failure(&pair).await {
        PeerEvent::NegotiationFailed(error) => {
            assert!(matches!(*error, PeerLinkError::WebRtc(_)), "got {}", error);
        }
        other => panic!("Unexpected event {:?}", other),
    }
    assert_lab_session_error(&pair).await;
    assert_lab_link_usable(&pair, "after-bad-offer").await;

    pair.user_link.close().await.expect("Failed to close user link");
    pair.lab_link.close().await.expect("Failed to close lab link");
}

#[tokio::test]
async fn test_non_json_frame_is_reported() {
    init_tracing();

    let pair = connect_pair().await.expect("Pair failed to connect");
    send_raw(&pair, "sdpOffer please").await;

    match wait_for_lab_failure(&pair).await {
        PeerEvent::NegotiationFailed(error) => {
            assert!(matches!(*error, PeerLinkError::Control(_)), "got {}", error);
        }
        other => panic!("Unexpected event {:?}", other),
    }
    assert_lab_session_error(&pair).await;
    assert!(!pair.lab_link.is_closed());

    pair.user_link.close().await.expect("Failed to close user link");
    pair.lab_link.close().await.expect("Failed to close lab link");
}

#[tokio::test]
async fn test_answer_without_offer_is_out_of_order() {
    init_tracing();

    let pair = connect_pair().await.expect("Pair failed to connect");
    send_raw(
        &pair,
        r#"{"type":"sdpAnswer","sdpAnswer":{"type":"answer","sdp":"v=0\r\n"}}"#,
    )
    .await;

    match wait_for_lab_failure(&pair).await {
        PeerEvent::NegotiationFailed(error) => {
            assert!(
                matches!(
                    &*error,
                    PeerLinkError::Negotiation(NegotiationError::OutOfOrder {
                        received: "sdpAnswer",
                        state: NegotiationState::Stable,
                    })
                ),
                "got {}",
                error
            );
        }
        other => panic!("Unexpected event {:?}", other),
    }
    assert_lab_session_error(&pair).await;
    assert_lab_link_usable(&pair, "after-stray-answer").await;

    pair.user_link.close().await.expect("Failed to close user link");
    pair.lab_link.close().await.expect("Failed to close lab link");
}

#[tokio::test]
async fn test_unknown_message_type_is_ignored() {
    init_tracing();

    let pair = connect_pair().await.expect("Pair failed to connect");
    send_raw(&pair, r#"{"type":"cameraTilt","degrees":15}"#).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let failures = pair
        .lab_events
        .count(|e| matches!(e, PeerEvent::NegotiationFailed(_)))
        .await;
    assert_eq!(failures, 0);
    assert_eq!(pair.lab.errors().await, 0);
    assert_lab_link_usable(&pair, "after-unknown").await;

    pair.user_link.close().await.expect("Failed to close user link");
    pair.lab_link.close().await.expect("Failed to close lab link");
}
