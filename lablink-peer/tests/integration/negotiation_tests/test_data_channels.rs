use lablink_peer::{PeerEvent, PeerLinkError};

use crate::integration::init_tracing;
use crate::utils::{SIGNAL_TIMEOUT_MS, connect_pair};

#[tokio::test]
async fn test_metadata_label_is_reserved() {
    init_tracing();

    let pair = connect_pair().await.expect("Pair failed to connect");

    let err = pair
        .user_link
        .create_data_channel("metadata")
        .await
        .err()
        .expect("metadata must be rejected");
    assert!(matches!(err, PeerLinkError::ReservedLabel(label) if label == "metadata"));

    pair.user_link.close().await.expect("Failed to close user link");
}

#[tokio::test]
async fn test_application_channel_opens_on_both_sides() {
    init_tracing();

    let pair = connect_pair().await.expect("Pair failed to connect");

    let dc = pair
        .user_link
        .create_data_channel("telemetry")
        .await
        .expect("Failed to create data channel");
    assert_eq!(dc.label(), "telemetry");

    let local = pair
        .user_events
        .wait_for(
            |e| matches!(e, PeerEvent::LocalDataChannelOpened(dc) if dc.label() == "telemetry"),
            SIGNAL_TIMEOUT_MS,
        )
        .await;
    assert!(local.is_some());

    let remote = pair
        .lab_events
        .wait_for(
            |e| matches!(e, PeerEvent::RemoteDataChannelOpened(dc) if dc.label() == "telemetry"),
            SIGNAL_TIMEOUT_MS,
        )
        .await;
    assert!(remote.is_some(), "Lab should see the telemetry channel");

    let labels: Vec<String> = pair
        .lab_link
        .data_channels()
        .iter()
        .map(|dc| dc.label().to_owned())
        .collect();
    assert_eq!(labels, vec!["telemetry".to_owned()]);
    assert!(pair.lab_link.control_channel().is_some());

    pair.user_link.close().await.expect("Failed to close user link");
    pair.lab_link.close().await.expect("Failed to close lab link");
}
