use std::time::Duration;

use lablink_peer::PeerEvent;

use crate::integration::init_tracing;
use crate::utils::{
    MEDIA_TIMEOUT_MS, connect_pair, pump_samples, synthetic_multi_video, wait_for_remote_stream,
};

/// Two tracks of one stream arrive separately on the lab side and end up in
/// a single remote stream.
#[tokio::test]
async fn test_tracks_of_one_stream_are_merged() {
    init_tracing();

    let pair = connect_pair().await.expect("Pair failed to connect");

    let (stream, tracks) = synthetic_multi_video("bench", &["front", "side"]);
    pair.user_link
        .add_stream(stream, "cams")
        .await
        .expect("Failed to add stream");
    let pumps: Vec<_> = tracks.into_iter().map(pump_samples).collect();

    let remote = wait_for_remote_stream(&pair.lab_events, "bench")
        .await
        .expect("Lab never saw the stream");

    let start = std::time::Instant::now();
    while remote.track_count() < 2 {
        assert!(
            start.elapsed() < Duration::from_millis(MEDIA_TIMEOUT_MS),
            "Second track never merged, have {}",
            remote.track_count()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let mut ids: Vec<String> = remote.tracks().iter().map(|t| t.id()).collect();
    ids.sort();
    assert_eq!(ids, vec!["front".to_owned(), "side".to_owned()]);

    let announced = pair
        .lab_events
        .count(|e| matches!(e, PeerEvent::RemoteStreamAdded(s) if s.id() == "bench"))
        .await;
    assert_eq!(announced, 1, "A known stream id must not be announced twice");
    assert_eq!(pair.lab_link.remote_streams().len(), 1);

    for pump in pumps {
        pump.abort();
    }
    pair.user_link.close().await.expect("Failed to close user link");
    pair.lab_link.close().await.expect("Failed to close lab link");
}
