use bytes::Bytes;
use lablink_peer::MediaStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use webrtc::api::media_engine::MIME_TYPE_VP8;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Frame interval of the synthetic video source.
pub const FRAME_INTERVAL_MS: u64 = 33;

fn vp8_track(track_id: &str, stream_id: &str) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        track_id.to_owned(),
        stream_id.to_owned(),
    ))
}

/// A one-track VP8 stream whose track id is `video`.
pub fn synthetic_video(stream_id: &str) -> (MediaStream, Arc<TrackLocalStaticSample>) {
    let track = vp8_track("video", stream_id);
    let stream = MediaStream::from_local_tracks(
        stream_id,
        [track.clone() as Arc<dyn TrackLocal + Send + Sync>],
    );
    (stream, track)
}

/// One stream carrying a VP8 track per id in `track_ids`.
pub fn synthetic_multi_video(
    stream_id: &str,
    track_ids: &[&str],
) -> (MediaStream, Vec<Arc<TrackLocalStaticSample>>) {
    let tracks: Vec<_> = track_ids.iter().map(|id| vp8_track(id, stream_id)).collect();
    let stream = MediaStream::from_local_tracks(
        stream_id,
        tracks
            .iter()
            .map(|t| t.clone() as Arc<dyn TrackLocal + Send + Sync>),
    );
    (stream, tracks)
}

/// Writes dummy frames until aborted. The remote side only reports a track
/// once RTP actually arrives.
pub fn pump_samples(track: Arc<TrackLocalStaticSample>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(FRAME_INTERVAL_MS));
        loop {
            interval.tick().await;
            let sample = Sample {
                data: Bytes::from(vec![0u8; 256]),
                duration: Duration::from_millis(FRAME_INTERVAL_MS),
                ..Default::default()
            };
            if let Err(e) = track.write_sample(&sample).await {
                tracing::debug!("[MediaHelper] sample write failed: {}", e);
            }
        }
    })
}
