use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

#[derive(Clone)]
pub enum TrackSource {
    Local(Arc<dyn TrackLocal + Send + Sync>),
    Remote(Arc<TrackRemote>),
}

/// Медиа-трек с флагом завершения.
///
/// webrtc tracks have no "ended" state of their own; a link marks its tracks
/// ended when it closes, and callers may stop a local track earlier.
#[derive(Clone)]
pub struct MediaTrack {
    source: TrackSource,
    ended: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn local(track: Arc<dyn TrackLocal + Send + Sync>) -> Self {
        Self {
            source: TrackSource::Local(track),
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn remote(track: Arc<TrackRemote>) -> Self {
        Self {
            source: TrackSource::Remote(track),
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> String {
        match &self.source {
            TrackSource::Local(track) => track.id().to_owned(),
            TrackSource::Remote(track) => track.id(),
        }
    }

    pub fn stream_id(&self) -> String {
        match &self.source {
            TrackSource::Local(track) => track.stream_id().to_owned(),
            TrackSource::Remote(track) => track.stream_id(),
        }
    }

    pub fn kind(&self) -> RTPCodecType {
        match &self.source {
            TrackSource::Local(track) => track.kind(),
            TrackSource::Remote(track) => track.kind(),
        }
    }

    pub fn source(&self) -> &TrackSource {
        &self.source
    }

    pub fn as_local(&self) -> Option<Arc<dyn TrackLocal + Send + Sync>> {
        match &self.source {
            TrackSource::Local(track) => Some(track.clone()),
            TrackSource::Remote(_) => None,
        }
    }

    pub fn as_remote(&self) -> Option<Arc<TrackRemote>> {
        match &self.source {
            TrackSource::Local(_) => None,
            TrackSource::Remote(track) => Some(track.clone()),
        }
    }

    pub fn stop(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = match self.source {
            TrackSource::Local(_) => "local",
            TrackSource::Remote(_) => "remote",
        };
        f.debug_struct("MediaTrack")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("origin", &origin)
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// Группа треков с общим stream id, как `MediaStream` в браузере.
///
/// Clones share the same track set.
#[derive(Clone)]
pub struct MediaStream {
    id: String,
    tracks: Arc<DashMap<String, MediaTrack>>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tracks: Arc::new(DashMap::new()),
        }
    }

    /// Builds a stream from already created local tracks.
    pub fn from_local_tracks(
        id: impl Into<String>,
        tracks: impl IntoIterator<Item = Arc<dyn TrackLocal + Send + Sync>>,
    ) -> Self {
        let stream = Self::new(id);
        for track in tracks {
            stream.add_track(MediaTrack::local(track));
        }
        stream
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns false when a track with the same id was already present; the
    /// newer handle replaces it.
    pub fn add_track(&self, track: MediaTrack) -> bool {
        self.tracks.insert(track.id(), track).is_none()
    }

    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks.iter().map(|t| t.value().clone()).collect()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn stop(&self) {
        for track in self.tracks.iter() {
            track.stop();
        }
    }

    pub fn is_ended(&self) -> bool {
        self.tracks.iter().all(|t| t.is_ended())
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks())
            .finish()
    }
}
