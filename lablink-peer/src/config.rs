use lablink_core::PeerId;

pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_CHANNEL_NAME: &str = "lablink";

/// Какие медиа ожидаются от удаленной стороны в начальном offer.
///
/// For every enabled kind the offerer adds a receive-only transceiver so the
/// first SDP already carries an m-line for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaExpectations {
    pub receive_audio: bool,
    pub receive_video: bool,
}

impl MediaExpectations {
    pub fn none() -> Self {
        Self {
            receive_audio: false,
            receive_video: false,
        }
    }
}

impl Default for MediaExpectations {
    fn default() -> Self {
        Self {
            receive_audio: true,
            receive_video: true,
        }
    }
}

/// Конфигурация для WebRTC
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub stun_urls: Vec<String>,
    pub media: MediaExpectations,
}

impl TransportConfig {
    /// Host candidates only, no media expectations. Used for in-process links.
    pub fn loopback() -> Self {
        Self {
            stun_urls: Vec::new(),
            media: MediaExpectations::none(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            stun_urls: vec![DEFAULT_STUN_URL.to_owned()],
            media: MediaExpectations::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub channel_name: String,
    pub client_id: PeerId,
    pub transport: TransportConfig,
}

impl SessionConfig {
    pub fn new(channel_name: impl Into<String>, client_id: PeerId) -> Self {
        Self {
            channel_name: channel_name.into(),
            client_id,
            transport: TransportConfig::default(),
        }
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_NAME, PeerId::new())
    }
}
