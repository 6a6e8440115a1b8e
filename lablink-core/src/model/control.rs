use crate::model::signaling::SessionDescription;
use serde::{Deserialize, Serialize};

/// Метка зарезервированного data channel для протокола управления.
pub const CONTROL_CHANNEL_LABEL: &str = "metadata";

/// Text of the liveness probe.
pub const PROBE_MESSAGE: &str = "helloworld";

/// Сообщения внутриполосного канала управления (JSON, тег `type`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "test")]
    Test { message: String },

    #[serde(rename = "sdpOffer", rename_all = "camelCase")]
    SdpOffer { sdp_offer: SessionDescription },

    #[serde(rename = "sdpAnswer", rename_all = "camelCase")]
    SdpAnswer { sdp_answer: SessionDescription },

    /// Any `type` this side does not understand.
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    pub fn probe() -> Self {
        ControlMessage::Test {
            message: PROBE_MESSAGE.to_owned(),
        }
    }
}
