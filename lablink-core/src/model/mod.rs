mod control;
mod peer;
mod signaling;

pub use control::{CONTROL_CHANNEL_LABEL, ControlMessage, PROBE_MESSAGE};
pub use peer::{PeerId, Role};
pub use signaling::{
    IceCandidate, IceServerConfig, SdpKind, SessionDescription, Signal, SignalMessage,
};
