mod control_channel;
mod link_event;
mod link_task;
mod media_stream;
mod negotiator;
mod peer_link;

pub use control_channel::*;
pub use link_event::PeerEvent;
pub(crate) use link_event::LinkSignal;
pub use media_stream::*;
pub use negotiator::NegotiationState;
pub use peer_link::PeerLink;
