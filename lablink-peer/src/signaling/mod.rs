mod ice_provider;
mod local_hub;
mod rendezvous;
mod role_strategy;
mod session;
mod session_actor;

pub use ice_provider::{IceServerProvider, NoTurnServers, StaticIceServers};
pub use local_hub::*;
pub use rendezvous::*;
pub use session::{SessionEvent, SessionState, SignalingSession};
