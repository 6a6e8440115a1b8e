//! Сигнальные сессии и peer-ссылки поверх webrtc.
//!
//! A [`SignalingSession`] performs the single offer/answer round a rendezvous
//! service allows; every later renegotiation runs over each [`PeerLink`]'s
//! in-band control channel.

mod config;
mod error;
mod link;
mod signaling;

pub use config::*;
pub use error::*;
pub use link::*;
pub use signaling::*;
