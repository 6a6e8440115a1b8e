pub use lablink_core::model::{PeerId, Role};

pub mod model {
    pub use lablink_core::model::*;
}

#[cfg(feature = "peer")]
pub mod peer {
    pub use lablink_peer::*;
}
