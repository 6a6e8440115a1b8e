use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Идентификатор удаленной стороны внутри одной сигнальной сессии.
///
/// Строка непрозрачна: транспорт рандеву может использовать любые client id.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    /// Sentinel for the single, well-known remote of an offerer session.
    pub const MASTER: &'static str = "master";

    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn master() -> Self {
        Self(Self::MASTER.to_owned())
    }

    pub fn is_master(&self) -> bool {
        self.0 == Self::MASTER
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Локальная роль сигнальной сессии.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    /// Single-peer client ("user"): sends the initial offer.
    Offerer,
    /// Multiplexing host ("lab"): answers offers from many peers.
    Answerer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Offerer => write!(f, "offerer"),
            Role::Answerer => write!(f, "answerer"),
        }
    }
}
