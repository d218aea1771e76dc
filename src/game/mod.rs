//! Vote-elimination engine

pub mod clock;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod outcome;
pub mod resolver;
pub mod session;
pub mod snapshot;

pub use error::{ActionDenied, SessionError};
pub use session::{Session, SessionHandle, SessionRegistry, SessionTask};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a connected player
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

/// Identity of a target ("fish") in the tank
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a player is trying to do to a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Accuse the target (counts toward elimination)
    Cast,
    /// Withdraw an open accusation
    Retract,
    /// Warn the owner without adding a vote
    Chase,
}

impl ActionKind {
    /// Whether this action spends the player's loaded shot
    pub fn uses_ammo(self) -> bool {
        matches!(self, ActionKind::Cast | ActionKind::Chase)
    }
}

/// Player action received from a transport
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub player_id: PlayerId,
    pub kind: ActionKind,
    pub target_id: TargetId,
    /// Client-reported send time; informational only, never used for gating
    pub client_timestamp: Option<u64>,
    pub received_at: u64,
}

/// A target as registered at match start or by the spawner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
    pub id: TargetId,
    pub name: String,
    #[serde(rename = "isAI")]
    pub is_ai: bool,
    #[serde(default)]
    pub owner_id: Option<PlayerId>,
}

impl TargetSpec {
    pub fn ai(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: TargetId::new(id),
            name: name.into(),
            is_ai: true,
            owner_id: None,
        }
    }

    pub fn human(
        id: impl Into<String>,
        name: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            id: TargetId::new(id),
            name: name.into(),
            is_ai: false,
            owner_id: Some(PlayerId::new(owner_id)),
        }
    }
}

/// Live target state owned by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: TargetId,
    pub name: String,
    pub is_ai: bool,
    pub owner_id: Option<PlayerId>,
    pub eliminated: bool,
    /// Voters frozen at the moment of elimination
    pub killers: Vec<PlayerId>,
}

impl Target {
    pub fn is_owned_by(&self, player_id: &PlayerId) -> bool {
        self.owner_id.as_ref() == Some(player_id)
    }
}

impl From<TargetSpec> for Target {
    fn from(spec: TargetSpec) -> Self {
        Self {
            id: spec.id,
            name: spec.name,
            is_ai: spec.is_ai,
            owner_id: spec.owner_id,
            eliminated: false,
            killers: Vec::new(),
        }
    }
}
