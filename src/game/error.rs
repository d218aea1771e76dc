//! Denials and authority errors

use super::clock::Millis;
use super::{PlayerId, TargetId};

/// Why an action was refused. A denied action never changes match state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionDenied {
    #[error("Still cooling down until {ready_at}")]
    StillCoolingDown { ready_at: Millis },

    #[error("Match is over")]
    MatchOver,

    #[error("Unknown target: {0}")]
    UnknownTarget(TargetId),

    #[error("Unknown player: {0}")]
    UnknownPlayer(PlayerId),

    #[error("Cannot accuse your own fish: {0}")]
    OwnTarget(TargetId),
}

impl ActionDenied {
    /// Stable wire code
    pub fn code(&self) -> &'static str {
        match self {
            ActionDenied::StillCoolingDown { .. } => "still_cooling_down",
            ActionDenied::MatchOver => "match_over",
            ActionDenied::UnknownTarget(_) => "unknown_target",
            ActionDenied::UnknownPlayer(_) => "unknown_player",
            ActionDenied::OwnTarget(_) => "own_target",
        }
    }

    /// When the client may try again, if the denial is time-based
    pub fn ready_at(&self) -> Option<Millis> {
        match self {
            ActionDenied::StillCoolingDown { ready_at } => Some(*ready_at),
            _ => None,
        }
    }
}

/// Errors from talking to a match authority
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Denied(#[from] ActionDenied),

    #[error("Match authority is no longer running")]
    Closed,

    #[error("Duplicate target id: {0}")]
    DuplicateTarget(TargetId),
}
