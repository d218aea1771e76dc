//! WebSocket protocol message definitions
//! These are the wire types for client-server communication.
//! Every frame is `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};

use crate::game::clock::Millis;
use crate::game::snapshot::{MatchSnapshot, TargetView};
use crate::game::{ActionDenied, ActionKind, PlayerId, TargetId};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMsg {
    /// Accuse a fish
    #[serde(rename = "vote:cast")]
    VoteCast(VoteActionData),

    /// Withdraw an accusation
    #[serde(rename = "vote:retract")]
    VoteRetract(VoteActionData),

    /// Chase a fish (warns the owner, adds no vote)
    #[serde(rename = "vote:chase")]
    VoteChase(VoteActionData),

    /// Ping for latency measurement
    #[serde(rename = "ping")]
    Ping {
        /// Client timestamp
        t: u64,
    },
}

impl ClientMsg {
    /// The vote action carried by this message, if any
    pub fn action(&self) -> Option<(ActionKind, &VoteActionData)> {
        match self {
            ClientMsg::VoteCast(data) => Some((ActionKind::Cast, data)),
            ClientMsg::VoteRetract(data) => Some((ActionKind::Retract, data)),
            ClientMsg::VoteChase(data) => Some((ActionKind::Chase, data)),
            ClientMsg::Ping { .. } => None,
        }
    }
}

/// Payload of `vote:cast`, `vote:retract` and `vote:chase`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteActionData {
    pub fish_id: TargetId,
    pub voter_id: PlayerId,
    /// Informational only
    #[serde(default)]
    pub client_timestamp: Option<u64>,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMsg {
    /// Welcome message after connection
    #[serde(rename = "welcome")]
    Welcome(WelcomeData),

    /// Point-in-time state sent to a (re)joining player
    #[serde(rename = "sync:state")]
    SyncState(MatchSnapshot),

    /// A fish was added to the tank after the match started
    #[serde(rename = "item:add")]
    ItemAdd(TargetView),

    #[serde(rename = "player:joined")]
    PlayerJoined(PlayerPresenceData),

    #[serde(rename = "player:left")]
    PlayerLeft(PlayerPresenceData),

    /// Vote count of a fish changed
    #[serde(rename = "vote:update")]
    VoteUpdate(VoteUpdateData),

    /// Someone shot at your fish (owner only)
    #[serde(rename = "vote:received")]
    VoteReceived(VoteReceivedData),

    /// A fish was voted out
    #[serde(rename = "fish:eliminate")]
    FishEliminate(FishEliminateData),

    #[serde(rename = "game:victory")]
    GameVictory(GameVictoryData),

    #[serde(rename = "game:defeat")]
    GameDefeat(GameDefeatData),

    /// Your action was refused (sender only)
    #[serde(rename = "action:denied")]
    ActionDenied(ActionDeniedData),

    /// Error message
    #[serde(rename = "error")]
    Error(ErrorData),

    /// Pong response
    #[serde(rename = "pong")]
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeData {
    pub player_id: PlayerId,
    pub server_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPresenceData {
    pub player_id: PlayerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteUpdateData {
    pub fish_id: TargetId,
    pub count: usize,
    pub voters: Vec<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceivedData {
    pub fish_id: TargetId,
    pub voter_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FishEliminateData {
    pub fish_id: TargetId,
    pub fish_name: String,
    #[serde(rename = "isAI")]
    pub is_ai: bool,
    pub fish_owner_id: Option<PlayerId>,
    /// Display names of the players whose votes removed the fish
    pub killer_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameVictoryData {
    pub mvp_id: Option<PlayerId>,
    pub mvp_name: Option<String>,
    pub ai_remaining: usize,
    pub human_remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDefeatData {
    pub ai_remaining: usize,
    pub human_remaining: usize,
    /// "ai_overrun", "human_casualties" or "external:<name>"
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDeniedData {
    pub code: String,
    pub message: String,
    /// Set for cooldown denials: when the shot is back
    pub ready_at: Option<Millis>,
}

impl From<&ActionDenied> for ActionDeniedData {
    fn from(denied: &ActionDenied) -> Self {
        Self {
            code: denied.code().to_string(),
            message: denied.to_string(),
            ready_at: denied.ready_at(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: String,
    pub message: String,
}

/// Who should receive an outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every client in the match
    All,
    /// One player only
    Player(PlayerId),
}

/// Message published by a match authority
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub audience: Audience,
    pub msg: ServerMsg,
}

impl Outbound {
    pub fn all(msg: ServerMsg) -> Self {
        Self {
            audience: Audience::All,
            msg,
        }
    }

    pub fn to(player_id: PlayerId, msg: ServerMsg) -> Self {
        Self {
            audience: Audience::Player(player_id),
            msg,
        }
    }

    /// Should `player_id`'s connection forward this message
    pub fn is_for(&self, player_id: &PlayerId) -> bool {
        match &self.audience {
            Audience::All => true,
            Audience::Player(target) => target == player_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_vote_cast() {
        let raw = json!({
            "event": "vote:cast",
            "data": { "fishId": "fish-1", "voterId": "p1", "clientTimestamp": 123 }
        });
        let msg: ClientMsg = serde_json::from_value(raw).unwrap();
        let (kind, data) = msg.action().expect("vote action");
        assert_eq!(kind, ActionKind::Cast);
        assert_eq!(data.fish_id, TargetId::new("fish-1"));
        assert_eq!(data.voter_id, PlayerId::new("p1"));
        assert_eq!(data.client_timestamp, Some(123));
    }

    #[test]
    fn client_timestamp_is_optional() {
        let raw = json!({ "event": "vote:chase", "data": { "fishId": "f", "voterId": "p" } });
        let msg: ClientMsg = serde_json::from_value(raw).unwrap();
        assert!(matches!(msg, ClientMsg::VoteChase(ref d) if d.client_timestamp.is_none()));
    }

    #[test]
    fn eliminate_payload_shape() {
        let msg = ServerMsg::FishEliminate(FishEliminateData {
            fish_id: TargetId::new("f1"),
            fish_name: "Nemo".to_string(),
            is_ai: true,
            fish_owner_id: None,
            killer_names: vec!["Ann".to_string()],
        });
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "event": "fish:eliminate",
                "data": {
                    "fishId": "f1",
                    "fishName": "Nemo",
                    "isAI": true,
                    "fishOwnerId": null,
                    "killerNames": ["Ann"]
                }
            })
        );
    }

    #[test]
    fn vote_update_payload_shape() {
        let msg = ServerMsg::VoteUpdate(VoteUpdateData {
            fish_id: TargetId::new("f1"),
            count: 2,
            voters: vec![PlayerId::new("a"), PlayerId::new("b")],
        });
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "event": "vote:update", "data": { "fishId": "f1", "count": 2, "voters": ["a", "b"] } })
        );
    }

    #[test]
    fn owner_only_messages_are_filtered() {
        let owner = PlayerId::new("owner");
        let msg = Outbound::to(
            owner.clone(),
            ServerMsg::VoteReceived(VoteReceivedData {
                fish_id: TargetId::new("f"),
                voter_id: PlayerId::new("x"),
            }),
        );
        assert!(msg.is_for(&owner));
        assert!(!msg.is_for(&PlayerId::new("someone-else")));
        assert!(Outbound::all(ServerMsg::Pong { t: 1 }).is_for(&owner));
    }
}
