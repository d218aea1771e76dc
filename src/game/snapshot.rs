//! Point-in-time match snapshots for late joiners and observers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::clock::Millis;
use super::outcome::{Census, MatchOutcome};
use super::session::{MatchPhase, MatchState};
use super::{PlayerId, Target, TargetId};

/// Full, consistent view of one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub match_id: Uuid,
    pub phase: MatchPhase,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Authority clock when the snapshot was taken
    pub server_time: Millis,
    /// Votes needed right now
    pub elimination_threshold: usize,
    pub cooldown_ms: u64,
    pub ai_remaining: usize,
    pub human_remaining: usize,
    pub targets: Vec<TargetView>,
    pub players: Vec<PlayerView>,
    pub outcome: Option<OutcomeView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetView {
    pub fish_id: TargetId,
    pub fish_name: String,
    pub owner_id: Option<PlayerId>,
    pub eliminated: bool,
    pub count: usize,
    pub voters: Vec<PlayerId>,
    pub chasers: Vec<PlayerId>,
    /// Hidden until the fish is eliminated
    #[serde(rename = "isAI")]
    pub is_ai: Option<bool>,
    pub killer_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub player_id: PlayerId,
    pub name: String,
    pub connected: bool,
    pub loaded: bool,
    pub cooldown_ends_at: Option<Millis>,
    pub current_target: Option<TargetId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeView {
    pub victory: bool,
    pub reason: Option<String>,
}

impl From<&MatchOutcome> for OutcomeView {
    fn from(outcome: &MatchOutcome) -> Self {
        match outcome {
            MatchOutcome::Victory { .. } => Self {
                victory: true,
                reason: None,
            },
            MatchOutcome::Defeat { reason, .. } => Self {
                victory: false,
                reason: Some(reason.to_string()),
            },
        }
    }
}

/// Client-facing view of one target
pub fn target_view(state: &MatchState, target: &Target) -> TargetView {
    TargetView {
        fish_id: target.id.clone(),
        fish_name: target.name.clone(),
        owner_id: target.owner_id.clone(),
        eliminated: target.eliminated,
        count: state.ledger.count(&target.id),
        voters: state.ledger.voters(&target.id),
        chasers: state.ledger.chasers(&target.id),
        is_ai: target.eliminated.then_some(target.is_ai),
        killer_names: state.display_names(&target.killers),
    }
}

/// Build a snapshot from match state
pub fn build(
    state: &MatchState,
    outcome: Option<&MatchOutcome>,
    threshold: usize,
    now: Millis,
) -> MatchSnapshot {
    let census = Census::from_targets(state.targets.values());

    let targets = state
        .targets
        .values()
        .map(|target| target_view(state, target))
        .collect();

    let mut players: Vec<_> = state.players.values().collect();
    players.sort_by_key(|p| p.join_order);
    let players = players
        .into_iter()
        .map(|p| {
            let gate = state.gates.status(&p.player_id, now);
            PlayerView {
                player_id: p.player_id.clone(),
                name: p.display_name.clone(),
                connected: p.is_connected(),
                loaded: gate.map(|g| g.loaded).unwrap_or(true),
                cooldown_ends_at: gate.and_then(|g| g.cooldown_ends_at),
                current_target: state.ledger.open_target(&p.player_id).cloned(),
            }
        })
        .collect();

    MatchSnapshot {
        match_id: state.id,
        phase: state.phase,
        started_at: state.started_at,
        ended_at: state.ended_at,
        server_time: now,
        elimination_threshold: threshold,
        cooldown_ms: state.rules.cooldown_ms,
        ai_remaining: census.ai_remaining,
        human_remaining: census.human_remaining,
        targets,
        players,
        outcome: outcome.map(OutcomeView::from),
    }
}
