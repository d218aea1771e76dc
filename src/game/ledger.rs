//! Vote ledger - per-target accusation tallies
//!
//! Each player holds at most one open accusation. The `open` index maps a
//! player to the single target they currently accuse, so moving a vote is a
//! lookup rather than a scan. Vote counts are never stored; they are the
//! size of the voter set.

use std::collections::{BTreeSet, HashMap};

use super::error::ActionDenied;
use super::{PlayerId, TargetId};

#[derive(Debug, Clone, Default)]
struct Tally {
    voters: BTreeSet<PlayerId>,
    chasers: BTreeSet<PlayerId>,
    /// Set on elimination. A sealed tally ignores every later mutation.
    sealed: bool,
}

impl Tally {
    fn voter_list(&self) -> Vec<PlayerId> {
        self.voters.iter().cloned().collect()
    }
}

/// Outcome of a retraction (explicit, or implied by moving a vote)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteRetractResult {
    pub target_id: TargetId,
    pub new_count: usize,
    pub voters: Vec<PlayerId>,
    /// False when the call was a no-op
    pub changed: bool,
}

/// Outcome of a cast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteCastResult {
    pub target_id: TargetId,
    pub new_count: usize,
    pub voters: Vec<PlayerId>,
    /// False when the call was a no-op (repeat cast, sealed target)
    pub changed: bool,
    /// The player's previous accusation, withdrawn in the same step
    pub displaced: Option<VoteRetractResult>,
}

/// Outcome of a chase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistResult {
    pub target_id: TargetId,
    pub chasers: usize,
    pub changed: bool,
}

/// Accusation state of one match
#[derive(Debug, Default)]
pub struct VoteLedger {
    tallies: HashMap<TargetId, Tally>,
    open: HashMap<PlayerId, TargetId>,
}

impl VoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a target. Returns false if it was already known.
    pub fn register(&mut self, target_id: TargetId) -> bool {
        if self.tallies.contains_key(&target_id) {
            return false;
        }
        self.tallies.insert(target_id, Tally::default());
        true
    }

    pub fn contains(&self, target_id: &TargetId) -> bool {
        self.tallies.contains_key(target_id)
    }

    /// Accuse `target_id`, withdrawing any other open accusation by the player
    pub fn cast(
        &mut self,
        player_id: &PlayerId,
        target_id: &TargetId,
    ) -> Result<VoteCastResult, ActionDenied> {
        let tally = self.tally(target_id)?;
        if tally.sealed || self.open.get(player_id) == Some(target_id) {
            return Ok(VoteCastResult {
                target_id: target_id.clone(),
                new_count: tally.voters.len(),
                voters: tally.voter_list(),
                changed: false,
                displaced: None,
            });
        }

        let displaced = match self.open.get(player_id).cloned() {
            Some(previous) => Some(self.withdraw(player_id, &previous)),
            None => None,
        };

        let tally = self.tally_mut(target_id)?;
        tally.voters.insert(player_id.clone());
        let result = VoteCastResult {
            target_id: target_id.clone(),
            new_count: tally.voters.len(),
            voters: tally.voter_list(),
            changed: true,
            displaced,
        };
        self.open.insert(player_id.clone(), target_id.clone());

        self.assert_consistent(player_id);
        Ok(result)
    }

    /// Withdraw the player's accusation of `target_id`; no-op if there is none
    pub fn retract(
        &mut self,
        player_id: &PlayerId,
        target_id: &TargetId,
    ) -> Result<VoteRetractResult, ActionDenied> {
        let tally = self.tally(target_id)?;
        if tally.sealed || self.open.get(player_id) != Some(target_id) {
            return Ok(VoteRetractResult {
                target_id: target_id.clone(),
                new_count: tally.voters.len(),
                voters: tally.voter_list(),
                changed: false,
            });
        }

        let result = self.withdraw(player_id, target_id);
        self.assert_consistent(player_id);
        Ok(result)
    }

    /// Record a chase. Chasers never count toward elimination.
    pub fn assist(
        &mut self,
        player_id: &PlayerId,
        target_id: &TargetId,
    ) -> Result<AssistResult, ActionDenied> {
        let tally = self.tally_mut(target_id)?;
        let changed = !tally.sealed && tally.chasers.insert(player_id.clone());
        Ok(AssistResult {
            target_id: target_id.clone(),
            chasers: tally.chasers.len(),
            changed,
        })
    }

    /// Freeze a tally on elimination and release its voters' open
    /// accusations. Returns the frozen voter list, or `None` if the target
    /// is unknown or already sealed.
    pub fn seal(&mut self, target_id: &TargetId) -> Option<Vec<PlayerId>> {
        let tally = self.tallies.get_mut(target_id)?;
        if tally.sealed {
            return None;
        }
        tally.sealed = true;
        let frozen = tally.voter_list();
        for voter in &frozen {
            if self.open.get(voter) == Some(target_id) {
                self.open.remove(voter);
            }
        }
        Some(frozen)
    }

    pub fn count(&self, target_id: &TargetId) -> usize {
        self.tallies
            .get(target_id)
            .map(|t| t.voters.len())
            .unwrap_or(0)
    }

    pub fn voters(&self, target_id: &TargetId) -> Vec<PlayerId> {
        self.tallies
            .get(target_id)
            .map(Tally::voter_list)
            .unwrap_or_default()
    }

    pub fn chasers(&self, target_id: &TargetId) -> Vec<PlayerId> {
        self.tallies
            .get(target_id)
            .map(|t| t.chasers.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_sealed(&self, target_id: &TargetId) -> bool {
        self.tallies.get(target_id).map(|t| t.sealed).unwrap_or(false)
    }

    /// The target this player currently accuses, if any
    pub fn open_target(&self, player_id: &PlayerId) -> Option<&TargetId> {
        self.open.get(player_id)
    }

    fn tally(&self, target_id: &TargetId) -> Result<&Tally, ActionDenied> {
        self.tallies
            .get(target_id)
            .ok_or_else(|| ActionDenied::UnknownTarget(target_id.clone()))
    }

    fn tally_mut(&mut self, target_id: &TargetId) -> Result<&mut Tally, ActionDenied> {
        self.tallies
            .get_mut(target_id)
            .ok_or_else(|| ActionDenied::UnknownTarget(target_id.clone()))
    }

    /// Remove an open accusation the caller knows exists
    fn withdraw(&mut self, player_id: &PlayerId, target_id: &TargetId) -> VoteRetractResult {
        self.open.remove(player_id);
        let tally = self
            .tallies
            .get_mut(target_id)
            .unwrap_or_else(|| panic!("open vote points at untracked target {target_id}"));
        let removed = tally.voters.remove(player_id);
        assert!(
            removed,
            "ledger corrupted: {player_id} indexed on {target_id} but not a voter"
        );
        VoteRetractResult {
            target_id: target_id.clone(),
            new_count: tally.voters.len(),
            voters: tally.voter_list(),
            changed: true,
        }
    }

    /// Index and voter sets must agree for this player
    fn assert_consistent(&self, player_id: &PlayerId) {
        if let Some(target_id) = self.open.get(player_id) {
            assert!(
                self.tallies
                    .get(target_id)
                    .is_some_and(|t| !t.sealed && t.voters.contains(player_id)),
                "ledger corrupted: {player_id} indexed on {target_id} but not a voter"
            );
        }
        if !cfg!(debug_assertions) {
            return;
        }

        let holding: Vec<&TargetId> = self
            .tallies
            .iter()
            .filter(|(_, t)| !t.sealed && t.voters.contains(player_id))
            .map(|(id, _)| id)
            .collect();
        assert!(
            holding.len() <= 1,
            "ledger corrupted: {player_id} accuses {} targets",
            holding.len()
        );
        assert_eq!(
            holding.first().copied(),
            self.open.get(player_id),
            "ledger corrupted: open index disagrees for {player_id}"
        );
    }
}
