//! Elimination resolver - threshold detection

use serde::{Deserialize, Serialize};

use super::ledger::{VoteCastResult, VoteLedger};
use super::{PlayerId, Target, TargetId};

/// How many votes eliminate a target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Constant vote count
    Fixed { votes: usize },
    /// Share of connected players, never below `min`
    Proportional { ratio: f64, min: usize },
}

impl ThresholdPolicy {
    /// Votes needed given how many players are connected
    pub fn threshold(&self, connected_players: usize) -> usize {
        match *self {
            ThresholdPolicy::Fixed { votes } => votes.max(1),
            ThresholdPolicy::Proportional { ratio, min } => {
                let scaled = (connected_players as f64 * ratio).ceil() as usize;
                scaled.max(min).max(1)
            }
        }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        ThresholdPolicy::Fixed { votes: 4 }
    }
}

/// A target leaving the tank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elimination {
    pub target_id: TargetId,
    pub target_name: String,
    pub is_ai: bool,
    pub owner_id: Option<PlayerId>,
    pub killers: Vec<PlayerId>,
}

/// Turns threshold crossings into one-time eliminations
#[derive(Debug, Clone)]
pub struct EliminationResolver {
    policy: ThresholdPolicy,
}

impl EliminationResolver {
    pub fn new(policy: ThresholdPolicy) -> Self {
        Self { policy }
    }

    pub fn threshold(&self, connected_players: usize) -> usize {
        self.policy.threshold(connected_players)
    }

    /// Check a cast that just hit `target`. On a crossing, seals the tally,
    /// marks the target eliminated and returns the elimination. Returns
    /// `None` for no-op casts and for targets already gone.
    pub fn evaluate(
        &self,
        cast: &VoteCastResult,
        target: &mut Target,
        ledger: &mut VoteLedger,
        connected_players: usize,
    ) -> Option<Elimination> {
        if !cast.changed || target.eliminated {
            return None;
        }
        debug_assert_eq!(cast.target_id, target.id);

        if cast.new_count < self.threshold(connected_players) {
            return None;
        }

        let killers = ledger.seal(&target.id)?;
        target.eliminated = true;
        target.killers = killers.clone();

        Some(Elimination {
            target_id: target.id.clone(),
            target_name: target.name.clone(),
            is_ai: target.is_ai,
            owner_id: target.owner_id.clone(),
            killers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::TargetSpec;

    fn setup() -> (EliminationResolver, VoteLedger, Target) {
        let target: Target = TargetSpec::ai("t", "Bubbles").into();
        let mut ledger = VoteLedger::new();
        ledger.register(target.id.clone());
        (
            EliminationResolver::new(ThresholdPolicy::default()),
            ledger,
            target,
        )
    }

    fn cast(ledger: &mut VoteLedger, player: &str, target: &Target) -> VoteCastResult {
        ledger
            .cast(&PlayerId::new(player), &target.id)
            .expect("known target")
    }

    #[test]
    fn below_threshold_does_nothing() {
        let (resolver, mut ledger, mut target) = setup();
        for player in ["p1", "p2", "p3"] {
            let result = cast(&mut ledger, player, &target);
            assert!(resolver
                .evaluate(&result, &mut target, &mut ledger, 8)
                .is_none());
        }
        assert_eq!(ledger.count(&target.id), 3);
        assert!(!target.eliminated);
    }

    #[test]
    fn crossing_eliminates_once() {
        let (resolver, mut ledger, mut target) = setup();
        let mut eliminations = Vec::new();
        for player in ["p1", "p2", "p3", "p4", "p5"] {
            let result = cast(&mut ledger, player, &target);
            eliminations.extend(resolver.evaluate(&result, &mut target, &mut ledger, 8));
        }

        assert_eq!(eliminations.len(), 1);
        let elimination = &eliminations[0];
        assert_eq!(elimination.target_name, "Bubbles");
        assert!(elimination.is_ai);
        assert_eq!(elimination.killers.len(), 4);
        assert!(target.eliminated);
        assert_eq!(target.killers, elimination.killers);
        // p5 arrived after the seal
        assert_eq!(ledger.count(&target.id), 4);
    }

    #[test]
    fn repeat_cast_never_eliminates() {
        let target: Target = TargetSpec::ai("t", "Solo").into();
        let mut ledger = VoteLedger::new();
        ledger.register(target.id.clone());
        let resolver = EliminationResolver::new(ThresholdPolicy::Fixed { votes: 1 });
        let mut target = target;

        let first = cast(&mut ledger, "p1", &target);
        assert!(resolver
            .evaluate(&first, &mut target, &mut ledger, 1)
            .is_some());
        let second = cast(&mut ledger, "p1", &target);
        assert!(resolver
            .evaluate(&second, &mut target, &mut ledger, 1)
            .is_none());
    }

    #[test]
    fn proportional_threshold_scales_with_players() {
        let policy = ThresholdPolicy::Proportional {
            ratio: 0.25,
            min: 2,
        };
        assert_eq!(policy.threshold(0), 2);
        assert_eq!(policy.threshold(8), 2);
        assert_eq!(policy.threshold(10), 3);
        assert_eq!(policy.threshold(12), 3);
        assert_eq!(policy.threshold(13), 4);
    }

    #[test]
    fn fixed_threshold_is_at_least_one() {
        assert_eq!(ThresholdPolicy::Fixed { votes: 0 }.threshold(3), 1);
    }
}
