//! Match outcome tracking - victory and defeat detection

use serde::Serialize;
use std::fmt;

use super::Target;

/// Population of the tank at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Census {
    pub ai_remaining: usize,
    pub human_remaining: usize,
    pub ai_eliminated: usize,
    pub human_eliminated: usize,
}

impl Census {
    /// Count targets by category
    pub fn from_targets<'a>(targets: impl IntoIterator<Item = &'a Target>) -> Self {
        let mut census = Census::default();
        for target in targets {
            match (target.is_ai, target.eliminated) {
                (true, false) => census.ai_remaining += 1,
                (false, false) => census.human_remaining += 1,
                (true, true) => census.ai_eliminated += 1,
                (false, true) => census.human_eliminated += 1,
            }
        }
        census
    }
}

/// Why a match was lost
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DefeatReason {
    /// Too many AI fish in the tank
    AiOverrun,
    /// Too many human fish voted out by mistake
    HumanCasualties,
    /// Raised by an externally supplied predicate
    External(String),
}

impl fmt::Display for DefeatReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefeatReason::AiOverrun => f.write_str("ai_overrun"),
            DefeatReason::HumanCasualties => f.write_str("human_casualties"),
            DefeatReason::External(name) => write!(f, "external:{name}"),
        }
    }
}

/// Additional loss condition checked after the built-in ones
pub trait DefeatPredicate: Send + Sync {
    fn check(&self, census: &Census) -> Option<DefeatReason>;
}

/// Loses the match once more than `max` human fish have been eliminated
#[derive(Debug, Clone, Copy)]
pub struct HumanCasualtyLimit {
    pub max: usize,
}

impl DefeatPredicate for HumanCasualtyLimit {
    fn check(&self, census: &Census) -> Option<DefeatReason> {
        (census.human_eliminated > self.max).then_some(DefeatReason::HumanCasualties)
    }
}

/// Final result of a match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Victory { census: Census },
    Defeat { census: Census, reason: DefeatReason },
}

impl MatchOutcome {
    pub fn census(&self) -> &Census {
        match self {
            MatchOutcome::Victory { census } | MatchOutcome::Defeat { census, .. } => census,
        }
    }

    pub fn is_victory(&self) -> bool {
        matches!(self, MatchOutcome::Victory { .. })
    }
}

/// Decides victory or defeat, once per match
pub struct MatchOutcomeTracker {
    victory_min_humans: usize,
    defeat_max_ai: usize,
    predicates: Vec<Box<dyn DefeatPredicate>>,
    decided: Option<MatchOutcome>,
}

impl MatchOutcomeTracker {
    pub fn new(victory_min_humans: usize, defeat_max_ai: usize) -> Self {
        Self {
            victory_min_humans,
            defeat_max_ai,
            predicates: Vec::new(),
            decided: None,
        }
    }

    /// Add a loss condition checked after the built-in AI ceiling
    pub fn with_predicate(mut self, predicate: Box<dyn DefeatPredicate>) -> Self {
        self.add_predicate(predicate);
        self
    }

    pub fn add_predicate(&mut self, predicate: Box<dyn DefeatPredicate>) {
        self.predicates.push(predicate);
    }

    /// Check the census. Returns the outcome the first time a condition
    /// holds and `None` on every call after that.
    pub fn evaluate(&mut self, census: Census) -> Option<MatchOutcome> {
        if self.decided.is_some() {
            return None;
        }

        let outcome = if census.ai_remaining == 0 && census.human_remaining >= self.victory_min_humans
        {
            MatchOutcome::Victory { census }
        } else if census.ai_remaining > self.defeat_max_ai {
            MatchOutcome::Defeat {
                census,
                reason: DefeatReason::AiOverrun,
            }
        } else if let Some(reason) = self.predicates.iter().find_map(|p| p.check(&census)) {
            MatchOutcome::Defeat { census, reason }
        } else {
            return None;
        };

        self.decided = Some(outcome.clone());
        Some(outcome)
    }

    pub fn outcome(&self) -> Option<&MatchOutcome> {
        self.decided.as_ref()
    }

    pub fn is_decided(&self) -> bool {
        self.decided.is_some()
    }
}
