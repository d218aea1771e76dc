//! Action gate - per-player ammo and cooldown
//!
//! A player holds one shot. Firing it (cast or chase) starts a cooldown; the
//! shot comes back once the authority's clock reaches the deadline. The
//! reload is applied lazily whenever the gate is queried.

use std::collections::HashMap;
use std::time::Duration;

use super::clock::{Millis, SessionClock};
use super::error::ActionDenied;
use super::PlayerId;

/// Result of asking a gate for permission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Shot available. `ready_at` is when the next one will be (only
    /// meaningful after a consume).
    Allowed { ready_at: Millis },
    /// Shot spent; comes back at `ready_at`
    StillCoolingDown { ready_at: Millis },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed { .. })
    }
}

/// Read-only view of a gate at some instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStatus {
    pub loaded: bool,
    pub cooldown_ends_at: Option<Millis>,
}

/// Ammo state for one player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionGate {
    loaded: bool,
    cooldown_ends_at: Option<Millis>,
}

impl ActionGate {
    pub fn new() -> Self {
        Self {
            loaded: true,
            cooldown_ends_at: None,
        }
    }

    /// Flip back to loaded once the cooldown deadline has been reached
    pub fn reload(&mut self, now: Millis) {
        if !self.loaded && SessionClock::has_elapsed(now, self.cooldown_ends_at) {
            self.loaded = true;
        }
    }

    /// Would a shot be allowed right now? Does not spend it.
    pub fn check(&mut self, now: Millis) -> GateDecision {
        self.reload(now);
        if self.loaded {
            GateDecision::Allowed { ready_at: now }
        } else {
            GateDecision::StillCoolingDown {
                ready_at: self.cooldown_ends_at.unwrap_or(now),
            }
        }
    }

    /// Spend the shot if available and start the cooldown
    pub fn try_consume(&mut self, now: Millis, cooldown: Duration) -> GateDecision {
        match self.check(now) {
            GateDecision::Allowed { .. } => {
                let ready_at = SessionClock::deadline(now, cooldown);
                self.loaded = false;
                self.cooldown_ends_at = Some(ready_at);
                GateDecision::Allowed { ready_at }
            }
            denied => denied,
        }
    }

    /// Status as of `now` without mutating the gate
    pub fn status(&self, now: Millis) -> GateStatus {
        let loaded = self.loaded || SessionClock::has_elapsed(now, self.cooldown_ends_at);
        GateStatus {
            loaded,
            cooldown_ends_at: if loaded { None } else { self.cooldown_ends_at },
        }
    }
}

impl Default for ActionGate {
    fn default() -> Self {
        Self::new()
    }
}

/// All gates of one match
#[derive(Debug, Clone)]
pub struct ActionGates {
    cooldown: Duration,
    gates: HashMap<PlayerId, ActionGate>,
}

impl ActionGates {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            gates: HashMap::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Create a loaded gate for a new player. An existing gate is kept so a
    /// reconnect cannot skip a running cooldown.
    pub fn ensure(&mut self, player_id: &PlayerId) {
        self.gates.entry(player_id.clone()).or_default();
    }

    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.gates.contains_key(player_id)
    }

    /// Permission check without spending the shot
    pub fn check(&mut self, player_id: &PlayerId, now: Millis) -> Result<(), ActionDenied> {
        let gate = self
            .gates
            .get_mut(player_id)
            .ok_or_else(|| ActionDenied::UnknownPlayer(player_id.clone()))?;
        match gate.check(now) {
            GateDecision::Allowed { .. } => Ok(()),
            GateDecision::StillCoolingDown { ready_at } => {
                Err(ActionDenied::StillCoolingDown { ready_at })
            }
        }
    }

    /// Spend the player's shot. Returns when it will be reloaded.
    pub fn try_consume(
        &mut self,
        player_id: &PlayerId,
        now: Millis,
    ) -> Result<Millis, ActionDenied> {
        let cooldown = self.cooldown;
        let gate = self
            .gates
            .get_mut(player_id)
            .ok_or_else(|| ActionDenied::UnknownPlayer(player_id.clone()))?;
        match gate.try_consume(now, cooldown) {
            GateDecision::Allowed { ready_at } => Ok(ready_at),
            GateDecision::StillCoolingDown { ready_at } => {
                Err(ActionDenied::StillCoolingDown { ready_at })
            }
        }
    }

    pub fn status(&self, player_id: &PlayerId, now: Millis) -> Option<GateStatus> {
        self.gates.get(player_id).map(|g| g.status(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_millis(7_500);

    #[test]
    fn fresh_gate_is_loaded() {
        let mut gate = ActionGate::new();
        assert!(gate.check(0).is_allowed());
        assert_eq!(
            gate.status(0),
            GateStatus {
                loaded: true,
                cooldown_ends_at: None
            }
        );
    }

    #[test]
    fn consume_starts_cooldown() {
        let mut gate = ActionGate::new();
        assert_eq!(
            gate.try_consume(1_000, COOLDOWN),
            GateDecision::Allowed { ready_at: 8_500 }
        );
        assert_eq!(
            gate.try_consume(1_001, COOLDOWN),
            GateDecision::StillCoolingDown { ready_at: 8_500 }
        );
        assert_eq!(
            gate.try_consume(8_499, COOLDOWN),
            GateDecision::StillCoolingDown { ready_at: 8_500 }
        );
    }

    #[test]
    fn reloads_exactly_at_deadline() {
        let mut gate = ActionGate::new();
        gate.try_consume(0, COOLDOWN);
        assert_eq!(
            gate.try_consume(7_500, COOLDOWN),
            GateDecision::Allowed { ready_at: 15_000 }
        );
    }

    #[test]
    fn check_does_not_spend() {
        let mut gate = ActionGate::new();
        assert!(gate.check(0).is_allowed());
        assert!(gate.check(0).is_allowed());
        assert!(gate.try_consume(0, COOLDOWN).is_allowed());
    }

    #[test]
    fn status_reflects_lazy_reload() {
        let mut gate = ActionGate::new();
        gate.try_consume(0, COOLDOWN);
        assert_eq!(
            gate.status(100),
            GateStatus {
                loaded: false,
                cooldown_ends_at: Some(7_500)
            }
        );
        assert!(gate.status(7_500).loaded);
    }

    #[test]
    fn unknown_player_is_denied() {
        let mut gates = ActionGates::new(COOLDOWN);
        let ghost = PlayerId::new("ghost");
        assert_eq!(
            gates.try_consume(&ghost, 0),
            Err(ActionDenied::UnknownPlayer(ghost.clone()))
        );
    }

    #[test]
    fn ensure_keeps_running_cooldown() {
        let mut gates = ActionGates::new(COOLDOWN);
        let p = PlayerId::new("p1");
        gates.ensure(&p);
        assert_eq!(gates.try_consume(&p, 0), Ok(7_500));

        // Reconnect
        gates.ensure(&p);
        assert_eq!(
            gates.check(&p, 10),
            Err(ActionDenied::StillCoolingDown { ready_at: 7_500 })
        );
    }
}
