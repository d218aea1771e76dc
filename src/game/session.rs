//! Match authority - the single writer of one match's vote state
//!
//! `Session` is the synchronous aggregate. `SessionTask` owns exactly one
//! `Session` inside a tokio task and applies commands one at a time in
//! arrival order, so no two actions ever observe each other half-applied.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MatchRules;
use crate::util::time::Timer;
use crate::ws::protocol::{
    FishEliminateData, GameDefeatData, GameVictoryData, Outbound, PlayerPresenceData, ServerMsg,
    VoteReceivedData, VoteUpdateData,
};

use super::clock::{Clock, Millis};
use super::error::{ActionDenied, SessionError};
use super::gate::ActionGates;
use super::ledger::VoteLedger;
use super::outcome::{
    Census, DefeatPredicate, HumanCasualtyLimit, MatchOutcome, MatchOutcomeTracker,
};
use super::resolver::EliminationResolver;
use super::snapshot::{self, MatchSnapshot};
use super::{ActionKind, PlayerId, PlayerInput, Target, TargetId, TargetSpec};

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Accepting actions
    InProgress,
    /// Outcome decided; every action is refused
    Ended,
}

/// Player record (kept after disconnect so votes and cooldowns survive)
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub player_id: PlayerId,
    pub display_name: String,
    /// Open sockets for this player; a reconnect may overlap the old socket
    pub connections: usize,
    /// Position in join order, used for tie-breaks
    pub join_order: u64,
    pub joined_at: Millis,
}

impl PlayerState {
    pub fn is_connected(&self) -> bool {
        self.connections > 0
    }
}

/// Match state (owned by the match task)
pub struct MatchState {
    pub id: Uuid,
    pub rules: MatchRules,
    pub phase: MatchPhase,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub players: HashMap<PlayerId, PlayerState>,
    pub targets: BTreeMap<TargetId, Target>,
    pub ledger: VoteLedger,
    pub gates: ActionGates,
    next_join_order: u64,
}

impl MatchState {
    pub fn new(id: Uuid, rules: MatchRules, now: Millis) -> Self {
        let gates = ActionGates::new(rules.cooldown());
        Self {
            id,
            rules,
            phase: MatchPhase::InProgress,
            started_at: to_datetime(now),
            ended_at: None,
            players: HashMap::new(),
            targets: BTreeMap::new(),
            ledger: VoteLedger::new(),
            gates,
            next_join_order: 0,
        }
    }

    /// Count connected players
    pub fn connected_count(&self) -> usize {
        self.players.values().filter(|p| p.is_connected()).count()
    }

    /// Display name of a player, falling back to the raw id
    pub fn display_name(&self, player_id: &PlayerId) -> String {
        self.players
            .get(player_id)
            .map(|p| p.display_name.clone())
            .unwrap_or_else(|| player_id.to_string())
    }

    pub fn display_names(&self, player_ids: &[PlayerId]) -> Vec<String> {
        player_ids.iter().map(|id| self.display_name(id)).collect()
    }

    /// Scan non-eliminated targets by category
    pub fn census(&self) -> Census {
        Census::from_targets(self.targets.values())
    }
}

/// The authoritative vote-elimination session for one match
pub struct Session {
    state: MatchState,
    resolver: EliminationResolver,
    outcome: MatchOutcomeTracker,
}

impl Session {
    /// Create a match with its initial fish population
    pub fn new(
        id: Uuid,
        rules: MatchRules,
        roster: Vec<TargetSpec>,
        now: Millis,
    ) -> Result<Self, SessionError> {
        let mut outcome =
            MatchOutcomeTracker::new(rules.victory_min_human_count, rules.defeat_max_ai_count);
        if let Some(max) = rules.max_human_killed {
            outcome.add_predicate(Box::new(HumanCasualtyLimit { max }));
        }

        let mut session = Self {
            resolver: EliminationResolver::new(rules.threshold),
            state: MatchState::new(id, rules, now),
            outcome,
        };
        for spec in roster {
            session.add_target(spec)?;
        }
        Ok(session)
    }

    /// Add an externally supplied loss condition
    pub fn with_defeat_predicate(mut self, predicate: Box<dyn DefeatPredicate>) -> Self {
        self.outcome.add_predicate(predicate);
        self
    }

    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn is_over(&self) -> bool {
        self.state.phase == MatchPhase::Ended
    }

    pub fn outcome(&self) -> Option<&MatchOutcome> {
        self.outcome.outcome()
    }

    /// Votes currently needed to eliminate a fish
    pub fn threshold(&self) -> usize {
        self.resolver.threshold(self.state.connected_count())
    }

    /// Consistent view of the whole match
    pub fn snapshot(&self, now: Millis) -> MatchSnapshot {
        snapshot::build(&self.state, self.outcome(), self.threshold(), now)
    }

    /// Admit a player, or reconnect one who left. A reconnecting player
    /// keeps their cooldown and open vote.
    pub fn join(
        &mut self,
        player_id: &PlayerId,
        display_name: &str,
        now: Millis,
    ) -> Result<(MatchSnapshot, Vec<Outbound>), ActionDenied> {
        if self.is_over() {
            return Err(ActionDenied::MatchOver);
        }

        let name = if display_name.trim().is_empty() {
            format!("Player_{}", player_id.as_str().chars().take(8).collect::<String>())
        } else {
            display_name.trim().to_string()
        };

        match self.state.players.get_mut(player_id) {
            Some(player) => {
                player.connections += 1;
                player.display_name = name.clone();
                info!(
                    match_id = %self.state.id,
                    player_id = %player_id,
                    connections = player.connections,
                    "Player reconnected"
                );
            }
            None => {
                let join_order = self.state.next_join_order;
                self.state.next_join_order += 1;
                self.state.players.insert(
                    player_id.clone(),
                    PlayerState {
                        player_id: player_id.clone(),
                        display_name: name.clone(),
                        connections: 1,
                        join_order,
                        joined_at: now,
                    },
                );
                self.state.gates.ensure(player_id);
                info!(
                    match_id = %self.state.id,
                    player_id = %player_id,
                    player_count = self.state.players.len(),
                    "Player joined match"
                );
            }
        }

        let events = vec![Outbound::all(ServerMsg::PlayerJoined(PlayerPresenceData {
            player_id: player_id.clone(),
            name,
        }))];
        Ok((self.snapshot(now), events))
    }

    /// Drop one of the player's connections. Once the last one is gone the
    /// player stops being able to act; votes already cast stay.
    pub fn leave(&mut self, player_id: &PlayerId) -> Vec<Outbound> {
        let Some(player) = self.state.players.get_mut(player_id) else {
            return Vec::new();
        };
        if !player.is_connected() {
            return Vec::new();
        }
        player.connections -= 1;
        if player.is_connected() {
            debug!(
                match_id = %self.state.id,
                player_id = %player_id,
                connections = player.connections,
                "Stale connection closed"
            );
            return Vec::new();
        }

        info!(
            match_id = %self.state.id,
            player_id = %player_id,
            "Player left match"
        );

        vec![Outbound::all(ServerMsg::PlayerLeft(PlayerPresenceData {
            player_id: player_id.clone(),
            name: player.display_name.clone(),
        }))]
    }

    /// Apply one player action. On success returns the events it produced
    /// in broadcast order; on denial nothing has changed.
    pub fn submit_action(
        &mut self,
        player_id: &PlayerId,
        kind: ActionKind,
        target_id: &TargetId,
        client_timestamp: Option<u64>,
        now: Millis,
    ) -> Result<Vec<Outbound>, ActionDenied> {
        let result = self.apply_action(player_id, kind, target_id, client_timestamp, now);
        if let Err(denied) = &result {
            match denied {
                ActionDenied::UnknownPlayer(_) | ActionDenied::UnknownTarget(_) => warn!(
                    match_id = %self.state.id,
                    player_id = %player_id,
                    target_id = %target_id,
                    ?kind,
                    reason = %denied,
                    "Action denied"
                ),
                _ => debug!(
                    match_id = %self.state.id,
                    player_id = %player_id,
                    target_id = %target_id,
                    ?kind,
                    reason = %denied,
                    "Action denied"
                ),
            }
        }
        result
    }

    /// Add a fish after match start (external spawner)
    pub fn spawn_target(
        &mut self,
        spec: TargetSpec,
        now: Millis,
    ) -> Result<Vec<Outbound>, SessionError> {
        if self.is_over() {
            return Err(ActionDenied::MatchOver.into());
        }
        let target_id = spec.id.clone();
        self.add_target(spec)?;

        info!(
            match_id = %self.state.id,
            target_id = %target_id,
            "Fish spawned"
        );

        let mut events = Vec::new();
        if let Some(target) = self.state.targets.get(&target_id) {
            events.push(Outbound::all(ServerMsg::ItemAdd(snapshot::target_view(
                &self.state,
                target,
            ))));
        }
        events.extend(self.evaluate_outcome(now));
        Ok(events)
    }

    fn add_target(&mut self, spec: TargetSpec) -> Result<(), SessionError> {
        if !self.state.ledger.register(spec.id.clone()) {
            return Err(SessionError::DuplicateTarget(spec.id));
        }
        self.state.targets.insert(spec.id.clone(), Target::from(spec));
        Ok(())
    }

    fn apply_action(
        &mut self,
        player_id: &PlayerId,
        kind: ActionKind,
        target_id: &TargetId,
        client_timestamp: Option<u64>,
        now: Millis,
    ) -> Result<Vec<Outbound>, ActionDenied> {
        if self.is_over() {
            return Err(ActionDenied::MatchOver);
        }
        if !self
            .state
            .players
            .get(player_id)
            .is_some_and(PlayerState::is_connected)
        {
            return Err(ActionDenied::UnknownPlayer(player_id.clone()));
        }
        let target = self
            .state
            .targets
            .get(target_id)
            .ok_or_else(|| ActionDenied::UnknownTarget(target_id.clone()))?;
        if kind.uses_ammo() && target.is_owned_by(player_id) {
            return Err(ActionDenied::OwnTarget(target_id.clone()));
        }

        if let Some(sent_at) = client_timestamp {
            debug!(
                player_id = %player_id,
                transit_ms = now as i64 - sent_at as i64,
                "Client timestamp (informational)"
            );
        }

        match kind {
            ActionKind::Cast => self.cast(player_id, target_id, now),
            ActionKind::Retract => self.retract(player_id, target_id),
            ActionKind::Chase => self.chase(player_id, target_id, now),
        }
    }

    fn cast(
        &mut self,
        player_id: &PlayerId,
        target_id: &TargetId,
        now: Millis,
    ) -> Result<Vec<Outbound>, ActionDenied> {
        self.state.gates.check(player_id, now)?;

        // Repeat casts and casts at a sealed fish change nothing and keep the shot
        let eliminated = self
            .state
            .targets
            .get(target_id)
            .is_some_and(|t| t.eliminated);
        if eliminated || self.state.ledger.open_target(player_id) == Some(target_id) {
            return Ok(Vec::new());
        }

        self.state.gates.try_consume(player_id, now)?;
        let cast = self.state.ledger.cast(player_id, target_id)?;

        let mut events = Vec::new();
        if let Some(displaced) = cast.displaced.as_ref().filter(|d| d.changed) {
            events.push(vote_update(
                &displaced.target_id,
                displaced.new_count,
                &displaced.voters,
            ));
        }
        events.push(vote_update(&cast.target_id, cast.new_count, &cast.voters));

        let connected = self.state.connected_count();
        let MatchState {
            targets, ledger, ..
        } = &mut self.state;
        let Some(target) = targets.get_mut(target_id) else {
            return Err(ActionDenied::UnknownTarget(target_id.clone()));
        };
        if let Some(owner_id) = &target.owner_id {
            events.push(Outbound::to(
                owner_id.clone(),
                ServerMsg::VoteReceived(VoteReceivedData {
                    fish_id: target_id.clone(),
                    voter_id: player_id.clone(),
                }),
            ));
        }

        if let Some(elimination) = self.resolver.evaluate(&cast, target, ledger, connected) {
            info!(
                match_id = %self.state.id,
                target_id = %elimination.target_id,
                is_ai = elimination.is_ai,
                votes = elimination.killers.len(),
                "Fish eliminated"
            );
            events.push(Outbound::all(ServerMsg::FishEliminate(FishEliminateData {
                fish_id: elimination.target_id.clone(),
                fish_name: elimination.target_name.clone(),
                is_ai: elimination.is_ai,
                fish_owner_id: elimination.owner_id.clone(),
                killer_names: self.state.display_names(&elimination.killers),
            })));
            events.extend(self.evaluate_outcome(now));
        }

        Ok(events)
    }

    fn retract(
        &mut self,
        player_id: &PlayerId,
        target_id: &TargetId,
    ) -> Result<Vec<Outbound>, ActionDenied> {
        let result = self.state.ledger.retract(player_id, target_id)?;
        if !result.changed {
            return Ok(Vec::new());
        }
        Ok(vec![vote_update(
            &result.target_id,
            result.new_count,
            &result.voters,
        )])
    }

    fn chase(
        &mut self,
        player_id: &PlayerId,
        target_id: &TargetId,
        now: Millis,
    ) -> Result<Vec<Outbound>, ActionDenied> {
        self.state.gates.check(player_id, now)?;

        let Some(target) = self.state.targets.get(target_id) else {
            return Err(ActionDenied::UnknownTarget(target_id.clone()));
        };
        if target.eliminated {
            return Ok(Vec::new());
        }
        let owner_id = target.owner_id.clone();

        self.state.gates.try_consume(player_id, now)?;
        self.state.ledger.assist(player_id, target_id)?;

        Ok(owner_id
            .map(|owner_id| {
                Outbound::to(
                    owner_id,
                    ServerMsg::VoteReceived(VoteReceivedData {
                        fish_id: target_id.clone(),
                        voter_id: player_id.clone(),
                    }),
                )
            })
            .into_iter()
            .collect())
    }

    /// Check for victory or defeat; ends the match when one is reached
    fn evaluate_outcome(&mut self, now: Millis) -> Vec<Outbound> {
        let census = self.state.census();
        let Some(outcome) = self.outcome.evaluate(census) else {
            return Vec::new();
        };

        self.state.phase = MatchPhase::Ended;
        self.state.ended_at = Some(to_datetime(now));

        let msg = match &outcome {
            MatchOutcome::Victory { census } => {
                let mvp = self.mvp();
                info!(
                    match_id = %self.state.id,
                    mvp = ?mvp.map(|p| &p.player_id),
                    human_remaining = census.human_remaining,
                    "Match won"
                );
                ServerMsg::GameVictory(GameVictoryData {
                    mvp_id: mvp.map(|p| p.player_id.clone()),
                    mvp_name: mvp.map(|p| p.display_name.clone()),
                    ai_remaining: census.ai_remaining,
                    human_remaining: census.human_remaining,
                })
            }
            MatchOutcome::Defeat { census, reason } => {
                info!(
                    match_id = %self.state.id,
                    %reason,
                    ai_remaining = census.ai_remaining,
                    "Match lost"
                );
                ServerMsg::GameDefeat(GameDefeatData {
                    ai_remaining: census.ai_remaining,
                    human_remaining: census.human_remaining,
                    reason: reason.to_string(),
                })
            }
        };
        vec![Outbound::all(msg)]
    }

    /// Player credited in the most AI eliminations; earliest joiner wins ties
    fn mvp(&self) -> Option<&PlayerState> {
        let mut credits: HashMap<&PlayerId, usize> = HashMap::new();
        for target in self
            .state
            .targets
            .values()
            .filter(|t| t.is_ai && t.eliminated)
        {
            for killer in &target.killers {
                *credits.entry(killer).or_default() += 1;
            }
        }

        credits
            .into_iter()
            .filter_map(|(id, n)| self.state.players.get(id).map(|p| (n, p)))
            .max_by(|(na, pa), (nb, pb)| na.cmp(nb).then(pb.join_order.cmp(&pa.join_order)))
            .map(|(_, p)| p)
    }
}

fn vote_update(target_id: &TargetId, count: usize, voters: &[PlayerId]) -> Outbound {
    Outbound::all(ServerMsg::VoteUpdate(VoteUpdateData {
        fish_id: target_id.clone(),
        count,
        voters: voters.to_vec(),
    }))
}

fn to_datetime(millis: Millis) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis as i64).unwrap_or_default()
}

/// Events buffered per subscriber before a slow socket starts lagging
pub const EVENT_BUFFER: usize = 256;

/// Requests processed by a match task
enum SessionCommand {
    Join {
        player_id: PlayerId,
        display_name: String,
        reply: oneshot::Sender<Result<MatchSnapshot, ActionDenied>>,
    },
    Submit {
        input: PlayerInput,
        reply: oneshot::Sender<Result<Vec<Outbound>, ActionDenied>>,
    },
    Leave {
        player_id: PlayerId,
    },
    Spawn {
        spec: TargetSpec,
        reply: oneshot::Sender<Result<Vec<Outbound>, SessionError>>,
    },
    Snapshot {
        reply: oneshot::Sender<MatchSnapshot>,
    },
}

/// Handle to a running match
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    cmd_tx: mpsc::Sender<SessionCommand>,
    event_tx: broadcast::Sender<Outbound>,
    player_count: Arc<AtomicUsize>,
    /// Authority clock at match end, 0 while running
    ended_at: Arc<AtomicU64>,
    /// Authority clock when the last player left, 0 while anyone is connected
    idle_since: Arc<AtomicU64>,
}

impl SessionHandle {
    /// Connected players
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn ended_at(&self) -> Option<Millis> {
        match self.ended_at.load(Ordering::Relaxed) {
            0 => None,
            at => Some(at),
        }
    }

    /// Since when nobody has been connected
    pub fn idle_since(&self) -> Option<Millis> {
        match self.idle_since.load(Ordering::Relaxed) {
            0 => None,
            at => Some(at),
        }
    }

    /// Receive every event the match publishes from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.event_tx.subscribe()
    }

    pub async fn join(
        &self,
        player_id: PlayerId,
        display_name: String,
    ) -> Result<MatchSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Join {
            player_id,
            display_name,
            reply,
        })
        .await?
        .map_err(SessionError::from)
    }

    pub async fn submit(&self, input: PlayerInput) -> Result<Vec<Outbound>, SessionError> {
        self.request(|reply| SessionCommand::Submit { input, reply })
            .await?
            .map_err(SessionError::from)
    }

    pub async fn leave(&self, player_id: PlayerId) -> Result<(), SessionError> {
        self.cmd_tx
            .send(SessionCommand::Leave { player_id })
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn spawn_target(&self, spec: TargetSpec) -> Result<Vec<Outbound>, SessionError> {
        self.request(|reply| SessionCommand::Spawn { spec, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<MatchSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(make(reply_tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }
}

/// Task that owns one `Session` and serializes every command against it
pub struct SessionTask {
    session: Session,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: broadcast::Sender<Outbound>,
    clock: Arc<dyn Clock>,
    player_count: Arc<AtomicUsize>,
    ended_at: Arc<AtomicU64>,
    idle_since: Arc<AtomicU64>,
}

impl SessionTask {
    pub fn new(session: Session, clock: Arc<dyn Clock>) -> (Self, SessionHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        let player_count = Arc::new(AtomicUsize::new(0));
        let ended_at = Arc::new(AtomicU64::new(0));
        // Nobody has joined yet
        let idle_since = Arc::new(AtomicU64::new(clock.now_millis().max(1)));

        let handle = SessionHandle {
            id: session.id(),
            cmd_tx,
            event_tx: event_tx.clone(),
            player_count: player_count.clone(),
            ended_at: ended_at.clone(),
            idle_since: idle_since.clone(),
        };

        let task = Self {
            session,
            cmd_rx,
            event_tx,
            clock,
            player_count,
            ended_at,
            idle_since,
        };

        (task, handle)
    }

    /// Process commands until every handle is dropped
    pub async fn run(mut self) {
        info!(match_id = %self.session.id(), "Match authority started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            self.handle(cmd);
        }

        info!(match_id = %self.session.id(), "Match authority stopped");
    }

    fn handle(&mut self, cmd: SessionCommand) {
        let now = self.clock.now_millis();
        let timer = Timer::new();

        match cmd {
            SessionCommand::Join {
                player_id,
                display_name,
                reply,
            } => {
                let result = self
                    .session
                    .join(&player_id, &display_name, now)
                    .map(|(snapshot, events)| {
                        self.publish(&events);
                        snapshot
                    });
                self.sync_counters(now);
                let _ = reply.send(result);
            }
            SessionCommand::Submit { input, reply } => {
                let result = self.session.submit_action(
                    &input.player_id,
                    input.kind,
                    &input.target_id,
                    input.client_timestamp,
                    now,
                );
                if let Ok(events) = &result {
                    self.publish(events);
                }
                debug!(
                    match_id = %self.session.id(),
                    player_id = %input.player_id,
                    queued_ms = now.saturating_sub(input.received_at),
                    elapsed_micros = timer.elapsed_micros(),
                    "Action processed"
                );
                self.sync_counters(now);
                let _ = reply.send(result);
            }
            SessionCommand::Leave { player_id } => {
                let events = self.session.leave(&player_id);
                self.publish(&events);
                self.sync_counters(now);
            }
            SessionCommand::Spawn { spec, reply } => {
                let result = self.session.spawn_target(spec, now);
                if let Ok(events) = &result {
                    self.publish(events);
                }
                self.sync_counters(now);
                let _ = reply.send(result);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot(now));
            }
        }
    }

    /// Mirror presence and end time into the handle's atomics. Runs before a
    /// reply goes out so callers observe them once their request returns.
    fn sync_counters(&self, now: Millis) {
        let connected = self.session.state().connected_count();
        self.player_count.store(connected, Ordering::Relaxed);
        if connected > 0 {
            self.idle_since.store(0, Ordering::Relaxed);
        } else if self.idle_since.load(Ordering::Relaxed) == 0 {
            self.idle_since.store(now.max(1), Ordering::Relaxed);
        }
        if self.session.is_over() && self.ended_at.load(Ordering::Relaxed) == 0 {
            self.ended_at.store(now.max(1), Ordering::Relaxed);
        }
    }

    fn publish(&self, events: &[Outbound]) {
        for event in events {
            // No subscribers is fine
            let _ = self.event_tx.send(event.clone());
        }
    }
}

/// Registry of all active matches
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
        }
    }

    /// Build a match, start its task and register it
    pub fn create(
        &self,
        rules: MatchRules,
        roster: Vec<TargetSpec>,
    ) -> Result<SessionHandle, SessionError> {
        let id = Uuid::new_v4();
        let session = Session::new(id, rules, roster, self.clock.now_millis())?;
        let (task, handle) = SessionTask::new(session, self.clock.clone());
        tokio::spawn(task.run());

        self.insert(handle.clone());
        info!(match_id = %id, "Match created");
        Ok(handle)
    }

    pub fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: SessionHandle) {
        self.sessions.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.sessions.len()
    }

    pub fn total_players(&self) -> usize {
        self.sessions
            .iter()
            .map(|m| m.value().player_count())
            .sum()
    }

    /// Drop matches that ended, or have had nobody connected, for at least
    /// `linger`. Dropping the registry's handle lets an idle task stop once
    /// no socket holds a handle either.
    pub fn reap_stale(&self, linger: Duration) -> usize {
        let now = self.clock.now_millis();
        let linger_ms = linger.as_millis() as u64;
        let expired =
            |at: Option<Millis>| at.is_some_and(|at| now.saturating_sub(at) >= linger_ms);
        let before = self.sessions.len();
        self.sessions.retain(|id, handle| {
            if expired(handle.ended_at()) {
                info!(match_id = %id, "Finished match reaped");
                false
            } else if expired(handle.idle_since()) {
                info!(match_id = %id, "Abandoned match reaped");
                false
            } else {
                true
            }
        });
        before - self.sessions.len()
    }
}
