use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use reverse_turing_server::config::MatchRules;
use reverse_turing_server::game::clock::{Clock, ManualClock, Millis};
use reverse_turing_server::game::session::MatchPhase;
use reverse_turing_server::game::{
    ActionDenied, ActionKind, PlayerId, PlayerInput, Session, SessionError, SessionRegistry,
    TargetId, TargetSpec,
};
use reverse_turing_server::ws::protocol::ServerMsg;

const START: Millis = 1_700_000_000_000;

fn roster() -> Vec<TargetSpec> {
    let mut roster = vec![TargetSpec::ai("ai-1", "Bubbles")];
    for i in 1..=6 {
        roster.push(TargetSpec::human(
            format!("fish-{i}"),
            format!("Fish {i}"),
            format!("owner-{i}"),
        ));
    }
    roster
}

fn input(player: &str, kind: ActionKind, target: &str) -> PlayerInput {
    PlayerInput {
        player_id: PlayerId::new(player),
        kind,
        target_id: TargetId::new(target),
        client_timestamp: None,
        received_at: START,
    }
}

fn setup() -> (SessionRegistry, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START));
    let registry = SessionRegistry::new(clock.clone() as Arc<dyn Clock>);
    (registry, clock)
}

#[tokio::test]
async fn concurrent_casts_eliminate_exactly_once() {
    let (registry, _clock) = setup();
    let handle = assert_ok!(registry.create(MatchRules::default(), roster()));
    for i in 0..8 {
        assert_ok!(handle.join(PlayerId::new(format!("p{i}")), format!("P{i}")).await);
    }
    assert_eq!(handle.player_count(), 8);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            handle
                .submit(input(&format!("p{i}"), ActionKind::Cast, "fish-1"))
                .await
        }));
    }

    let mut eliminations = 0;
    for task in tasks {
        let events = assert_ok!(task.await.unwrap());
        eliminations += events
            .iter()
            .filter(|o| matches!(o.msg, ServerMsg::FishEliminate(_)))
            .count();
    }
    assert_eq!(eliminations, 1);

    let snapshot = assert_ok!(handle.snapshot().await);
    let fish = snapshot
        .targets
        .iter()
        .find(|t| t.fish_id == TargetId::new("fish-1"))
        .unwrap();
    assert!(fish.eliminated);
    assert_eq!(fish.count, 4);
    assert_eq!(fish.killer_names.len(), 4);
}

#[tokio::test]
async fn subscribers_see_events_in_order() {
    let (registry, _clock) = setup();
    let handle = assert_ok!(registry.create(MatchRules::default(), roster()));
    let mut events = handle.subscribe();

    for i in 0..4 {
        assert_ok!(handle.join(PlayerId::new(format!("p{i}")), String::new()).await);
    }
    for i in 0..4 {
        assert_ok!(handle.submit(input(&format!("p{i}"), ActionKind::Cast, "ai-1")).await);
    }

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(match event.msg {
            ServerMsg::PlayerJoined(_) => "player:joined",
            ServerMsg::VoteUpdate(_) => "vote:update",
            ServerMsg::FishEliminate(_) => "fish:eliminate",
            ServerMsg::GameVictory(_) => "game:victory",
            ServerMsg::GameDefeat(_) => "game:defeat",
            _ => "other",
        });
    }
    // AI fish have no owner, so no vote:received
    assert_eq!(
        names,
        vec![
            "player:joined",
            "player:joined",
            "player:joined",
            "player:joined",
            "vote:update",
            "vote:update",
            "vote:update",
            "vote:update",
            "fish:eliminate",
            "game:victory",
        ]
    );
}

#[tokio::test]
async fn match_over_after_victory() {
    let (registry, clock) = setup();
    let handle = assert_ok!(registry.create(MatchRules::default(), roster()));
    for i in 0..5 {
        assert_ok!(handle.join(PlayerId::new(format!("p{i}")), format!("P{i}")).await);
    }
    for i in 0..4 {
        assert_ok!(handle.submit(input(&format!("p{i}"), ActionKind::Cast, "ai-1")).await);
    }

    let snapshot = assert_ok!(handle.snapshot().await);
    assert_eq!(snapshot.phase, MatchPhase::Ended);
    assert!(snapshot.outcome.as_ref().is_some_and(|o| o.victory));
    assert_eq!(handle.ended_at(), Some(START));

    let denied = assert_err!(handle.submit(input("p4", ActionKind::Cast, "fish-1")).await);
    assert!(matches!(denied, SessionError::Denied(ActionDenied::MatchOver)));

    let late = assert_err!(handle.join(PlayerId::new("late"), "Late".into()).await);
    assert!(matches!(late, SessionError::Denied(ActionDenied::MatchOver)));

    // Finished matches linger, then get reaped
    assert_eq!(registry.reap_stale(Duration::from_secs(60)), 0);
    clock.advance(Duration::from_secs(60));
    assert_eq!(registry.reap_stale(Duration::from_secs(60)), 1);
    assert!(registry.get(&handle.id).is_none());
}

#[tokio::test]
async fn cooldown_follows_the_authority_clock() {
    let (registry, clock) = setup();
    let handle = assert_ok!(registry.create(MatchRules::default(), roster()));
    assert_ok!(handle.join(PlayerId::new("p1"), "P1".into()).await);

    assert_ok!(handle.submit(input("p1", ActionKind::Cast, "fish-1")).await);

    clock.advance(Duration::from_millis(7_499));
    let denied = assert_err!(handle.submit(input("p1", ActionKind::Cast, "fish-2")).await);
    assert!(matches!(
        denied,
        SessionError::Denied(ActionDenied::StillCoolingDown { ready_at }) if ready_at == START + 7_500
    ));

    clock.advance(Duration::from_millis(1));
    let events = assert_ok!(handle.submit(input("p1", ActionKind::Cast, "fish-2")).await);
    // vote moved: old target, new target, owner notice
    assert_eq!(events.len(), 3);
}

#[tokio::test]
async fn leave_keeps_votes_and_updates_count() {
    let (registry, _clock) = setup();
    let handle = assert_ok!(registry.create(MatchRules::default(), roster()));
    assert_ok!(handle.join(PlayerId::new("p1"), "P1".into()).await);
    assert_ok!(handle.join(PlayerId::new("p2"), "P2".into()).await);
    assert_ok!(handle.submit(input("p1", ActionKind::Cast, "fish-3")).await);

    assert_ok!(handle.leave(PlayerId::new("p1")).await);
    let snapshot = assert_ok!(handle.snapshot().await);
    assert_eq!(handle.player_count(), 1);
    assert_eq!(registry.total_players(), 1);

    let fish = snapshot
        .targets
        .iter()
        .find(|t| t.fish_id == TargetId::new("fish-3"))
        .unwrap();
    assert_eq!(fish.voters, vec![PlayerId::new("p1")]);
}

#[tokio::test]
async fn abandoned_match_is_reaped() {
    let (registry, clock) = setup();
    let linger = Duration::from_secs(60);
    let abandoned = assert_ok!(registry.create(MatchRules::default(), roster()));
    let busy = assert_ok!(registry.create(MatchRules::default(), roster()));
    let never_joined = assert_ok!(registry.create(MatchRules::default(), roster()));

    assert_ok!(abandoned.join(PlayerId::new("p1"), "P1".into()).await);
    assert_ok!(busy.join(PlayerId::new("p2"), "P2".into()).await);

    clock.advance(Duration::from_secs(30));
    assert_ok!(abandoned.leave(PlayerId::new("p1")).await);
    // Leave is fire-and-forget; a request behind it has been processed after it
    assert_ok!(abandoned.snapshot().await);
    assert_eq!(abandoned.idle_since(), Some(START + 30_000));
    assert_eq!(busy.idle_since(), None);

    clock.advance(Duration::from_secs(30));
    // Nobody ever joined this one, so it has been idle since creation
    assert_eq!(registry.reap_stale(linger), 1);
    assert!(registry.get(&never_joined.id).is_none());

    clock.advance(Duration::from_secs(30));
    assert_eq!(registry.reap_stale(linger), 1);
    assert!(registry.get(&abandoned.id).is_none());
    assert!(registry.get(&busy.id).is_some());
    assert_eq!(registry.active_matches(), 1);
}

#[tokio::test]
async fn rejoining_clears_the_idle_mark() {
    let (registry, clock) = setup();
    let handle = assert_ok!(registry.create(MatchRules::default(), roster()));
    assert_ok!(handle.join(PlayerId::new("p1"), "P1".into()).await);
    assert_ok!(handle.leave(PlayerId::new("p1")).await);
    assert_ok!(handle.snapshot().await);
    assert!(handle.idle_since().is_some());

    clock.advance(Duration::from_secs(59));
    assert_ok!(handle.join(PlayerId::new("p1"), "P1".into()).await);
    assert_eq!(handle.idle_since(), None);

    clock.advance(Duration::from_secs(60));
    assert_eq!(registry.reap_stale(Duration::from_secs(60)), 0);
}

/// Random cast/retract/chase traffic against one session, checking the
/// ledger and gate invariants after every step.
#[test]
fn randomized_traffic_preserves_invariants() {
    for seed in 0..8u64 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let rules = MatchRules {
            max_human_killed: None,
            ..MatchRules::default()
        };
        let mut roster = roster();
        roster.push(TargetSpec::ai("ai-2", "Gill"));
        let targets: Vec<TargetId> = roster.iter().map(|t| t.id.clone()).collect();
        let mut session = Session::new(Uuid::new_v4(), rules, roster, START).unwrap();

        let players: Vec<PlayerId> = (0..10).map(|i| PlayerId::new(format!("p{i}"))).collect();
        for player in &players {
            session.join(player, "", START).unwrap();
        }

        let mut now = START;
        let mut last_shot: HashMap<PlayerId, Millis> = HashMap::new();
        let mut eliminated: BTreeSet<TargetId> = BTreeSet::new();

        for _ in 0..400 {
            now += rng.gen_range(0..2_000);
            let player = &players[rng.gen_range(0..players.len())];
            let target = &targets[rng.gen_range(0..targets.len())];
            let kind = match rng.gen_range(0..10) {
                0..=5 => ActionKind::Cast,
                6..=8 => ActionKind::Retract,
                _ => ActionKind::Chase,
            };

            let was_over = session.is_over();
            let result = session.submit_action(player, kind, target, None, now);

            if was_over {
                assert_eq!(result, Err(ActionDenied::MatchOver));
                continue;
            }

            if let Ok(events) = &result {
                // A shot was spent: must respect the cooldown
                let spent = kind.uses_ammo()
                    && session.state().gates.status(player, now).is_some_and(|g| !g.loaded)
                    && !events.is_empty();
                if spent {
                    if let Some(prev) = last_shot.insert(player.clone(), now) {
                        assert!(now - prev >= 7_500, "seed {seed}: shot {prev} -> {now}");
                    }
                }
                for event in events {
                    if let ServerMsg::FishEliminate(data) = &event.msg {
                        assert!(
                            eliminated.insert(data.fish_id.clone()),
                            "seed {seed}: {} eliminated twice",
                            data.fish_id
                        );
                    }
                }
            }

            let state = session.state();
            for target_id in &targets {
                let target = &state.targets[target_id];
                let count = state.ledger.count(target_id);
                // Tally recomputed from each player's open vote, or the frozen killers
                let expected = if state.ledger.is_sealed(target_id) {
                    target.killers.len()
                } else {
                    players
                        .iter()
                        .filter(|p| state.ledger.open_target(p) == Some(target_id))
                        .count()
                };
                assert_eq!(count, expected, "seed {seed}: tally of {target_id}");
                assert_eq!(target.eliminated, state.ledger.is_sealed(target_id));
                if target.eliminated {
                    assert_eq!(target.killers, state.ledger.voters(target_id));
                }
            }
            for player in &players {
                let open = state.ledger.open_target(player);
                let holding = targets
                    .iter()
                    .filter(|t| {
                        !state.ledger.is_sealed(t) && state.ledger.voters(t).contains(player)
                    })
                    .count();
                assert_eq!(holding, usize::from(open.is_some()));
            }
        }

        let census = session.state().census();
        if session.state().phase == MatchPhase::Ended {
            assert!(session.outcome().is_some());
        } else {
            assert!(census.ai_remaining > 0 || census.human_remaining < 5);
        }
    }
}
