//! Map generation, configuration loading and replay file tests.

use std::collections::HashSet;

use squad_core::prelude::*;
use squad_core::replay::REPLAY_VERSION;
use squad_test_utils::determinism::play_turns;
use squad_test_utils::fixtures::small_config;
use tempfile::TempDir;

// =============================================================================
// Generated worlds
// =============================================================================

#[test]
fn every_spawn_point_is_reachable_from_every_other() {
    for seed in 0..20 {
        let session = Session::new(GameConfig::default().with_seed(seed)).unwrap();
        let map = session.map();
        let spawns = map.spawn_points();
        assert!(spawns.len() >= 4, "seed {seed}: only {} rooms", spawns.len());
        for &a in spawns {
            for &b in spawns {
                let path = find_path(map, a, b, &HashSet::new());
                assert!(!path.is_empty(), "seed {seed}: {a} cannot reach {b}");
            }
        }
    }
}

#[test]
fn squads_spawn_on_distinct_open_tiles() {
    let session = Session::new(GameConfig::default().with_seed(99)).unwrap();
    let mut seen = HashSet::new();
    for unit in session.units() {
        assert!(session.map().is_walkable(unit.position));
        assert!(!session.map().is_cover(unit.position));
        assert!(seen.insert(unit.position), "two units on {}", unit.position);
    }
    assert_eq!(session.player_squad().members.len(), 4);
    assert_eq!(session.enemy_squads().len(), 3);
}

#[test]
fn player_units_get_phonetic_names() {
    let session = Session::new(GameConfig::default()).unwrap();
    let names: Vec<_> = session
        .living(Team::Player)
        .map(|u| (u.number, u.label()))
        .collect();
    assert_eq!(
        names,
        vec![
            (Some(1), "Alpha".to_string()),
            (Some(2), "Bravo".to_string()),
            (Some(3), "Charlie".to_string()),
            (Some(4), "Delta".to_string()),
        ]
    );
}

#[test]
fn impossible_map_fails_with_generation_error() {
    // Six 5x5 rooms cannot fit in a 12x12 map.
    let config = GameConfig::default()
        .with_map(MapConfig::default().with_size(12, 12))
        .with_squads(1, 5);
    match Session::new(config) {
        Err(GameError::MapGeneration { required, found, .. }) => {
            assert_eq!(required, 6);
            assert!(found < 6);
        }
        other => panic!("expected MapGeneration error, got {other:?}"),
    }
}

#[test]
fn reset_builds_a_fresh_world() {
    let mut session = Session::new(small_config(8)).unwrap();
    play_turns(&mut session, 2);
    session.reset().unwrap();

    assert_eq!(session.state(), TurnState::HomeScreen);
    assert_eq!(session.turn_number(), 1);
    assert!(session.units().iter().all(|u| u.is_alive && u.hp == u.max_hp));
    assert!(session.effects().is_empty());
    session.start().unwrap();
}

// =============================================================================
// Configuration files
// =============================================================================

#[test]
fn config_loads_from_ron_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("match.ron");
    std::fs::write(
        &path,
        "GameConfig(seed: 7, squads: SquadConfig(squad_size: 2, enemy_squads: 1))",
    )
    .unwrap();

    let config = GameConfig::load(&path).unwrap();
    assert_eq!(config.seed, 7);
    assert_eq!(config.squads.squad_size, 2);
    // Unlisted sections keep their defaults.
    assert_eq!(config.costs, ApCosts::default());
}

#[test]
fn config_round_trips_through_ron() {
    let config = small_config(3);
    let text = config.to_ron_string().unwrap();
    assert_eq!(GameConfig::from_ron_str(&text).unwrap(), config);
}

#[test]
fn malformed_config_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.ron");
    std::fs::write(&path, "GameConfig(seed: \"seven\")").unwrap();
    match GameConfig::load(&path) {
        Err(GameError::DataParseError { path: reported, .. }) => {
            assert!(reported.ends_with("broken.ron"));
        }
        other => panic!("expected DataParseError, got {other:?}"),
    }
}

#[test]
fn invalid_config_values_are_rejected() {
    let result = GameConfig::from_ron_str("GameConfig(costs: ApCosts(movement: 0))");
    assert!(matches!(result, Err(GameError::InvalidConfig(_))));
}

// =============================================================================
// Replay files
// =============================================================================

#[test]
fn replay_survives_save_and_load() {
    let mut session = Session::new(small_config(31)).unwrap();
    play_turns(&mut session, 4);
    let replay = session.to_replay();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("game.replay");
    replay.save(&path).unwrap();
    let loaded = Replay::load(&path).unwrap();

    assert_eq!(loaded, replay);
    let rebuilt = loaded.verify().unwrap();
    assert_eq!(rebuilt.state_hash(), session.state_hash());
    assert_eq!(rebuilt.outcome(), session.outcome());
}

#[test]
fn replay_from_newer_version_is_refused() {
    let mut replay = Session::new(small_config(1)).unwrap().to_replay();
    replay.version = REPLAY_VERSION + 1;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("future.replay");
    replay.save(&path).unwrap();
    assert!(matches!(
        Replay::load(&path),
        Err(GameError::InvalidState(_))
    ));
}
