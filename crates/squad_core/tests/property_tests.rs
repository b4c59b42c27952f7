//! Property tests over arbitrary command streams and seeds.

use std::collections::HashSet;

use proptest::prelude::*;
use squad_core::prelude::*;
use squad_test_utils::determinism::{
    find_first_divergence, play_turns, run_parallel_sessions, strategies,
    verify_session_determinism,
};
use squad_test_utils::fixtures::{small_config, walled_arena};

/// Rejections that clear a queued path or let overwatch fire.
fn may_mutate(rejection: &Rejection) -> bool {
    matches!(
        rejection,
        Rejection::StepBlocked(_) | Rejection::InsufficientAp { .. } | Rejection::KilledByReaction(_)
    )
}

fn check_unit_invariants(session: &Session) {
    let mut cells = HashSet::new();
    for unit in session.units() {
        assert!(unit.hp <= unit.max_hp, "{} hp above max", unit.id);
        assert!(unit.ap <= unit.max_ap, "{} ap above max", unit.id);
        assert_eq!(unit.is_alive, unit.hp > 0, "{} alive flag out of sync", unit.id);
        if unit.is_alive {
            assert!(cells.insert(unit.position), "two units on {}", unit.position);
            assert!(session.map().is_walkable(unit.position));
        } else {
            assert!(!unit.is_on_overwatch);
            assert!(unit.path.is_empty());
        }
    }
}

#[test]
fn full_games_are_reproducible() {
    for seed in [1, 2, 3] {
        let config = small_config(seed);
        let mut session = Session::new(config.clone()).unwrap();
        play_turns(&mut session, 6);
        let commands = session.commands().to_vec();

        verify_session_determinism(&config, &commands, 3).assert_deterministic();
        run_parallel_sessions(&config, &commands, 4).assert_deterministic();
        assert_eq!(find_first_divergence(&config, &commands), None);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn units_stay_consistent(
        seed in strategies::arb_seed(),
        commands in strategies::arb_command_sequence(9, 60),
    ) {
        let mut session = Session::new(small_config(seed)).unwrap();
        let mut explored: HashSet<GridPos> = HashSet::new();
        let mut dead: HashSet<UnitId> = HashSet::new();
        for command in commands {
            let hash_before = session.state_hash();
            let result = session.apply(command).unwrap();
            if let Err(rejection) = &result {
                if !may_mutate(rejection) {
                    prop_assert_eq!(session.state_hash(), hash_before, "{:?} mutated state", command);
                }
            }
            check_unit_invariants(&session);

            // Explored tiles never become unexplored.
            let now: HashSet<GridPos> = session
                .map()
                .tiles()
                .iter()
                .filter(|t| t.is_explored)
                .map(|t| t.position)
                .collect();
            prop_assert!(explored.is_subset(&now));
            explored = now;

            // The dead stay dead.
            for id in &dead {
                prop_assert!(!session.unit(*id).unwrap().is_alive);
            }
            dead.extend(session.units().iter().filter(|u| !u.is_alive).map(|u| u.id));
        }
    }

    #[test]
    fn line_of_sight_is_deterministic_and_bounded(
        from in strategies::arb_grid_pos(16, 16),
        to in strategies::arb_grid_pos(16, 16),
    ) {
        let map = walled_arena(16, 16);
        let nobody = Occupants::new();
        let first = map.line_of_sight(from, Posture::Standing, to, &nobody);
        let second = map.line_of_sight(from, Posture::Standing, to, &nobody);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first[0], from);
        let steps = from.x.abs_diff(to.x).max(from.y.abs_diff(to.y)) as usize;
        prop_assert!(first.len() <= steps + 1);
    }

    #[test]
    fn paths_are_walkable_and_connected(
        from in strategies::arb_grid_pos(16, 16),
        to in strategies::arb_grid_pos(16, 16),
    ) {
        let map = walled_arena(16, 16);
        let path = find_path(&map, from, to, &HashSet::new());
        if map.is_walkable(from) && map.is_walkable(to) {
            prop_assert_eq!(path.len() as u32, from.manhattan_distance(to) + 1);
            for pair in path.windows(2) {
                prop_assert_eq!(pair[0].manhattan_distance(pair[1]), 1);
                prop_assert!(map.is_walkable(pair[1]));
            }
        } else if !map.is_walkable(to) {
            prop_assert!(path.is_empty());
        }
    }

    #[test]
    fn generated_sessions_meet_spawn_requirements(
        seed in strategies::arb_seed(),
        cover in strategies::arb_cover_percent(),
    ) {
        let config = small_config(seed).with_map(MapConfig::small().with_cover_percent(cover));
        let session = Session::new(config.clone()).unwrap();
        prop_assert!(session.map().spawn_points().len() >= config.squads.required_spawn_points());
        prop_assert_eq!(session.squads().len(), 3);
        check_unit_invariants(&session);
    }
}
