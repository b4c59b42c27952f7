//! Movement, overwatch and field-of-view tests.

use squad_core::prelude::*;
use squad_test_utils::dice::ScriptedDice;
use squad_test_utils::fixtures::{arena_session, pos, skirmish, walled_arena};

const PLAYER: UnitId = UnitId(0);
const ENEMY: UnitId = UnitId(1);

fn position(session: &Session, id: UnitId) -> GridPos {
    session.unit(id).expect("unit exists").position
}

/// Enemy at (14,10) goes on overwatch out of the player's sight.
fn overwatch_ambush(dice: ScriptedDice) -> Session {
    let mut session = skirmish(&[pos(2, 10)], &[pos(14, 10)], dice);
    session.end_player_turn().unwrap();
    session.set_overwatch(ENEMY).unwrap();
    // Nothing to see and nowhere to search: the turn simply ends.
    session.run_enemy_turn().unwrap();
    assert_eq!(session.state(), TurnState::PlayerTurn);
    assert!(session.unit(ENEMY).unwrap().is_on_overwatch);
    session
}

#[test]
fn steps_spend_ap_one_at_a_time() {
    let mut session = skirmish(&[pos(2, 2)], &[pos(18, 18)], ScriptedDice::always_miss());
    session.request_move(PLAYER, pos(2, 6)).unwrap();
    assert_eq!(session.unit(PLAYER).unwrap().path.len(), 4);
    assert_eq!(session.unit(PLAYER).unwrap().ap, 10);

    session.advance_move(PLAYER).unwrap();
    session.advance_move(PLAYER).unwrap();
    assert_eq!(position(&session, PLAYER), pos(2, 4));
    assert_eq!(session.unit(PLAYER).unwrap().ap, 8);
    assert_eq!(session.unit(PLAYER).unwrap().stats.distance_travelled, 4);
}

#[test]
fn ticks_walk_the_selected_unit() {
    let mut session = skirmish(&[pos(2, 2)], &[pos(18, 18)], ScriptedDice::always_miss());
    session.request_move(PLAYER, pos(5, 2)).unwrap();
    for _ in 0..10 {
        session.tick();
    }
    assert_eq!(position(&session, PLAYER), pos(5, 2));
    assert_eq!(session.unit(PLAYER).unwrap().ap, 7);
    assert_eq!(session.tick_count(), 10);
}

#[test]
fn move_onto_wall_or_unit_is_rejected() {
    let map = walled_arena(10, 10);
    let mut session = arena_session(
        map,
        &[pos(2, 2), pos(3, 3)],
        &[&[pos(7, 7)]],
        ScriptedDice::always_miss(),
    );
    session.start().unwrap();
    assert_eq!(
        session.request_move(PLAYER, pos(0, 0)),
        Err(Rejection::InvalidDestination(pos(0, 0)))
    );
    assert_eq!(
        session.request_move(PLAYER, pos(3, 3)),
        Err(Rejection::InvalidDestination(pos(3, 3)))
    );
}

#[test]
fn enemy_in_the_way_blocks_the_step() {
    // Planning ignores enemies, so the straight path runs through (5,10).
    let mut session = skirmish(&[pos(2, 10)], &[pos(5, 10)], ScriptedDice::always_miss());
    session.request_move(PLAYER, pos(8, 10)).unwrap();
    session.advance_move(PLAYER).unwrap();
    session.advance_move(PLAYER).unwrap();
    assert_eq!(
        session.advance_move(PLAYER),
        Err(Rejection::StepBlocked(pos(5, 10)))
    );
    let unit = session.unit(PLAYER).unwrap();
    assert_eq!(unit.position, pos(4, 10));
    assert!(unit.path.is_empty());
    assert_eq!(unit.ap, 8);
}

#[test]
fn overwatch_fires_once_when_unit_enters_range() {
    // The reaction shot hits (9 + 3 = 12).
    let mut session = overwatch_ambush(ScriptedDice::new([9], 1));
    session.request_move(PLAYER, pos(8, 10)).unwrap();
    for _ in 0..3 {
        session.advance_move(PLAYER).unwrap();
    }
    assert_eq!(session.unit(PLAYER).unwrap().hp, 100);

    // (6,10) is exactly eight tiles from the watcher.
    session.advance_move(PLAYER).unwrap();
    let player = session.unit(PLAYER).unwrap();
    assert_eq!(player.hp, 75);
    assert_eq!(player.position, pos(6, 10));

    let watcher = session.unit(ENEMY).unwrap();
    assert!(watcher.has_fired_overwatch);
    assert!(!watcher.is_on_overwatch);
    assert!(session.pending_events().iter().any(|e| matches!(
        e,
        SimEvent::AttackResolved { attacker, reaction: true, .. } if *attacker == ENEMY
    )));
}

#[test]
fn new_contact_interrupts_the_move() {
    let mut session = overwatch_ambush(ScriptedDice::always_miss());
    session.request_move(PLAYER, pos(8, 10)).unwrap();
    for _ in 0..4 {
        session.advance_move(PLAYER).unwrap();
    }
    assert_eq!(session.visible_enemies(), vec![ENEMY]);
    assert!(session.unit(PLAYER).unwrap().path.is_empty());
    assert!(session
        .pending_events()
        .contains(&SimEvent::MoveInterrupted { unit: PLAYER }));
    assert_eq!(
        session.advance_move(PLAYER),
        Err(Rejection::NoPath(PLAYER))
    );
}

#[test]
fn explored_tiles_stay_explored() {
    let mut session = skirmish(&[pos(2, 2)], &[pos(18, 18)], ScriptedDice::always_miss());
    assert!(session.map().is_visible(pos(2, 9)));
    assert!(!session.map().is_visible(pos(2, 11)));

    session.request_move(PLAYER, pos(2, 5)).unwrap();
    for _ in 0..3 {
        session.advance_move(PLAYER).unwrap();
    }
    assert!(session.map().is_visible(pos(2, 11)));
    session.request_move(PLAYER, pos(2, 2)).unwrap();
    for _ in 0..3 {
        session.advance_move(PLAYER).unwrap();
    }
    let tile = session.map().tile(pos(2, 11)).unwrap();
    assert!(!tile.is_visible);
    assert!(tile.is_explored);
}

#[test]
fn prone_viewer_cannot_see_past_cover() {
    let map = GridMap::from_ascii(
        "
        ..........
        ..........
        ..+.......
        ..........
        ..........
        ",
    );
    let mut session = arena_session(map, &[pos(2, 0)], &[&[pos(9, 4)]], ScriptedDice::always_miss());
    session.start().unwrap();
    assert!(session.map().is_visible(pos(2, 4)));

    session.toggle_posture(PLAYER).unwrap();
    assert_eq!(session.unit(PLAYER).unwrap().posture, Posture::Prone);
    assert!(session.map().is_visible(pos(2, 2)));
    assert!(!session.map().is_visible(pos(2, 4)));
}
