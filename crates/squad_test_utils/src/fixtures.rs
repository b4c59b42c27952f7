//! Test fixtures and helpers.
//!
//! Hand-built maps and sessions with known unit placement, for tests that
//! need exact geometry instead of a generated map.

use squad_core::combat::Dice;
use squad_core::config::{GameConfig, MapConfig};
use squad_core::grid_map::GridMap;
use squad_core::math::GridPos;
use squad_core::session::{Session, SquadLayout};
use squad_core::unit::Team;

use crate::dice::ScriptedDice;

/// Shorthand for a grid position.
#[must_use]
pub const fn pos(x: i32, y: i32) -> GridPos {
    GridPos::new(x, y)
}

/// Open floor surrounded by a one-tile wall.
#[must_use]
pub fn walled_arena(width: u32, height: u32) -> GridMap {
    let mut map = GridMap::open(width, height);
    let (w, h) = (width as i32, height as i32);
    for x in 0..w {
        for y in 0..h {
            if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
                if let Some(tile) = map.tile_mut(pos(x, y)) {
                    tile.is_wall = true;
                }
            }
        }
    }
    map
}

/// A configuration small enough for fast generated-map tests.
#[must_use]
pub fn small_config(seed: u64) -> GameConfig {
    GameConfig::default()
        .with_seed(seed)
        .with_map(MapConfig::small())
        .with_squads(3, 2)
}

/// Session on `map` with one player squad and the given enemy squads.
///
/// # Panics
///
/// Panics if the placement is invalid.
#[must_use]
pub fn arena_session(
    map: GridMap,
    player: &[GridPos],
    enemies: &[&[GridPos]],
    dice: impl Dice + 'static,
) -> Session {
    let mut layouts = vec![SquadLayout::new(Team::Player, player.to_vec())];
    layouts.extend(
        enemies
            .iter()
            .map(|squad| SquadLayout::new(Team::Enemy, squad.to_vec())),
    );
    Session::with_layout(GameConfig::default(), map, layouts, Box::new(dice))
        .expect("fixture layout should be valid")
}

/// Open 20x20 field, one player squad against one enemy squad, started.
///
/// # Panics
///
/// Panics if the placement is invalid.
#[must_use]
pub fn skirmish(player: &[GridPos], enemy: &[GridPos], dice: ScriptedDice) -> Session {
    let mut session = arena_session(GridMap::open(20, 20), player, &[enemy], dice);
    session.start().expect("fresh session starts");
    session
}

#[cfg(test)]
mod tests {
    use super::*;
    use squad_core::session::TurnState;

    #[test]
    fn test_walled_arena_border() {
        let map = walled_arena(6, 5);
        assert!(map.is_wall(pos(0, 0)));
        assert!(map.is_wall(pos(5, 4)));
        assert!(map.is_walkable(pos(1, 1)));
        assert!(map.is_walkable(pos(4, 3)));
    }

    #[test]
    fn test_skirmish_is_started() {
        let session = skirmish(&[pos(1, 1)], &[pos(10, 10)], ScriptedDice::always_hit());
        assert_eq!(session.state(), TurnState::PlayerTurn);
        assert_eq!(session.units().len(), 2);
    }
}
