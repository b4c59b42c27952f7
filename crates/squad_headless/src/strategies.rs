//! Scripted player squad for headless playtesting.
//!
//! The [`AutoPlayer`] drives every living player unit in squad order until
//! it has nothing useful left to do:
//!
//! 1. melee an adjacent enemy,
//! 2. otherwise shoot the weakest visible enemy it has a clear line to,
//! 3. otherwise step towards the nearest visible enemy, then the nearest
//!    remembered one, then the nearest unexplored spawn point,
//!
//! and then hands the turn over. It only uses what the player can see:
//! squadmates, visible enemies and its own memory of where enemies were.
//! Every input goes through [`Session::apply`], so played matches can be
//! saved as replays.

use std::collections::{BTreeMap, HashSet};

use squad_core::prelude::*;

use crate::error::{Result, RunnerError};

/// What a unit decided to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Strike an adjacent enemy.
    Melee(UnitId),
    /// Fire at a visible enemy.
    Shoot(UnitId),
    /// Move one cell.
    Step(GridPos),
    /// Nothing worth spending AP on.
    Hold,
}

/// Plays the player side of a match.
#[derive(Debug, Clone, Default)]
pub struct AutoPlayer {
    last_seen: BTreeMap<UnitId, GridPos>,
}

impl AutoPlayer {
    /// Create a player with no memory of the enemy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Where each enemy was last seen.
    #[must_use]
    pub fn last_seen(&self) -> &BTreeMap<UnitId, GridPos> {
        &self.last_seen
    }

    /// Play the current player turn to the end.
    ///
    /// Returns the number of accepted actions.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Stalled`] when called outside the player turn.
    pub fn play_turn(&mut self, session: &mut Session) -> Result<u32> {
        if session.state() != TurnState::PlayerTurn {
            return Err(RunnerError::Stalled {
                turn: session.turn_number(),
                reason: format!("expected player turn, found {}", session.state().name()),
            });
        }

        let mut actions = 0;
        let squad = session.player_squad().members.clone();
        for id in squad {
            loop {
                if session.state() != TurnState::PlayerTurn {
                    return Ok(actions);
                }
                self.observe(session);
                let intent = self.decide(session, id);
                if !execute(session, id, intent)? {
                    break;
                }
                actions += 1;
            }
        }

        self.observe(session);
        if session.state() == TurnState::PlayerTurn {
            let _ = session.apply(Command::EndPlayerTurn)?;
        }
        tracing::debug!(turn = session.turn_number(), actions, "Auto player done");
        Ok(actions)
    }

    /// Refresh enemy memory from what the squad sees now.
    ///
    /// Memories of dead enemies are dropped, as are memories of cells the
    /// squad can see that the enemy is no longer on.
    pub fn observe(&mut self, session: &Session) {
        let visible: HashSet<UnitId> = session.visible_enemies().into_iter().collect();
        for &id in &visible {
            if let Some(enemy) = session.unit(id) {
                self.last_seen.insert(id, enemy.position);
            }
        }
        self.last_seen.retain(|id, cell| {
            session.unit(*id).is_some_and(|u| u.is_alive)
                && (visible.contains(id) || !session.map().is_visible(*cell))
        });
    }

    /// Pick the next action for `id`.
    #[must_use]
    pub fn decide(&self, session: &Session, id: UnitId) -> Intent {
        let Some(unit) = session.unit(id).filter(|u| u.is_alive) else {
            return Intent::Hold;
        };
        let costs = &session.config().costs;
        let mut enemies: Vec<&Unit> = session
            .visible_enemies()
            .into_iter()
            .filter_map(|enemy| session.unit(enemy))
            .collect();

        if unit.ap >= costs.melee {
            if let Some(enemy) = enemies.iter().find(|e| e.position.is_adjacent(unit.position)) {
                return Intent::Melee(enemy.id);
            }
        }

        if unit.ap >= costs.shoot {
            enemies.sort_by_key(|e| (e.hp, e.id));
            let known = known_occupants(session, id);
            let clear_shot = enemies.iter().find(|e| {
                session
                    .map()
                    .has_line_of_sight(unit.position, unit.posture, e.position, &known)
            });
            if let Some(enemy) = clear_shot {
                return Intent::Shoot(enemy.id);
            }
        }

        if unit.ap >= costs.movement {
            let step = self
                .goal(session, unit.position, &enemies)
                .and_then(|goal| next_step(session, id, goal));
            if let Some(step) = step {
                return Intent::Step(step);
            }
        }
        Intent::Hold
    }

    fn goal(&self, session: &Session, from: GridPos, visible: &[&Unit]) -> Option<GridPos> {
        let map = session.map();
        let unexplored = map
            .spawn_points()
            .iter()
            .copied()
            .filter(|&p| map.tile(p).is_some_and(|t| !t.is_explored));
        nearest(from, visible.iter().map(|e| e.position))
            .or_else(|| nearest(from, self.last_seen.values().copied()))
            .or_else(|| nearest(from, unexplored))
    }
}

fn nearest(from: GridPos, cells: impl Iterator<Item = GridPos>) -> Option<GridPos> {
    cells.min_by_key(|cell| (from.manhattan_distance(*cell), *cell))
}

/// Squadmates and visible enemies, minus `exclude`.
fn known_occupants(session: &Session, exclude: UnitId) -> Occupants {
    let visible = session.visible_enemies();
    session
        .units()
        .iter()
        .filter(|u| u.is_alive && u.id != exclude)
        .filter(|u| u.team == Team::Player || visible.contains(&u.id))
        .map(|u| (u.position, u.posture))
        .collect()
}

/// First cell of a route to `goal` around known units. An occupied goal is
/// approached but never entered.
fn next_step(session: &Session, id: UnitId, goal: GridPos) -> Option<GridPos> {
    let start = session.unit(id)?.position;
    if start == goal {
        return None;
    }
    let mut obstacles: HashSet<GridPos> = known_occupants(session, id).into_keys().collect();
    let goal_occupied = obstacles.remove(&goal);
    let path = find_path(session.map(), start, goal, &obstacles);
    let next = *path.get(1)?;
    if goal_occupied && next == goal {
        return None;
    }
    Some(next)
}

/// Apply `intent`; true if it went through.
fn execute(session: &mut Session, id: UnitId, intent: Intent) -> Result<bool> {
    let command = match intent {
        Intent::Melee(target) => Command::Melee {
            attacker: id,
            target,
        },
        Intent::Shoot(target) => Command::Ranged {
            attacker: id,
            target,
        },
        Intent::Step(to) => {
            if session.apply(Command::RequestMove { unit: id, to })?.is_err() {
                return Ok(false);
            }
            Command::AdvanceMove(id)
        }
        Intent::Hold => return Ok(false),
    };
    let accepted = session.apply(command)?;
    if let Err(reason) = accepted {
        tracing::debug!(unit = %id, ?intent, %reason, "Auto player action refused");
    }
    Ok(accepted.is_ok())
}
