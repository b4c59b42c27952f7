//! Enemy squad AI.
//!
//! Each call to [`Session::advance_enemy_ai`] lets exactly one enemy unit act,
//! so presenters can animate the enemy turn frame by frame. Squads are
//! visited in order; within a squad the first living unit that can do
//! something does it:
//!
//! 1. melee the squad target if adjacent,
//! 2. otherwise shoot it,
//! 3. otherwise take one step towards the squad destination.
//!
//! When no unit in any squad can act the enemy turn ends.

use std::collections::VecDeque;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{ActionResult, Rejection};
use crate::math::GridPos;
use crate::pathfinding::find_path;
use crate::session::{Session, TurnState};
use crate::unit::{Team, UnitId};

/// What one AI invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiTick {
    /// This unit took an action.
    Acted(UnitId),
    /// Nobody could act; the player turn has begun.
    TurnEnded,
}

/// True if the action went through, or was cut short by overwatch fire.
fn consumed(result: ActionResult) -> bool {
    matches!(result, Ok(()) | Err(Rejection::KilledByReaction(_)))
}

impl Session {
    /// Let one enemy unit act, or end the enemy turn if none can.
    ///
    /// # Errors
    ///
    /// Rejected outside [`TurnState::EnemyTurn`].
    pub fn advance_enemy_ai(&mut self) -> Result<AiTick, Rejection> {
        if self.state() != TurnState::EnemyTurn {
            return self.reject(Rejection::WrongPhase(self.state().name()));
        }
        for squad in 0..self.ai_states.len() {
            let destination = self.update_squad_intel(squad);
            if let Some(actor) = self.act_with_squad(squad, destination) {
                return Ok(AiTick::Acted(actor));
            }
        }
        tracing::debug!(turn = self.turn_number(), "No enemy can act");
        self.end_enemy_turn();
        Ok(AiTick::TurnEnded)
    }

    /// Run AI ticks until the enemy turn is over.
    ///
    /// Returns the number of actions taken. Every action spends AP or costs
    /// the actor its life, so this always terminates.
    ///
    /// # Errors
    ///
    /// Rejected outside [`TurnState::EnemyTurn`].
    pub fn run_enemy_turn(&mut self) -> Result<u32, Rejection> {
        let mut actions = 0;
        loop {
            match self.advance_enemy_ai()? {
                AiTick::Acted(_) if self.state() == TurnState::EnemyTurn => actions += 1,
                AiTick::Acted(_) => return Ok(actions + 1),
                AiTick::TurnEnded => return Ok(actions),
            }
        }
    }

    /// Refresh a squad's target and memory; returns where it should head.
    fn update_squad_intel(&mut self, squad: usize) -> Option<GridPos> {
        let members = &self.squads[squad + 1].members;
        let living: Vec<GridPos> = members
            .iter()
            .map(|id| &self.units[id.index()])
            .filter(|u| u.is_alive)
            .map(|u| u.position)
            .collect();
        if living.is_empty() {
            return None;
        }

        let viewers = members.iter().map(|id| &self.units[id.index()]);
        let visible = self.map.visible_cells(viewers, self.config.units.vision_radius);
        let target = self
            .living(Team::Player)
            .filter(|p| visible.contains(&p.position))
            .min_by_key(|p| p.hp)
            .map(|p| (p.id, p.position));

        let ai = &mut self.ai_states[squad];
        if let Some((id, position)) = target {
            if ai.target != Some(id) {
                tracing::debug!(squad, target = %id, "Squad acquired target");
            }
            ai.target = Some(id);
            ai.last_known = Some(position);
            ai.search_point = None;
            return Some(position);
        }
        ai.target = None;

        if let Some(last) = ai.last_known {
            if living.iter().any(|&p| p == last || p.is_adjacent(last)) {
                tracing::debug!(squad, %last, "Last known position checked, nothing there");
                ai.last_known = None;
            } else {
                return Some(last);
            }
        }

        let arrival = self.config.ai.search_arrival_radius;
        let arrived = ai
            .search_point
            .map_or(true, |point| living.iter().all(|p| p.closer_than(point, arrival)));
        if arrived {
            let candidates: Vec<GridPos> = self
                .map
                .spawn_points()
                .iter()
                .copied()
                .filter(|&p| !self.map.is_cover(p))
                .collect();
            ai.search_point = candidates.choose(&mut self.rng).copied();
            tracing::debug!(squad, point = ?ai.search_point, "New search point");
        }
        ai.search_point
    }

    fn act_with_squad(&mut self, squad: usize, destination: Option<GridPos>) -> Option<UnitId> {
        let target = self.ai_states[squad].target;
        let members = self.squads[squad + 1].members.clone();
        members.into_iter().find(|&id| {
            let unit = &self.units[id.index()];
            unit.is_alive && unit.ap > 0 && self.try_unit_action(id, target, destination)
        })
    }

    fn try_unit_action(
        &mut self,
        id: UnitId,
        target: Option<UnitId>,
        destination: Option<GridPos>,
    ) -> bool {
        let costs = &self.config.costs;
        let (melee, shoot, movement) = (costs.melee, costs.shoot, costs.movement);
        let unit = &self.units[id.index()];
        let (position, ap) = (unit.position, unit.ap);

        if let Some(target) = target {
            let target_pos = self.units[target.index()].position;
            if position.is_adjacent(target_pos)
                && ap >= melee
                && consumed(self.melee_attack(id, target))
            {
                tracing::debug!(unit = %id, target = %target, "AI melee");
                return true;
            }
            if ap >= shoot && consumed(self.ranged_attack(id, target)) {
                tracing::debug!(unit = %id, target = %target, "AI shot");
                return true;
            }
        }

        match destination {
            Some(destination) if ap >= movement => self.step_toward(id, destination),
            _ => false,
        }
    }

    /// One step along a fresh path to `destination`. Other living units are
    /// obstacles; an occupied destination is approached but never entered.
    fn step_toward(&mut self, id: UnitId, destination: GridPos) -> bool {
        let start = self.units[id.index()].position;
        if start == destination {
            return false;
        }
        let mut obstacles = self.occupied_cells(id);
        let destination_occupied = obstacles.remove(&destination);
        let path = find_path(&self.map, start, destination, &obstacles);
        let Some(&next) = path.get(1) else {
            return false;
        };
        if destination_occupied && next == destination {
            return false;
        }

        self.units[id.index()].path = VecDeque::from([next]);
        let result = self.step_along_path(id);
        if result.is_err() {
            self.units[id.index()].path.clear();
        }
        consumed(result)
    }
}
