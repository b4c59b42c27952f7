//! Units and their primitive state mutators.
//!
//! A [`Unit`] is pure state plus single-step mutators. Rules that involve
//! other units or the map (line of sight, reaction fire, turn order) live in
//! [`crate::session`].

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::GridPos;

/// Metres credited to `distance_travelled` per tile moved.
pub const METRES_PER_STEP: u32 = 2;

/// Stable unit identifier: the unit's index in the session's unit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl UnitId {
    /// Index into the unit table.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Side a unit fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    /// Controlled by the player.
    Player,
    /// Controlled by the squad AI.
    Enemy,
}

impl Team {
    /// The opposing side.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Player => Self::Enemy,
            Self::Enemy => Self::Player,
        }
    }
}

/// Body posture. Prone units hide behind cover but cannot shoot over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Posture {
    /// Upright.
    #[default]
    Standing,
    /// Lying down.
    Prone,
}

impl Posture {
    /// The other posture.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Standing => Self::Prone,
            Self::Prone => Self::Standing,
        }
    }
}

/// Cumulative per-unit statistics for the end-of-match report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UnitStats {
    /// Attacks attempted (ranged, melee and reaction shots).
    pub shots_taken: u32,
    /// Attacks that passed their skill check.
    pub shots_hit: u32,
    /// Units this unit finished off.
    pub kills: u32,
    /// Heals given to allies.
    pub heals_given: u32,
    /// Metres moved.
    pub distance_travelled: u32,
}

impl UnitStats {
    /// Hit ratio in percent, `None` if the unit never fired.
    #[must_use]
    pub fn accuracy_percent(&self) -> Option<u32> {
        (self.shots_taken > 0).then(|| self.shots_hit * 100 / self.shots_taken)
    }
}

/// A single combatant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Identifier (index into the session's unit table).
    pub id: UnitId,
    /// Owning side.
    pub team: Team,
    /// Display name (player units only).
    pub name: Option<String>,
    /// Selection hotkey number (player units only).
    pub number: Option<u32>,
    /// Current cell.
    pub position: GridPos,
    /// Hit points.
    pub hp: u32,
    /// Hit point ceiling.
    pub max_hp: u32,
    /// Action points left this turn.
    pub ap: u32,
    /// Action point ceiling.
    pub max_ap: u32,
    /// False once hp reached zero. Never flips back.
    pub is_alive: bool,
    /// Standing or prone.
    pub posture: Posture,
    /// Waiting to fire at the next opposing unit that acts in view.
    pub is_on_overwatch: bool,
    /// Overwatch shot already spent this turn.
    pub has_fired_overwatch: bool,
    /// Currently selected by the player.
    pub is_selected: bool,
    /// Pending move steps (next step first).
    pub path: VecDeque<GridPos>,
    /// Match statistics.
    pub stats: UnitStats,
}

impl Unit {
    /// Create a unit at full health and AP.
    #[must_use]
    pub fn new(id: UnitId, team: Team, position: GridPos, max_hp: u32, max_ap: u32) -> Self {
        Self {
            id,
            team,
            name: None,
            number: None,
            position,
            hp: max_hp,
            max_hp,
            ap: max_ap,
            max_ap,
            is_alive: true,
            posture: Posture::Standing,
            is_on_overwatch: false,
            has_fired_overwatch: false,
            is_selected: false,
            path: VecDeque::new(),
            stats: UnitStats::default(),
        }
    }

    /// Builder method to set name and hotkey number.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>, number: u32) -> Self {
        self.name = Some(name.into());
        self.number = Some(number);
        self
    }

    /// Human readable label for logs and reports.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{:?} {}", self.team, self.id),
        }
    }

    /// True if the unit has at least `cost` AP.
    #[must_use]
    pub const fn can_afford(&self, cost: u32) -> bool {
        self.ap >= cost
    }

    /// Spend `cost` AP. Returns false (and spends nothing) if unaffordable.
    pub fn spend_ap(&mut self, cost: u32) -> bool {
        if self.ap < cost {
            return false;
        }
        self.ap -= cost;
        true
    }

    /// Refill AP at the start of the team's turn.
    pub fn refill_ap(&mut self) {
        self.ap = self.max_ap;
    }

    /// Drop any overwatch commitment.
    pub fn stand_down(&mut self) {
        self.is_on_overwatch = false;
        self.has_fired_overwatch = false;
    }

    /// Take the next queued step.
    ///
    /// Returns the new position, or `None` (clearing the path) if the path
    /// is empty or the step is unaffordable.
    pub fn move_one_step(&mut self, move_cost: u32) -> Option<GridPos> {
        if self.ap < move_cost {
            self.path.clear();
            return None;
        }
        let Some(next) = self.path.pop_front() else {
            return None;
        };
        self.stand_down();
        self.position = next;
        self.ap -= move_cost;
        self.stats.distance_travelled += METRES_PER_STEP;
        Some(next)
    }

    /// Subtract hit points, dying at zero.
    ///
    /// Returns true if this call killed the unit.
    pub fn take_damage(&mut self, amount: u32) -> bool {
        self.hp = self.hp.saturating_sub(amount);
        if self.hp == 0 && self.is_alive {
            self.die();
            return true;
        }
        false
    }

    /// Restore hit points up to the maximum.
    pub fn heal(&mut self, amount: u32) {
        self.hp = (self.hp + amount).min(self.max_hp);
    }

    /// Toggle posture, paying `cost` AP.
    ///
    /// Returns false and changes nothing if the unit cannot afford it.
    pub fn change_posture(&mut self, cost: u32) -> bool {
        if !self.spend_ap(cost) {
            return false;
        }
        self.posture = self.posture.toggled();
        true
    }

    fn die(&mut self) {
        self.is_alive = false;
        self.is_selected = false;
        self.is_on_overwatch = false;
        self.path.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Unit {
        Unit::new(UnitId(0), Team::Player, GridPos::new(1, 1), 100, 10)
    }

    #[test]
    fn test_new_unit_full_resources() {
        let u = unit();
        assert_eq!(u.hp, 100);
        assert_eq!(u.ap, 10);
        assert!(u.is_alive);
        assert_eq!(u.posture, Posture::Standing);
    }

    #[test]
    fn test_move_one_step_consumes_path_and_ap() {
        let mut u = unit();
        u.is_on_overwatch = true;
        u.path.extend([GridPos::new(2, 1), GridPos::new(3, 1)]);

        assert_eq!(u.move_one_step(1), Some(GridPos::new(2, 1)));
        assert_eq!(u.position, GridPos::new(2, 1));
        assert_eq!(u.ap, 9);
        assert_eq!(u.path.len(), 1);
        assert_eq!(u.stats.distance_travelled, METRES_PER_STEP);
        assert!(!u.is_on_overwatch);
    }

    #[test]
    fn test_move_without_ap_clears_path() {
        let mut u = unit();
        u.ap = 0;
        u.path.push_back(GridPos::new(2, 1));

        assert_eq!(u.move_one_step(1), None);
        assert!(u.path.is_empty());
        assert_eq!(u.position, GridPos::new(1, 1));
    }

    #[test]
    fn test_move_with_empty_path_is_noop() {
        let mut u = unit();
        assert_eq!(u.move_one_step(1), None);
        assert_eq!(u.ap, 10);
    }

    #[test]
    fn test_take_damage_kills_once() {
        let mut u = unit();
        u.is_selected = true;
        u.is_on_overwatch = true;

        assert!(!u.take_damage(60));
        assert_eq!(u.hp, 40);
        assert!(u.take_damage(60));
        assert_eq!(u.hp, 0);
        assert!(!u.is_alive);
        assert!(!u.is_selected);
        assert!(!u.is_on_overwatch);

        // Already dead: stays dead, reports no new kill.
        assert!(!u.take_damage(10));
        assert!(!u.is_alive);
        assert_eq!(u.hp, 0);
    }

    #[test]
    fn test_heal_clamps_at_max() {
        let mut u = unit();
        u.take_damage(20);
        u.heal(50);
        assert_eq!(u.hp, 100);
    }

    #[test]
    fn test_change_posture_requires_ap() {
        let mut u = unit();
        assert!(u.change_posture(2));
        assert_eq!(u.posture, Posture::Prone);
        assert_eq!(u.ap, 8);

        u.ap = 1;
        assert!(!u.change_posture(2));
        assert_eq!(u.posture, Posture::Prone);
        assert_eq!(u.ap, 1);
    }

    #[test]
    fn test_accuracy() {
        let mut stats = UnitStats::default();
        assert_eq!(stats.accuracy_percent(), None);
        stats.shots_taken = 4;
        stats.shots_hit = 3;
        assert_eq!(stats.accuracy_percent(), Some(75));
    }
}
