//! Attack resolution: the d20 skill check and per-team damage lookup.
//!
//! The dice are behind the [`Dice`] trait so a session can run on a seeded
//! stream in play and on scripted rolls in tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::CombatConfig;
use crate::unit::{Posture, Team};

/// Sides on the skill-check die.
pub const SKILL_DIE: u32 = 20;

/// Salt mixed into the session seed so the dice stream differs from the
/// map-generation stream.
const DICE_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

/// Source of die rolls.
pub trait Dice: std::fmt::Debug + Send {
    /// Roll one die with `sides` faces, returning `1..=sides`.
    fn roll(&mut self, sides: u32) -> u32;
}

/// Deterministic dice driven by a ChaCha stream.
#[derive(Debug, Clone)]
pub struct SeededDice {
    rng: ChaCha8Rng,
}

impl SeededDice {
    /// Dice for a session seeded with `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed ^ DICE_SEED_SALT),
        }
    }
}

impl Dice for SeededDice {
    fn roll(&mut self, sides: u32) -> u32 {
        self.rng.gen_range(1..=sides.max(1))
    }
}

/// Kind of attack being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackKind {
    /// Laser shot. Needs line of sight.
    Ranged,
    /// Close combat. Needs adjacency.
    Melee,
}

impl AttackKind {
    /// Skill bonus for an attacker of `team`.
    #[must_use]
    pub const fn skill_bonus(self, team: Team, combat: &CombatConfig) -> u32 {
        match self {
            Self::Ranged => combat.ranged_skill.get(team),
            Self::Melee => combat.melee_skill.get(team),
        }
    }

    /// Damage dealt on a hit by an attacker of `team`.
    #[must_use]
    pub const fn damage(self, team: Team, combat: &CombatConfig) -> u32 {
        match self {
            Self::Ranged => combat.ranged_damage.get(team),
            Self::Melee => combat.melee_damage.get(team),
        }
    }
}

/// Outcome of one skill check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillRoll {
    /// The raw die roll.
    pub roll: u32,
    /// Roll plus the attacker's bonus.
    pub total: u32,
    /// Target number the total had to meet.
    pub difficulty: u32,
    /// `total >= difficulty`.
    pub success: bool,
}

/// Difficulty of hitting a target in `posture`.
#[must_use]
pub const fn difficulty(combat: &CombatConfig, target_posture: Posture) -> u32 {
    match target_posture {
        Posture::Prone => combat.base_difficulty + combat.prone_difficulty_bonus,
        Posture::Standing => combat.base_difficulty,
    }
}

/// Roll a d20, add `bonus`, compare against `difficulty`.
pub fn skill_check(dice: &mut dyn Dice, bonus: u32, difficulty: u32) -> SkillRoll {
    let roll = dice.roll(SKILL_DIE);
    let total = roll + bonus;
    SkillRoll {
        roll,
        total,
        difficulty,
        success: total >= difficulty,
    }
}

/// Dice that always land on the same face, for unit tests in this crate.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct Loaded(pub u32);

#[cfg(test)]
impl Dice for Loaded {
    fn roll(&mut self, sides: u32) -> u32 {
        self.0.min(sides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_check_boundary_is_inclusive() {
        // 7 + 5 == 12: exactly meeting the difficulty hits.
        let hit = skill_check(&mut Loaded(7), 5, 12);
        assert!(hit.success);
        assert_eq!(hit.total, 12);

        let miss = skill_check(&mut Loaded(6), 5, 12);
        assert!(!miss.success);
    }

    #[test]
    fn test_prone_raises_difficulty() {
        let combat = CombatConfig::default();
        assert_eq!(difficulty(&combat, Posture::Standing), 12);
        assert_eq!(difficulty(&combat, Posture::Prone), 16);
    }

    #[test]
    fn test_per_team_lookup() {
        let combat = CombatConfig::default();
        assert_eq!(AttackKind::Ranged.damage(Team::Player, &combat), 35);
        assert_eq!(AttackKind::Ranged.damage(Team::Enemy, &combat), 25);
        assert_eq!(AttackKind::Melee.skill_bonus(Team::Player, &combat), 6);
        assert_eq!(AttackKind::Ranged.skill_bonus(Team::Enemy, &combat), 3);
    }

    #[test]
    fn test_seeded_dice_range_and_determinism() {
        let mut a = SeededDice::new(99);
        let mut b = SeededDice::new(99);
        for _ in 0..200 {
            let roll = a.roll(SKILL_DIE);
            assert!((1..=SKILL_DIE).contains(&roll));
            assert_eq!(roll, b.roll(SKILL_DIE));
        }
    }
}
