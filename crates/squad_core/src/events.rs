//! Domain events and timed display effects.
//!
//! The core never plays sounds or draws. It records what happened as
//! [`SimEvent`]s for presenters to drain, and keeps short-lived
//! [`DisplayEffect`]s that decay one step per tick.

use serde::{Deserialize, Serialize};

use crate::combat::{AttackKind, SkillRoll};
use crate::math::GridPos;
use crate::unit::{Posture, Team, UnitId};

/// Ticks a laser trace stays on screen.
pub const LASER_EFFECT_TICKS: u32 = 30;

/// Ticks a skill-check message stays on screen.
pub const SKILL_MESSAGE_TICKS: u32 = 60;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Every enemy is dead.
    Victory,
    /// Every player unit is dead.
    Defeat,
}

/// Something that happened in the simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimEvent {
    /// A side's turn began.
    TurnStarted {
        /// Turn counter (starts at 1).
        turn: u32,
        /// Side now acting.
        side: Team,
    },
    /// A ranged or melee attack was rolled.
    AttackResolved {
        /// Shooter or striker.
        attacker: UnitId,
        /// Unit attacked.
        target: UnitId,
        /// Ranged or melee.
        kind: AttackKind,
        /// The skill check.
        roll: SkillRoll,
        /// Damage applied (0 on a miss).
        damage: u32,
        /// True for a free overwatch shot.
        reaction: bool,
    },
    /// A unit stepped to an adjacent cell.
    UnitMoved {
        /// Unit that moved.
        unit: UnitId,
        /// Cell left.
        from: GridPos,
        /// Cell entered.
        to: GridPos,
    },
    /// A move was cut short because a new enemy came into view.
    MoveInterrupted {
        /// Unit whose path was cleared.
        unit: UnitId,
    },
    /// A unit's hit points reached zero.
    UnitDied {
        /// The casualty.
        unit: UnitId,
        /// Unit credited with the kill.
        killer: UnitId,
    },
    /// A unit patched up a squadmate.
    Healed {
        /// Medic.
        healer: UnitId,
        /// Patient.
        target: UnitId,
        /// Hit points actually restored.
        amount: u32,
    },
    /// A unit went on overwatch.
    OverwatchSet {
        /// Unit now watching.
        unit: UnitId,
    },
    /// A unit stood up or went prone.
    PostureChanged {
        /// Unit that changed.
        unit: UnitId,
        /// New posture.
        posture: Posture,
    },
    /// The session ended.
    GameOver {
        /// Result.
        outcome: Outcome,
    },
}

/// What a display effect shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    /// Laser beam between two cells.
    Laser {
        /// Shooter cell.
        from: GridPos,
        /// Target cell.
        to: GridPos,
    },
    /// Floating skill-check result over a cell.
    SkillCheck {
        /// Cell the message floats over.
        at: GridPos,
        /// Whether the roll succeeded.
        success: bool,
    },
}

impl EffectKind {
    /// Anchor cell of the effect.
    #[must_use]
    pub const fn position(&self) -> GridPos {
        match *self {
            Self::Laser { to, .. } => to,
            Self::SkillCheck { at, .. } => at,
        }
    }

    /// Text shown for message effects.
    #[must_use]
    pub const fn label(&self) -> Option<&'static str> {
        match *self {
            Self::Laser { .. } => None,
            Self::SkillCheck { success: true, .. } => Some("Success!"),
            Self::SkillCheck { success: false, .. } => Some("Miss!"),
        }
    }
}

/// A timed visual cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayEffect {
    /// What to show.
    pub kind: EffectKind,
    /// Ticks left before it disappears.
    pub remaining_ticks: u32,
}

impl DisplayEffect {
    /// Laser beam from `from` to `to`.
    #[must_use]
    pub const fn laser(from: GridPos, to: GridPos) -> Self {
        Self {
            kind: EffectKind::Laser { from, to },
            remaining_ticks: LASER_EFFECT_TICKS,
        }
    }

    /// Skill-check message over `at`.
    #[must_use]
    pub const fn skill_check(at: GridPos, success: bool) -> Self {
        Self {
            kind: EffectKind::SkillCheck { at, success },
            remaining_ticks: SKILL_MESSAGE_TICKS,
        }
    }
}

/// Age every effect by one tick, dropping the expired ones.
pub fn decay_effects(effects: &mut Vec<DisplayEffect>) {
    effects.retain_mut(|effect| {
        effect.remaining_ticks = effect.remaining_ticks.saturating_sub(1);
        effect.remaining_ticks > 0
    });
}
