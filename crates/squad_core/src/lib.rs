//! # Squad Core
//!
//! Deterministic simulation core for a turn-based squad tactics game.
//!
//! This crate contains **only** game logic:
//! - No rendering
//! - No audio
//! - No input polling
//! - No system randomness (seeded ChaCha streams)
//! - No floating-point in line tracing (uses fixed-point)
//!
//! Presenters read state through queries and [`snapshot`]s, drain
//! [`events::SimEvent`]s, and drive the game with commands.
//!
//! ## Crate Structure
//!
//! - [`grid_map`] - Tiles, map generation, line of sight, field of view
//! - [`pathfinding`] - A* over the grid
//! - [`unit`] - Per-unit state and primitive mutators
//! - [`combat`] - Skill checks and damage
//! - [`session`] - Turn state machine and action resolution
//! - [`ai`] - Enemy squad behaviour
//! - [`replay`] - Command stream, record and playback

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ai;
pub mod combat;
pub mod config;
pub mod error;
pub mod events;
pub mod grid_map;
pub mod math;
pub mod pathfinding;
pub mod replay;
pub mod report;
pub mod session;
pub mod snapshot;
pub mod unit;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ai::AiTick;
    pub use crate::combat::{AttackKind, Dice, SeededDice, SkillRoll};
    pub use crate::config::{
        AiConfig, ApCosts, CombatConfig, GameConfig, MapConfig, PerTeam, SquadConfig, UnitConfig,
    };
    pub use crate::error::{ActionResult, GameError, Rejection, Result};
    pub use crate::events::{DisplayEffect, EffectKind, Outcome, SimEvent};
    pub use crate::grid_map::{GridMap, Occupants, Tile};
    pub use crate::math::{Fixed, GridPos};
    pub use crate::pathfinding::find_path;
    pub use crate::replay::{Command, Replay};
    pub use crate::report::{AwardKind, MatchReport};
    pub use crate::session::{Session, SquadLayout, TurnState};
    pub use crate::snapshot::{SessionSnapshot, UnitView};
    pub use crate::unit::{Posture, Team, Unit, UnitId};
}
