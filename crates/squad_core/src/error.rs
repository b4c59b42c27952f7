//! Error types for the tactics simulation.
//!
//! Two families live here:
//! - [`GameError`] for failures outside turn play (configuration, map
//!   generation, replay files).
//! - [`Rejection`] for commands the engine refuses. A rejected command is a
//!   no-op: state is left exactly as it was.

use thiserror::Error;

use crate::math::GridPos;
use crate::unit::UnitId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all non-gameplay failures.
#[derive(Debug, Error)]
pub enum GameError {
    /// Configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Map generation could not produce enough spawn points within its attempt bound.
    #[error(
        "Map generation failed after {attempts} attempts: need {required} spawn points, found {found}"
    )]
    MapGeneration {
        /// Number of generation attempts made.
        attempts: u32,
        /// Spawn points required for the configured squads.
        required: usize,
        /// Spawn points produced by the best attempt.
        found: usize,
    },

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}

/// Reason a command was refused.
///
/// Every variant except [`Rejection::KilledByReaction`] means "nothing
/// happened". That one reports an action aborted after the reaction shot
/// resolved; the shot itself stands. The engine logs rejections at `debug`
/// level and hands them back so callers can surface them if they want.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The command is not valid in the current turn state.
    #[error("command not allowed during {0}")]
    WrongPhase(&'static str),

    /// The unit id does not resolve to a unit.
    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),

    /// The acting unit is dead or belongs to the side not currently acting.
    #[error("unit {0} cannot act now")]
    UnitUnavailable(UnitId),

    /// The target is dead, on the wrong side, or otherwise not a legal target.
    #[error("unit {0} is not a valid target")]
    InvalidTarget(UnitId),

    /// Not enough action points.
    #[error("needs {needed} AP, has {available}")]
    InsufficientAp {
        /// AP the action costs.
        needed: u32,
        /// AP the unit has left.
        available: u32,
    },

    /// The line of fire is obstructed.
    #[error("no line of sight to {0}")]
    NoLineOfSight(GridPos),

    /// The target tile is not visible to the acting squad.
    #[error("target at {0} is not visible")]
    TargetNotVisible(GridPos),

    /// Target is not on one of the eight surrounding cells.
    #[error("target at {0} is out of reach")]
    OutOfReach(GridPos),

    /// Target is already at full health.
    #[error("unit {0} is already at full health")]
    FullHealth(UnitId),

    /// The unit is already on overwatch.
    #[error("unit {0} is already on overwatch")]
    AlreadyOnOverwatch(UnitId),

    /// Destination is out of bounds or a wall.
    #[error("cannot move to {0}")]
    InvalidDestination(GridPos),

    /// No walkable route, or the destination is occupied.
    #[error("no route to {0}")]
    Unreachable(GridPos),

    /// The unit has no queued path.
    #[error("unit {0} has no path")]
    NoPath(UnitId),

    /// The next step is occupied by another living unit.
    #[error("step into {0} is blocked")]
    StepBlocked(GridPos),

    /// Reaction fire killed the acting unit before its action resolved.
    #[error("unit {0} was killed by reaction fire")]
    KilledByReaction(UnitId),
}

/// Outcome of a command: `Ok(())` when it took effect.
pub type ActionResult = std::result::Result<(), Rejection>;
