//! Error types for the headless runner.

use squad_core::error::GameError;
use thiserror::Error;

/// Failures while running, batching or verifying matches.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The simulation refused the configuration or a replay.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Reading or writing result files failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session left the expected phase mid-turn.
    #[error("Match stalled on turn {turn}: {reason}")]
    Stalled {
        /// Turn the runner gave up on.
        turn: u32,
        /// What went wrong.
        reason: String,
    },
}

/// Result alias for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
