//! Command stream and replays.
//!
//! Every input a session accepts can be expressed as a [`Command`]. Sessions
//! record the commands they receive through [`Session::apply`]; together with
//! the configuration that is enough to rebuild the whole game, since map
//! generation, dice and AI all draw from seeded streams.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::GameConfig;
use crate::error::{ActionResult, GameError, Result};
use crate::math::GridPos;
use crate::session::Session;
use crate::unit::UnitId;

/// One input to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Leave the home screen.
    Start,
    /// Rebuild the world.
    Reset,
    /// Select a player unit.
    Select(UnitId),
    /// Select a player unit by hotkey number.
    SelectNumber(u32),
    /// Plan a path.
    RequestMove {
        /// Unit to move.
        unit: UnitId,
        /// Destination cell.
        to: GridPos,
    },
    /// Take one queued step.
    AdvanceMove(UnitId),
    /// Laser shot.
    Ranged {
        /// Shooter.
        attacker: UnitId,
        /// Target.
        target: UnitId,
    },
    /// Close combat.
    Melee {
        /// Striker.
        attacker: UnitId,
        /// Target.
        target: UnitId,
    },
    /// Heal a squadmate.
    Heal {
        /// Medic.
        healer: UnitId,
        /// Patient.
        target: UnitId,
    },
    /// Go on overwatch.
    Overwatch(UnitId),
    /// Stand up or go prone.
    TogglePosture(UnitId),
    /// Hand over to the enemy.
    EndPlayerTurn,
    /// One enemy action.
    AdvanceEnemyAi,
    /// One frame.
    Tick,
}

impl Session {
    /// Record and execute a command.
    ///
    /// The outer result carries fatal errors (only [`Command::Reset`] can
    /// fail that way); the inner one says whether the command was accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if a reset cannot regenerate the map.
    pub fn apply(&mut self, command: Command) -> Result<ActionResult> {
        self.commands.push(command);
        let outcome = match command {
            Command::Start => self.start(),
            Command::Reset => {
                self.reset()?;
                Ok(())
            }
            Command::Select(unit) => self.select_unit(unit),
            Command::SelectNumber(number) => self.select_number(number),
            Command::RequestMove { unit, to } => self.request_move(unit, to),
            Command::AdvanceMove(unit) => self.advance_move(unit),
            Command::Ranged { attacker, target } => self.ranged_attack(attacker, target),
            Command::Melee { attacker, target } => self.melee_attack(attacker, target),
            Command::Heal { healer, target } => self.heal(healer, target),
            Command::Overwatch(unit) => self.set_overwatch(unit),
            Command::TogglePosture(unit) => self.toggle_posture(unit),
            Command::EndPlayerTurn => self.end_player_turn(),
            Command::AdvanceEnemyAi => self.advance_enemy_ai().map(|_| ()),
            Command::Tick => {
                self.tick();
                Ok(())
            }
        };
        Ok(outcome)
    }

    /// Package the recorded commands as a replay.
    #[must_use]
    pub fn to_replay(&self) -> Replay {
        Replay {
            version: REPLAY_VERSION,
            config: self.config().clone(),
            commands: self.commands().to_vec(),
            final_turn: self.turn_number(),
            final_hash: self.state_hash(),
        }
    }
}

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// A recorded game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Configuration the game was created with, seed included.
    pub config: GameConfig,
    /// Every command applied, in order.
    pub commands: Vec<Command>,
    /// Turn counter when recording stopped.
    pub final_turn: u32,
    /// State hash when recording stopped.
    pub final_hash: u64,
}

impl Replay {
    /// Save the replay to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| GameError::Serialization(format!("Failed to serialize replay: {e}")))?;
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded, or was
    /// written by an incompatible version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let replay: Self = bincode::deserialize(&bytes)
            .map_err(|e| GameError::Serialization(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::InvalidState(format!(
                "Replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }
        Ok(replay)
    }

    /// Re-simulate the replay from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be created or a reset fails.
    pub fn play(&self) -> Result<Session> {
        let mut session = Session::new(self.config.clone())?;
        for &command in &self.commands {
            // Rejections replay as rejections.
            let _ = session.apply(command)?;
        }
        Ok(session)
    }

    /// Re-simulate and compare against the recorded final hash.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] on a hash mismatch.
    pub fn verify(&self) -> Result<Session> {
        let session = self.play()?;
        let hash = session.state_hash();
        if hash != self.final_hash {
            return Err(GameError::InvalidState(format!(
                "Replay desync: expected hash {:#018x}, got {hash:#018x}",
                self.final_hash
            )));
        }
        tracing::debug!(commands = self.commands.len(), hash, "Replay verified");
        Ok(session)
    }
}
