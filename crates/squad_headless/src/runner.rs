//! Single-match runner.
//!
//! Plays one generated match with the [`AutoPlayer`] on the player side
//! and the built-in squad AI on the other, until one side is wiped out or
//! the turn limit is reached.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use squad_core::prelude::*;

use crate::error::{Result, RunnerError};
use crate::strategies::AutoPlayer;

/// Default turn limit for a match.
pub const DEFAULT_MAX_TURNS: u32 = 60;

/// Runner options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    /// Abandon the match after this many turns.
    pub max_turns: u32,
    /// Sleep `ai.tick_delay_ms` between enemy actions, for watching live.
    pub pace: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            pace: false,
        }
    }
}

/// Outcome and statistics of one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Seed the match was generated from.
    pub seed: u64,
    /// Winner, or `None` if the turn limit was hit.
    pub outcome: Option<Outcome>,
    /// Turn counter when the match stopped.
    pub turns: u32,
    /// Player actions accepted.
    pub player_actions: u32,
    /// Enemy AI invocations.
    pub ai_ticks: u32,
    /// Commands recorded, for replay size.
    pub commands: usize,
    /// Final state hash.
    pub final_hash: u64,
    /// Awards and survivors.
    pub report: MatchReport,
}

impl MatchResult {
    /// True if the player squad won.
    #[must_use]
    pub fn is_victory(&self) -> bool {
        self.outcome == Some(Outcome::Victory)
    }
}

/// Drives one session to completion.
#[derive(Debug)]
pub struct MatchRunner {
    session: Session,
    player: AutoPlayer,
    options: RunOptions,
    player_actions: u32,
    ai_ticks: u32,
}

impl MatchRunner {
    /// Generate the world for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the map cannot be
    /// generated.
    pub fn new(config: GameConfig, options: RunOptions) -> Result<Self> {
        let session = Session::new(config)?;
        Ok(Self {
            session,
            player: AutoPlayer::new(),
            options,
            player_actions: 0,
            ai_ticks: 0,
        })
    }

    /// The session being played.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Give up the runner, keeping the session.
    #[must_use]
    pub fn into_session(self) -> Session {
        self.session
    }

    /// True once the match is decided or the turn limit is reached.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.session.state() == TurnState::GameOver
            || self.session.turn_number() > self.options.max_turns
    }

    /// Play one full round: the player turn, then the enemy turn.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Stalled`] if the session refuses a phase change.
    pub fn play_round(&mut self) -> Result<()> {
        if self.session.state() == TurnState::HomeScreen {
            self.session
                .apply(Command::Start)?
                .map_err(|reason| self.stalled(reason))?;
        }
        if self.session.state() == TurnState::PlayerTurn {
            self.player_actions += self.player.play_turn(&mut self.session)?;
        }
        let delay = Duration::from_millis(self.session.config().ai.tick_delay_ms);
        while self.session.state() == TurnState::EnemyTurn {
            self.session
                .apply(Command::AdvanceEnemyAi)?
                .map_err(|reason| self.stalled(reason))?;
            self.ai_ticks += 1;
            if self.options.pace {
                std::thread::sleep(delay);
            }
        }
        Ok(())
    }

    /// Play until the match is finished.
    ///
    /// # Errors
    ///
    /// See [`MatchRunner::play_round`].
    pub fn run(&mut self) -> Result<MatchResult> {
        while !self.is_finished() {
            self.play_round()?;
        }
        let result = self.result();
        tracing::info!(
            seed = result.seed,
            outcome = ?result.outcome,
            turns = result.turns,
            "Match finished"
        );
        Ok(result)
    }

    /// Summarise the match so far.
    #[must_use]
    pub fn result(&self) -> MatchResult {
        MatchResult {
            seed: self.session.config().seed,
            outcome: self.session.outcome(),
            turns: self.session.turn_number(),
            player_actions: self.player_actions,
            ai_ticks: self.ai_ticks,
            commands: self.session.commands().len(),
            final_hash: self.session.state_hash(),
            report: MatchReport::from_session(&self.session),
        }
    }

    fn stalled(&self, reason: Rejection) -> RunnerError {
        RunnerError::Stalled {
            turn: self.session.turn_number(),
            reason: reason.to_string(),
        }
    }
}

/// Play one match with `config` and return its result and session.
///
/// # Errors
///
/// See [`MatchRunner::new`] and [`MatchRunner::run`].
pub fn run_match(config: GameConfig, options: RunOptions) -> Result<(MatchResult, Session)> {
    let mut runner = MatchRunner::new(config, options)?;
    let result = runner.run()?;
    Ok((result, runner.into_session()))
}
