//! Batch match runner for balance testing.
//!
//! Runs many seeds in parallel using rayon and aggregates win rates, match
//! length and awards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use squad_core::prelude::*;
use tracing::{info, warn};

use crate::error::Result;
use crate::runner::{run_match, MatchResult, RunOptions};

/// Configuration for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Template configuration; the seed is replaced per match.
    pub game: GameConfig,
    /// Number of matches to play.
    pub game_count: u32,
    /// Seed of the first match; later matches count up from it.
    pub seed_start: u64,
    /// Turn limit per match.
    pub max_turns: u32,
    /// Maximum parallel matches (0 = use rayon default).
    pub parallel_games: u32,
    /// Output directory for results.
    pub output_dir: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            game_count: 100,
            seed_start: 0,
            max_turns: RunOptions::default().max_turns,
            parallel_games: 0,
            output_dir: PathBuf::from("results"),
        }
    }
}

impl BatchConfig {
    /// Create a batch of `game_count` matches of `game`.
    #[must_use]
    pub fn new(game: GameConfig, game_count: u32) -> Self {
        Self {
            game,
            game_count,
            ..Default::default()
        }
    }

    /// Set the first seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set the turn limit.
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Set output directory.
    #[must_use]
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }
}

/// Aggregate statistics over a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Matches that completed without error.
    pub total_games: u32,
    /// Player wins.
    pub victories: u32,
    /// Player losses.
    pub defeats: u32,
    /// Matches that hit the turn limit.
    pub timeouts: u32,
    /// Victories over completed matches.
    pub win_rate: f64,
    /// Mean turn counter at the end of a decided match.
    pub average_turns: f64,
    /// How often each award was handed out.
    pub award_counts: BTreeMap<String, u32>,
}

impl BatchSummary {
    /// Aggregate `games`.
    #[must_use]
    pub fn from_games(games: &[MatchResult]) -> Self {
        let mut summary = Self {
            total_games: games.len() as u32,
            ..Default::default()
        };
        let mut decided_turns = 0u32;
        for game in games {
            match game.outcome {
                Some(Outcome::Victory) => summary.victories += 1,
                Some(Outcome::Defeat) => summary.defeats += 1,
                None => summary.timeouts += 1,
            }
            if game.outcome.is_some() {
                decided_turns += game.turns;
            }
            for award in &game.report.awards {
                *summary
                    .award_counts
                    .entry(award.kind.title().to_string())
                    .or_insert(0) += 1;
            }
        }
        if summary.total_games > 0 {
            summary.win_rate = f64::from(summary.victories) / f64::from(summary.total_games);
        }
        let decided = summary.victories + summary.defeats;
        if decided > 0 {
            summary.average_turns = f64::from(decided_turns) / f64::from(decided);
        }
        summary
    }
}

/// Error during a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Match index.
    pub game_index: u32,
    /// Seed used.
    pub seed: u64,
    /// Error message.
    pub message: String,
}

/// Results from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used.
    pub config: BatchConfig,
    /// Individual match results, in seed order.
    pub games: Vec<MatchResult>,
    /// Aggregate summary.
    pub summary: BatchSummary,
    /// Total runtime.
    pub duration_seconds: f64,
    /// Errors encountered.
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load results from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Run a batch of matches.
#[must_use]
pub fn run_batch(config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    info!(
        games = config.game_count,
        seed_start = config.seed_start,
        "Starting batch run"
    );

    if config.parallel_games > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_games as usize)
            .build_global()
            .ok(); // Ignore if already set
    }

    let options = RunOptions {
        max_turns: config.max_turns,
        pace: false,
    };
    let results: Vec<std::result::Result<MatchResult, BatchError>> = (0..config.game_count)
        .into_par_iter()
        .map(|i| {
            let seed = config.seed_start.wrapping_add(u64::from(i));
            let game = config.game.clone().with_seed(seed);
            run_match(game, options.clone())
                .map(|(result, _)| result)
                .map_err(|e| {
                    warn!(game = i, seed, error = %e, "Match failed");
                    BatchError {
                        game_index: i,
                        seed,
                        message: e.to_string(),
                    }
                })
        })
        .collect();

    let (games, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.is_ok());
    let games: Vec<MatchResult> = games.into_iter().filter_map(|r| r.ok()).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(|r| r.err()).collect();

    let summary = BatchSummary::from_games(&games);
    let duration_seconds = start.elapsed().as_secs_f64();
    info!(
        games = games.len(),
        failed = errors.len(),
        win_rate = summary.win_rate,
        "Batch complete in {duration_seconds:.1}s"
    );

    BatchResults {
        config,
        games,
        summary,
        duration_seconds,
        errors,
    }
}

/// Play `seed` `runs` times and check every run ends identically.
///
/// # Errors
///
/// Returns the first error any run hits.
pub fn verify_determinism(game: &GameConfig, seed: u64, runs: u32) -> Result<bool> {
    let mut first: Option<MatchResult> = None;
    for _ in 0..runs {
        let (result, _) = run_match(game.clone().with_seed(seed), RunOptions::default())?;
        match &first {
            Some(expected) if *expected != result => {
                warn!(seed, "Runs diverged");
                return Ok(false);
            }
            Some(_) => {}
            None => first = Some(result),
        }
    }
    Ok(true)
}
