//! Headless squad tactics runner.
//!
//! Runs matches without a presentation layer, for playtesting, balance
//! batches and replay verification.
//!
//! # Usage
//!
//! ```bash
//! # Play one match and print the final map
//! cargo run -p squad_headless -- run --seed 7 --reveal
//!
//! # Run batch balance test
//! cargo run -p squad_headless -- batch --count 1000 --output results/
//!
//! # Check a configuration file
//! cargo run -p squad_headless -- validate --config my_config.ron
//! ```
//!
//! Logs go to stderr; results go to stdout.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use squad_core::prelude::*;
use squad_headless::{
    ascii::{render_ascii, AsciiConfig},
    batch::{run_batch, verify_determinism, BatchConfig},
    runner::{MatchRunner, RunOptions, DEFAULT_MAX_TURNS},
};

#[derive(Parser)]
#[command(name = "squad_headless")]
#[command(about = "Headless squad tactics runner for playtesting and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a single match with the auto player
    Run {
        /// RON configuration file (defaults are used otherwise)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Random seed, overriding the configuration
        #[arg(long)]
        seed: Option<u64>,

        /// Abandon the match after this many turns
        #[arg(long, default_value_t = DEFAULT_MAX_TURNS)]
        max_turns: u32,

        /// Print the result as JSON instead of an ASCII map
        #[arg(long)]
        json: bool,

        /// Draw the whole map, ignoring the fog of war
        #[arg(long)]
        reveal: bool,

        /// Print the map after every round
        #[arg(long)]
        watch: bool,

        /// Save the match as a replay
        #[arg(long)]
        replay_out: Option<PathBuf>,
    },

    /// Run a batch of matches for balance testing
    Batch {
        /// RON configuration file (defaults are used otherwise)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of matches to run
        #[arg(short = 'n', long, default_value = "100")]
        count: u32,

        /// Starting random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Maximum parallel matches (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Abandon each match after this many turns
        #[arg(long, default_value_t = DEFAULT_MAX_TURNS)]
        max_turns: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },

    /// Verify determinism by playing the same seed multiple times
    Verify {
        /// RON configuration file (defaults are used otherwise)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },

    /// Replay a recorded match
    Replay {
        /// Replay file path
        #[arg(short, long)]
        file: PathBuf,

        /// Fail unless the replay reproduces the recorded hash
        #[arg(long)]
        verify: bool,
    },

    /// Load and validate a configuration file
    Validate {
        /// RON configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for results)
    let fallback = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            config,
            seed,
            max_turns,
            json,
            reveal,
            watch,
            replay_out,
        } => {
            let view = ViewOptions {
                json,
                reveal,
                watch,
            };
            cmd_run(config, seed, max_turns, view, replay_out);
        }
        Commands::Batch {
            config,
            count,
            seed,
            parallel,
            max_turns,
            output,
        } => {
            cmd_batch(config, count, seed, parallel, max_turns, output);
        }
        Commands::Verify { config, seed, runs } => {
            cmd_verify(config, seed, runs);
        }
        Commands::Replay { file, verify } => {
            cmd_replay(file, verify);
        }
        Commands::Validate { config } => {
            cmd_validate(config);
        }
    }
}

/// How `run` presents the match.
struct ViewOptions {
    json: bool,
    reveal: bool,
    watch: bool,
}

/// Load the configuration file, or the defaults.
fn load_config(path: Option<PathBuf>) -> GameConfig {
    let Some(path) = path else {
        return GameConfig::default();
    };
    match GameConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config '{}': {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

/// Play a single match
fn cmd_run(
    config: Option<PathBuf>,
    seed: Option<u64>,
    max_turns: u32,
    view: ViewOptions,
    replay_out: Option<PathBuf>,
) {
    let mut game = load_config(config);
    if let Some(seed) = seed {
        game = game.with_seed(seed);
    }
    tracing::info!(seed = game.seed, max_turns, "Starting match");

    let options = RunOptions {
        max_turns,
        pace: view.watch,
    };
    let mut runner = match MatchRunner::new(game, options) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to create match: {}", e);
            std::process::exit(1);
        }
    };
    let ascii = AsciiConfig {
        reveal: view.reveal,
        use_color: true,
        ..Default::default()
    };

    while !runner.is_finished() {
        if let Err(e) = runner.play_round() {
            eprintln!("Match failed: {}", e);
            std::process::exit(1);
        }
        if view.watch && !view.json {
            println!("{}", render_ascii(&runner.session().snapshot(), &ascii));
        }
    }
    let result = runner.result();

    if let Some(path) = replay_out {
        if let Err(e) = runner.session().to_replay().save(&path) {
            eprintln!("Failed to save replay: {}", e);
            std::process::exit(1);
        }
        eprintln!("Replay saved to: {}", path.display());
    }

    if view.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to encode result: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if !view.watch {
        println!("{}", render_ascii(&runner.session().snapshot(), &ascii));
    }
    match result.outcome {
        Some(outcome) => eprintln!("{:?} on turn {}", outcome, result.turns),
        None => eprintln!("No result after {} turns", max_turns),
    }
    for award in &result.report.awards {
        eprintln!(
            "  {}: {} ({})",
            award.kind.title(),
            award.label,
            award.kind.describe(award.value)
        );
    }
    eprintln!("Final state hash: {:016x}", result.final_hash);
}

/// Run batch of matches for balance testing
fn cmd_batch(
    config: Option<PathBuf>,
    count: u32,
    seed: u64,
    parallel: u32,
    max_turns: u32,
    output: PathBuf,
) {
    let game = load_config(config);

    // Ensure output directory exists
    if let Err(e) = std::fs::create_dir_all(&output) {
        tracing::error!(error = %e, path = %output.display(), "Failed to create output directory");
        eprintln!(
            "FATAL: Cannot create output directory '{}': {}",
            output.display(),
            e
        );
        std::process::exit(1);
    }

    let batch = BatchConfig {
        parallel_games: parallel,
        ..BatchConfig::new(game, count)
            .with_seed(seed)
            .with_max_turns(max_turns)
            .with_output(output.clone())
    };
    let results = run_batch(batch);

    let results_path = output.join("batch_results.json");
    if let Err(e) = results.save(&results_path) {
        tracing::error!(error = %e, path = %results_path.display(), "Failed to save results");
        eprintln!("FATAL: Failed to save results: {}", e);
        std::process::exit(1);
    }

    let summary = &results.summary;
    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Matches played: {}", summary.total_games);
    if !results.errors.is_empty() {
        eprintln!("Matches FAILED: {}", results.errors.len());
    }
    eprintln!("Duration: {:.1}s", results.duration_seconds);
    eprintln!(
        "Victories: {}  Defeats: {}  Timeouts: {}",
        summary.victories, summary.defeats, summary.timeouts
    );
    eprintln!("Win rate: {:.1}%", summary.win_rate * 100.0);
    eprintln!("Average turns: {:.1}", summary.average_turns);
    if !summary.award_counts.is_empty() {
        eprintln!("\nAwards:");
        for (award, count) in &summary.award_counts {
            eprintln!("  {}: {}", award, count);
        }
    }

    if !results.errors.is_empty() {
        eprintln!("\nMATCH FAILURES:");
        for error in results.errors.iter().take(10) {
            eprintln!(
                "  Match {} (seed {}): {}",
                error.game_index, error.seed, error.message
            );
        }
        if results.errors.len() > 10 {
            eprintln!("  ... and {} more failures", results.errors.len() - 10);
        }
    }

    eprintln!("\nResults saved to: {}", results_path.display());
}

/// Verify determinism
fn cmd_verify(config: Option<PathBuf>, seed: u64, runs: u32) {
    tracing::info!("Verifying determinism: seed {} ({} runs)", seed, runs);

    match verify_determinism(&load_config(config), seed, runs) {
        Ok(true) => eprintln!("PASS: All {} runs produced identical results", runs),
        Ok(false) => {
            eprintln!("FAIL: Non-determinism detected!");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("FAIL: Error during verification: {}", e);
            std::process::exit(1);
        }
    }
}

/// Replay a recorded match
fn cmd_replay(file: PathBuf, verify: bool) {
    let replay = match Replay::load(&file) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to load replay: {}", e);
            std::process::exit(1);
        }
    };

    eprintln!("Loaded replay:");
    eprintln!("  Seed: {}", replay.config.seed);
    eprintln!("  Commands: {}", replay.commands.len());
    eprintln!("  Turns: {}", replay.final_turn);

    let session = if verify {
        eprintln!("Verifying replay...");
        match replay.verify() {
            Ok(session) => {
                eprintln!("PASS: Replay verification successful");
                session
            }
            Err(e) => {
                eprintln!("FAIL: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        match replay.play() {
            Ok(session) => session,
            Err(e) => {
                eprintln!("Failed to play replay: {}", e);
                std::process::exit(1);
            }
        }
    };

    let ascii = AsciiConfig {
        reveal: true,
        use_color: true,
        ..Default::default()
    };
    println!("{}", render_ascii(&session.snapshot(), &ascii));
    eprintln!("Final state hash: {:016x}", session.state_hash());
}

/// Validate a configuration file
fn cmd_validate(config: PathBuf) {
    let game = load_config(Some(config.clone()));
    eprintln!("OK: {}", config.display());
    eprintln!(
        "  Map: {}x{} ({} room attempts, {}% cover)",
        game.map.width, game.map.height, game.map.room_attempts, game.map.cover_percent
    );
    eprintln!(
        "  Squads: {} units, {} enemy squads",
        game.squads.squad_size, game.squads.enemy_squads
    );

    // Generation can still fail on a valid but cramped map.
    if let Err(e) = Session::new(game) {
        eprintln!("FAIL: {}", e);
        std::process::exit(1);
    }
}
