//! Headless match runner for playtesting and CI verification.
//!
//! Plays generated matches with a scripted player squad against the
//! built-in enemy AI, without any presentation layer. This enables:
//!
//! - **Balance testing**: Batch runs over many seeds with win rates and awards
//! - **CI verification**: Determinism checks on full matches
//! - **Replay verification**: Check that recorded matches re-simulate identically
//!
//! Results go to stdout as JSON or ASCII maps; logs go to stderr.
//!
//! # Example
//!
//! ```bash
//! # Play one match and print the final map
//! cargo run -p squad_headless -- run --seed 7
//!
//! # Run a batch
//! cargo run -p squad_headless -- batch --count 500 --output results/
//!
//! # Verify a recorded match
//! cargo run -p squad_headless -- replay --file match.replay --verify
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ascii;
pub mod batch;
pub mod error;
pub mod runner;
pub mod strategies;

pub use ascii::{render_ascii, AsciiConfig};
pub use batch::{run_batch, verify_determinism, BatchConfig, BatchResults, BatchSummary};
pub use error::{Result, RunnerError};
pub use runner::{run_match, MatchResult, MatchRunner, RunOptions};
pub use strategies::{AutoPlayer, Intent};
