//! Determinism testing utilities.
//!
//! Provides a harness for verifying that a session produces identical
//! results given an identical configuration and command stream.
//!
//! # Testing Strategy
//!
//! Replays and batch statistics are only meaningful if a session is a pure
//! function of its seed and inputs. Sources of non-determinism include:
//!
//! - **Floating-point math**: the line tracer uses fixed-point via
//!   [`squad_core::math::Fixed`].
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Units are stored in a `Vec` and visited in squad order; hash sets are
//!   only ever used for membership.
//!
//! - **System randomness**: map generation, AI search points and dice all
//!   come from ChaCha streams seeded by the configuration.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: map generation, line of sight, pathfinding
//! 2. **Property tests**: random command streams replay to the same hash
//! 3. **Integration tests**: full games are reproducible from their replay
//! 4. **Parallel tests**: N sessions on N threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use squad_core::config::GameConfig;
use squad_core::replay::Command;
use squad_core::session::{Session, TurnState};
use squad_core::unit::Team;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps applied per run.
    pub steps: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic session).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Session is non-deterministic!\n\
                 Runs: {}\n\
                 Steps: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.steps,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a stepped process multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `steps` - Number of steps per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance state by one step
/// * `hash` - Function to compute state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    steps: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u64),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();
        for i in 0..steps {
            step(&mut state, i);
        }
        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    DeterminismResult {
        is_deterministic,
        hashes,
        steps,
    }
}

/// Build a session from `config` and apply `commands` in order.
///
/// # Panics
///
/// Panics if the session cannot be created or a reset fails.
#[must_use]
pub fn replay_commands(config: &GameConfig, commands: &[Command]) -> Session {
    let mut session = Session::new(config.clone()).expect("config should be valid");
    for &command in commands {
        let _ = session.apply(command).expect("command should not be fatal");
    }
    session
}

/// Apply the same command stream to `runs` fresh sessions and compare.
#[must_use]
pub fn verify_session_determinism(
    config: &GameConfig,
    commands: &[Command],
    runs: usize,
) -> DeterminismResult {
    verify_determinism(
        runs,
        commands.len() as u64,
        || Session::new(config.clone()).expect("config should be valid"),
        |session, i| {
            let _ = session
                .apply(commands[i as usize])
                .expect("command should not be fatal");
        },
        Session::state_hash,
    )
}

/// Result of parallel session runs.
#[derive(Debug, Clone)]
pub struct ParallelRunResult {
    /// Final state hash from each session.
    pub hashes: Vec<u64>,
    /// Number of sessions run.
    pub num_sessions: usize,
}

impl ParallelRunResult {
    /// Check if all sessions produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all sessions matched.
    ///
    /// # Panics
    ///
    /// Panics if sessions produced different hashes.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic(),
            "Parallel sessions diverged across {} threads: {:?}",
            self.num_sessions,
            self.hashes
        );
    }
}

/// Replay the same stream on `num_sessions` scoped threads.
///
/// # Panics
///
/// Panics if a worker thread panics.
#[must_use]
pub fn run_parallel_sessions(
    config: &GameConfig,
    commands: &[Command],
    num_sessions: usize,
) -> ParallelRunResult {
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sessions)
            .map(|_| s.spawn(|| replay_commands(config, commands).state_hash()))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("session thread panicked"))
            .collect()
    });

    ParallelRunResult {
        hashes,
        num_sessions,
    }
}

/// Compare two runs command by command, finding the first divergence.
///
/// # Returns
///
/// `None` if the runs stay identical, `Some(index)` of the first command
/// after which the hashes differ.
///
/// # Panics
///
/// Panics if the session cannot be created.
#[must_use]
pub fn find_first_divergence(config: &GameConfig, commands: &[Command]) -> Option<usize> {
    let mut a = Session::new(config.clone()).expect("config should be valid");
    let mut b = Session::new(config.clone()).expect("config should be valid");
    for (i, &command) in commands.iter().enumerate() {
        let ra = a.apply(command).expect("command should not be fatal");
        let rb = b.apply(command).expect("command should not be fatal");
        if ra != rb || a.state_hash() != b.state_hash() {
            tracing::warn!(index = i, ?command, "Sessions diverged");
            return Some(i);
        }
    }
    None
}

/// Compute a hash of any hashable value.
#[must_use]
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Drive a session with a naive player for up to `turns` full turns.
///
/// Each player turn every living player unit shoots the first visible enemy
/// while it can, then the turn is handed over and the AI plays out. Every
/// input goes through [`Session::apply`], so the result can be replayed.
///
/// # Panics
///
/// Panics if a command fails fatally.
pub fn play_turns(session: &mut Session, turns: u32) {
    if session.state() == TurnState::HomeScreen {
        let _ = session.apply(Command::Start).expect("start is not fatal");
    }
    for _ in 0..turns {
        if session.state() != TurnState::PlayerTurn {
            break;
        }
        let shooters: Vec<_> = session.living(Team::Player).map(|u| u.id).collect();
        for attacker in shooters {
            while let Some(&target) = session.visible_enemies().first() {
                let accepted = session
                    .apply(Command::Ranged { attacker, target })
                    .expect("attack is not fatal");
                if accepted.is_err() || session.state() != TurnState::PlayerTurn {
                    break;
                }
            }
        }
        if session.state() != TurnState::PlayerTurn {
            break;
        }
        let _ = session.apply(Command::EndPlayerTurn).expect("not fatal");
        while session.state() == TurnState::EnemyTurn {
            let _ = session.apply(Command::AdvanceEnemyAi).expect("not fatal");
        }
    }
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of sessions.
pub mod strategies {
    use proptest::prelude::*;
    use squad_core::config::MapConfig;
    use squad_core::math::GridPos;
    use squad_core::replay::Command;
    use squad_core::unit::UnitId;

    /// Generate a session seed.
    pub fn arb_seed() -> impl Strategy<Value = u64> {
        any::<u64>()
    }

    /// Generate a cell inside a `width` x `height` map.
    pub fn arb_grid_pos(width: u32, height: u32) -> impl Strategy<Value = GridPos> {
        (0..width as i32, 0..height as i32).prop_map(|(x, y)| GridPos::new(x, y))
    }

    /// Generate a unit id below `max_units`.
    pub fn arb_unit_id(max_units: u32) -> impl Strategy<Value = UnitId> {
        (0..max_units).prop_map(UnitId)
    }

    /// Generate any command except `Reset`, referring to the first
    /// `max_units` units and cells of the small map.
    pub fn arb_command(max_units: u32) -> impl Strategy<Value = Command> {
        let small = MapConfig::small();
        let unit = move || arb_unit_id(max_units);
        let phase = prop_oneof![
            Just(Command::Start),
            Just(Command::EndPlayerTurn),
            Just(Command::AdvanceEnemyAi),
            Just(Command::Tick),
            unit().prop_map(Command::Select),
            (1u32..5).prop_map(Command::SelectNumber),
        ];
        let action = prop_oneof![
            (unit(), arb_grid_pos(small.width, small.height))
                .prop_map(|(unit, to)| Command::RequestMove { unit, to }),
            unit().prop_map(Command::AdvanceMove),
            (unit(), unit()).prop_map(|(attacker, target)| Command::Ranged { attacker, target }),
            (unit(), unit()).prop_map(|(attacker, target)| Command::Melee { attacker, target }),
            (unit(), unit()).prop_map(|(healer, target)| Command::Heal { healer, target }),
            unit().prop_map(Command::Overwatch),
            unit().prop_map(Command::TogglePosture),
        ];
        prop_oneof![phase, action]
    }

    /// Generate a command stream that always begins with `Start`.
    pub fn arb_command_sequence(max_units: u32, max_len: usize) -> impl Strategy<Value = Vec<Command>> {
        proptest::collection::vec(arb_command(max_units), 0..max_len).prop_map(|mut commands| {
            commands.insert(0, Command::Start);
            commands
        })
    }

    /// Generate a cover density.
    pub fn arb_cover_percent() -> impl Strategy<Value = u32> {
        0u32..=40
    }
}
