//! # Squad Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Fixture maps and sessions
//! - Scripted dice
//! - Determinism test harness
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod dice;
pub mod fixtures;

/// Re-export proptest for convenience.
pub use proptest;
