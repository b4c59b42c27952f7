//! Dice with predetermined results.

use std::collections::VecDeque;

use squad_core::combat::Dice;

/// Rolls a fixed script of faces, then repeats a fallback face forever.
///
/// Faces are clamped to `1..=sides`.
#[derive(Debug, Clone)]
pub struct ScriptedDice {
    rolls: VecDeque<u32>,
    fallback: u32,
}

impl ScriptedDice {
    /// Roll `rolls` in order, then `fallback`.
    #[must_use]
    pub fn new(rolls: impl IntoIterator<Item = u32>, fallback: u32) -> Self {
        Self {
            rolls: rolls.into_iter().collect(),
            fallback,
        }
    }

    /// Always roll `face`.
    #[must_use]
    pub fn always(face: u32) -> Self {
        Self::new([], face)
    }

    /// Every attack hits: natural 20s.
    #[must_use]
    pub fn always_hit() -> Self {
        Self::always(20)
    }

    /// Every attack misses: natural 1s.
    #[must_use]
    pub fn always_miss() -> Self {
        Self::always(1)
    }

    /// Scripted rolls not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rolls.len()
    }
}

impl Dice for ScriptedDice {
    fn roll(&mut self, sides: u32) -> u32 {
        let face = self.rolls.pop_front().unwrap_or(self.fallback);
        face.clamp(1, sides.max(1))
    }
}
