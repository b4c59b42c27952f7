//! Session configuration.
//!
//! Every tunable constant of a match lives here: map generation, squad
//! composition, per-action AP costs, damage, skill bonuses and AI pacing.
//! Configurations are plain data, loadable from RON files.
//!
//! # Example RON
//!
//! ```ron
//! GameConfig(
//!     seed: 7,
//!     map: MapConfig(width: 40, height: 30, room_attempts: 20),
//!     squads: SquadConfig(squad_size: 3, enemy_squads: 2),
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::unit::Team;

/// Map generation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Map width in tiles.
    pub width: u32,
    /// Map height in tiles.
    pub height: u32,
    /// Number of room placement attempts per generation.
    pub room_attempts: u32,
    /// Smallest room side (inclusive).
    pub min_room_size: u32,
    /// Largest room side (inclusive).
    pub max_room_size: u32,
    /// Chance, in percent, that a room floor tile becomes cover.
    pub cover_percent: u32,
    /// Upper bound on whole-map regeneration attempts.
    pub max_generation_attempts: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: 50,
            height: 40,
            room_attempts: 30,
            min_room_size: 5,
            max_room_size: 10,
            cover_percent: 10,
            max_generation_attempts: 16,
        }
    }
}

impl MapConfig {
    /// Create a small map suitable for quick tests.
    #[must_use]
    pub fn small() -> Self {
        Self {
            width: 32,
            height: 24,
            room_attempts: 16,
            ..Default::default()
        }
    }

    /// Set map dimensions.
    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set cover density.
    #[must_use]
    pub fn with_cover_percent(mut self, percent: u32) -> Self {
        self.cover_percent = percent.min(100);
        self
    }
}

/// Squad composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SquadConfig {
    /// Units per squad.
    pub squad_size: u32,
    /// Number of enemy squads (the player always fields one).
    pub enemy_squads: u32,
}

impl Default for SquadConfig {
    fn default() -> Self {
        Self {
            squad_size: 4,
            enemy_squads: 3,
        }
    }
}

impl SquadConfig {
    /// Spawn points a generated map must provide.
    #[must_use]
    pub const fn required_spawn_points(&self) -> usize {
        self.enemy_squads as usize + 1
    }
}

/// Unit attributes shared by both teams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    /// Maximum (and starting) hit points.
    pub max_hp: u32,
    /// Action points granted at the start of the team's turn.
    pub max_ap: u32,
    /// Vision radius in tiles (Euclidean, inclusive).
    pub vision_radius: u32,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            max_hp: 100,
            max_ap: 10,
            vision_radius: 8,
        }
    }
}

/// AP cost of every action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApCosts {
    /// One step along a path.
    pub movement: u32,
    /// Ranged attack.
    pub shoot: u32,
    /// Melee attack.
    pub melee: u32,
    /// Heal an adjacent ally.
    pub heal: u32,
    /// Enter overwatch.
    pub overwatch: u32,
    /// Toggle standing/prone.
    pub posture: u32,
}

impl Default for ApCosts {
    fn default() -> Self {
        Self {
            movement: 1,
            shoot: 5,
            melee: 3,
            heal: 4,
            overwatch: 3,
            posture: 2,
        }
    }
}

/// A value configured independently per team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerTeam {
    /// Value for the player side.
    pub player: u32,
    /// Value for the enemy side.
    pub enemy: u32,
}

impl PerTeam {
    /// Create a per-team pair.
    #[must_use]
    pub const fn new(player: u32, enemy: u32) -> Self {
        Self { player, enemy }
    }

    /// Value for `team`.
    #[must_use]
    pub const fn get(&self, team: Team) -> u32 {
        match team {
            Team::Player => self.player,
            Team::Enemy => self.enemy,
        }
    }
}

/// Damage, skill and difficulty tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Ranged (laser) damage per team.
    pub ranged_damage: PerTeam,
    /// Melee damage per team.
    pub melee_damage: PerTeam,
    /// Ranged skill bonus per team.
    pub ranged_skill: PerTeam,
    /// Melee skill bonus per team.
    pub melee_skill: PerTeam,
    /// Difficulty every attack roll must meet.
    pub base_difficulty: u32,
    /// Extra difficulty when the target is prone.
    pub prone_difficulty_bonus: u32,
    /// Hit points restored by a heal.
    pub heal_amount: u32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            ranged_damage: PerTeam::new(35, 25),
            melee_damage: PerTeam::new(50, 50),
            ranged_skill: PerTeam::new(5, 3),
            melee_skill: PerTeam::new(6, 4),
            base_difficulty: 12,
            prone_difficulty_bonus: 4,
            heal_amount: 30,
        }
    }
}

/// Enemy AI tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Pacing delay runners insert between AI ticks. The core never sleeps.
    pub tick_delay_ms: u64,
    /// A search point counts as reached once every squad member is closer than this.
    pub search_arrival_radius: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            tick_delay_ms: 100,
            search_arrival_radius: 3,
        }
    }
}

/// Complete configuration for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Seed for map generation, AI choices and skill checks.
    pub seed: u64,
    /// Map generation.
    pub map: MapConfig,
    /// Squad composition.
    pub squads: SquadConfig,
    /// Unit attributes.
    pub units: UnitConfig,
    /// Per-action AP costs.
    pub costs: ApCosts,
    /// Combat tuning.
    pub combat: CombatConfig,
    /// AI tuning.
    pub ai: AiConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            map: MapConfig::default(),
            squads: SquadConfig::default(),
            units: UnitConfig::default(),
            costs: ApCosts::default(),
            combat: CombatConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl GameConfig {
    /// Set the random seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Replace the map configuration.
    #[must_use]
    pub fn with_map(mut self, map: MapConfig) -> Self {
        self.map = map;
        self
    }

    /// Replace the squad composition.
    #[must_use]
    pub const fn with_squads(mut self, squad_size: u32, enemy_squads: u32) -> Self {
        self.squads = SquadConfig {
            squad_size,
            enemy_squads,
        };
        self
    }

    /// Load a configuration from a RON file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = ron::from_str(&contents).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a RON string and validate it.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        let config: Self = ron::from_str(ron).map_err(|e| GameError::DataParseError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| GameError::Serialization(e.to_string()))
    }

    /// Check the configuration for values the simulation cannot run with.
    pub fn validate(&self) -> Result<()> {
        let map = &self.map;
        if map.min_room_size < 3 || map.min_room_size > map.max_room_size {
            return Err(GameError::InvalidConfig(format!(
                "room size range {}..={} is invalid",
                map.min_room_size, map.max_room_size
            )));
        }
        if map.width < map.max_room_size + 2 || map.height < map.max_room_size + 2 {
            return Err(GameError::InvalidConfig(format!(
                "map {}x{} cannot hold rooms of size {}",
                map.width, map.height, map.max_room_size
            )));
        }
        if map.width > i32::MAX as u32 / 2 || map.height > i32::MAX as u32 / 2 {
            return Err(GameError::InvalidConfig("map dimensions too large".into()));
        }
        if map.cover_percent > 100 {
            return Err(GameError::InvalidConfig(format!(
                "cover_percent {} exceeds 100",
                map.cover_percent
            )));
        }
        if map.max_generation_attempts == 0 {
            return Err(GameError::InvalidConfig(
                "max_generation_attempts must be positive".into(),
            ));
        }
        if self.squads.squad_size == 0 || self.squads.enemy_squads == 0 {
            return Err(GameError::InvalidConfig(
                "need at least one unit per squad and one enemy squad".into(),
            ));
        }
        if self.units.max_hp == 0 || self.units.max_ap == 0 {
            return Err(GameError::InvalidConfig(
                "max_hp and max_ap must be positive".into(),
            ));
        }
        let costs = &self.costs;
        let all_costs = [
            ("movement", costs.movement),
            ("shoot", costs.shoot),
            ("melee", costs.melee),
            ("heal", costs.heal),
            ("overwatch", costs.overwatch),
            ("posture", costs.posture),
        ];
        // Every action must spend AP for enemy turns to end.
        if let Some((name, _)) = all_costs.iter().find(|(_, cost)| *cost == 0) {
            return Err(GameError::InvalidConfig(format!(
                "{name} cost must be at least 1 AP"
            )));
        }
        Ok(())
    }
}
