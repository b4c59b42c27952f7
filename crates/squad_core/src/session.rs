//! The turn and combat engine.
//!
//! A [`Session`] owns the map, every unit, the squads and the enemy AI state.
//! Player input and the AI resolve through the same entry points. Each entry
//! point validates first and returns a [`Rejection`] without touching state
//! when the command is illegal; otherwise it resolves reaction fire against
//! the acting unit, then the action itself.
//!
//! # Determinism
//!
//! - Map generation, spawn selection and AI search points draw from one
//!   `ChaCha8Rng` seeded with the configured seed.
//! - Skill checks draw from a separate [`Dice`] stream.
//! - Units are stored in a `Vec` indexed by [`UnitId`] and always visited in
//!   squad order.
//!
//! # Example
//!
//! ```
//! use squad_core::prelude::*;
//!
//! let mut session = Session::new(GameConfig::default().with_seed(7)).unwrap();
//! session.start().unwrap();
//! assert_eq!(session.state(), TurnState::PlayerTurn);
//! assert!(session.selected().is_some());
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::combat::{difficulty, skill_check, AttackKind, Dice, SeededDice};
use crate::config::GameConfig;
use crate::error::{ActionResult, GameError, Rejection, Result};
use crate::events::{decay_effects, DisplayEffect, Outcome, SimEvent};
use crate::grid_map::{GridMap, Occupants};
use crate::math::GridPos;
use crate::pathfinding::find_path;
use crate::replay::Command;
use crate::unit::{Team, Unit, UnitId};

/// Player unit call signs, assigned in squad order.
pub const PHONETIC_ALPHABET: [&str; 26] = [
    "Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot", "Golf", "Hotel", "India", "Juliet",
    "Kilo", "Lima", "Mike", "November", "Oscar", "Papa", "Quebec", "Romeo", "Sierra", "Tango",
    "Uniform", "Victor", "Whiskey", "X-ray", "Yankee", "Zulu",
];

/// Largest ring searched around a spawn point when placing a squad.
pub const MAX_SPAWN_RADIUS: i32 = 9;

/// Phase of play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TurnState {
    /// Waiting for the first `start`.
    HomeScreen,
    /// The player squad acts.
    PlayerTurn,
    /// Enemy squads act, one AI tick at a time.
    EnemyTurn,
    /// One side has been wiped out.
    GameOver,
}

impl TurnState {
    /// Short name used in rejections and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::HomeScreen => "home screen",
            Self::PlayerTurn => "player turn",
            Self::EnemyTurn => "enemy turn",
            Self::GameOver => "game over",
        }
    }
}

/// Ordered list of units sharing a team.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Squad {
    /// Side.
    pub team: Team,
    /// Members in action order.
    pub members: Vec<UnitId>,
}

/// Memory of one enemy squad's AI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SquadAiState {
    /// Player unit currently hunted.
    pub target: Option<UnitId>,
    /// Where a player was last seen.
    pub last_known: Option<GridPos>,
    /// Patrol destination when nothing is known.
    pub search_point: Option<GridPos>,
}

/// Explicit placement of one squad, for hand-built scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadLayout {
    /// Side.
    pub team: Team,
    /// One cell per unit.
    pub positions: Vec<GridPos>,
}

impl SquadLayout {
    /// Create a layout.
    #[must_use]
    pub fn new(team: Team, positions: impl Into<Vec<GridPos>>) -> Self {
        Self {
            team,
            positions: positions.into(),
        }
    }
}

/// How the world is rebuilt on reset.
#[derive(Debug, Clone)]
enum Setup {
    Generated,
    Fixed { map: GridMap, layouts: Vec<SquadLayout> },
}

/// A single game session.
#[derive(Debug)]
pub struct Session {
    pub(crate) config: GameConfig,
    pub(crate) map: GridMap,
    pub(crate) units: Vec<Unit>,
    /// Index 0 is the player squad; the rest are enemy squads.
    pub(crate) squads: Vec<Squad>,
    /// Parallel to the enemy squads (`squads[1..]`).
    pub(crate) ai_states: Vec<SquadAiState>,
    state: TurnState,
    outcome: Option<Outcome>,
    turn_number: u32,
    tick_count: u64,
    pub(crate) rng: ChaCha8Rng,
    dice: Box<dyn Dice>,
    events: Vec<SimEvent>,
    effects: Vec<DisplayEffect>,
    pub(crate) commands: Vec<Command>,
    setup: Setup,
}

impl Session {
    /// Create a session on a generated map with seeded dice.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or no map with
    /// enough spawn points can be generated.
    pub fn new(config: GameConfig) -> Result<Self> {
        let dice = Box::new(SeededDice::new(config.seed));
        Self::with_dice(config, dice)
    }

    /// Create a session on a generated map with the given dice.
    ///
    /// # Errors
    ///
    /// See [`Session::new`].
    pub fn with_dice(config: GameConfig, dice: Box<dyn Dice>) -> Result<Self> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let (map, layouts) = generate_world(&config, &mut rng)?;
        tracing::info!(
            seed = config.seed,
            width = map.width(),
            height = map.height(),
            rooms = map.rooms().len(),
            "Session created"
        );
        Ok(Self::assemble(config, map, &layouts, rng, dice, Setup::Generated))
    }

    /// Create a session on a hand-built map with explicit unit placement.
    ///
    /// The first layout must be the player squad; every other layout is an
    /// enemy squad.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] if the configuration is invalid,
    /// the layouts are not one player squad followed by at least one enemy
    /// squad, or a position is off the map, blocked or shared.
    pub fn with_layout(
        config: GameConfig,
        map: GridMap,
        layouts: Vec<SquadLayout>,
        dice: Box<dyn Dice>,
    ) -> Result<Self> {
        config.validate()?;
        validate_layouts(&map, &layouts)?;
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let setup = Setup::Fixed {
            map: map.clone(),
            layouts: layouts.clone(),
        };
        Ok(Self::assemble(config, map, &layouts, rng, dice, setup))
    }

    fn assemble(
        config: GameConfig,
        map: GridMap,
        layouts: &[SquadLayout],
        rng: ChaCha8Rng,
        dice: Box<dyn Dice>,
        setup: Setup,
    ) -> Self {
        let (units, squads) = spawn_squads(&config, layouts);
        let ai_states = vec![SquadAiState::default(); squads.len().saturating_sub(1)];
        Self {
            config,
            map,
            units,
            squads,
            ai_states,
            state: TurnState::HomeScreen,
            outcome: None,
            turn_number: 1,
            tick_count: 0,
            rng,
            dice,
            events: Vec::new(),
            effects: Vec::new(),
            commands: Vec::new(),
            setup,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &GameConfig {
        &self.config
    }

    /// The map, with visibility from the player squad's perspective.
    #[must_use]
    pub const fn map(&self) -> &GridMap {
        &self.map
    }

    /// Every unit ever spawned, indexed by [`UnitId`].
    #[must_use]
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Look up a unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id.index())
    }

    /// Living unit standing on `pos`.
    #[must_use]
    pub fn unit_at(&self, pos: GridPos) -> Option<&Unit> {
        self.units.iter().find(|u| u.is_alive && u.position == pos)
    }

    /// All squads; index 0 is the player squad.
    #[must_use]
    pub fn squads(&self) -> &[Squad] {
        &self.squads
    }

    /// The player squad.
    #[must_use]
    pub fn player_squad(&self) -> &Squad {
        &self.squads[0]
    }

    /// Enemy squads in AI order.
    #[must_use]
    pub fn enemy_squads(&self) -> &[Squad] {
        &self.squads[1..]
    }

    /// AI memory, parallel to [`Session::enemy_squads`].
    #[must_use]
    pub fn ai_states(&self) -> &[SquadAiState] {
        &self.ai_states
    }

    /// Current phase.
    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.state
    }

    /// Result, once the session is over.
    #[must_use]
    pub const fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Turn counter, starting at 1.
    #[must_use]
    pub const fn turn_number(&self) -> u32 {
        self.turn_number
    }

    /// Ticks processed outside the home screen.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Active display effects.
    #[must_use]
    pub fn effects(&self) -> &[DisplayEffect] {
        &self.effects
    }

    /// Events not yet drained.
    #[must_use]
    pub fn pending_events(&self) -> &[SimEvent] {
        &self.events
    }

    /// Take every event recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    /// Commands recorded through [`Session::apply`].
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// The currently selected player unit.
    #[must_use]
    pub fn selected(&self) -> Option<UnitId> {
        self.units.iter().find(|u| u.is_selected).map(|u| u.id)
    }

    /// Living members of `team`, in squad order.
    pub fn living(&self, team: Team) -> impl Iterator<Item = &Unit> + '_ {
        self.squads
            .iter()
            .filter(move |s| s.team == team)
            .flat_map(|s| s.members.iter())
            .map(move |id| &self.units[id.index()])
            .filter(|u| u.is_alive)
    }

    /// Living enemies on tiles the player currently sees.
    #[must_use]
    pub fn visible_enemies(&self) -> Vec<UnitId> {
        self.living(Team::Enemy)
            .filter(|u| self.map.is_visible(u.position))
            .map(|u| u.id)
            .collect()
    }

    /// Hash of the full simulation state, for determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.state.hash(&mut hasher);
        self.outcome.hash(&mut hasher);
        self.turn_number.hash(&mut hasher);
        self.units.hash(&mut hasher);
        self.ai_states.hash(&mut hasher);
        self.map.hash(&mut hasher);
        self.effects.hash(&mut hasher);
        hasher.finish()
    }

    // ------------------------------------------------------------------
    // Turn flow
    // ------------------------------------------------------------------

    /// Leave the home screen and begin the first player turn.
    ///
    /// # Errors
    ///
    /// Rejected outside [`TurnState::HomeScreen`].
    pub fn start(&mut self) -> ActionResult {
        self.require_state(TurnState::HomeScreen)?;
        tracing::info!("Session started");
        self.start_player_turn();
        Ok(())
    }

    /// Rebuild the world and return to the home screen.
    ///
    /// Generated sessions get a fresh map from the continuing seeded stream;
    /// hand-built sessions are restored to their original layout.
    ///
    /// # Errors
    ///
    /// Returns an error if map generation fails.
    pub fn reset(&mut self) -> Result<()> {
        let (map, layouts) = match &self.setup {
            Setup::Generated => generate_world(&self.config, &mut self.rng)?,
            Setup::Fixed { map, layouts } => (map.clone(), layouts.clone()),
        };
        let (units, squads) = spawn_squads(&self.config, &layouts);
        self.ai_states = vec![SquadAiState::default(); squads.len().saturating_sub(1)];
        self.map = map;
        self.units = units;
        self.squads = squads;
        self.state = TurnState::HomeScreen;
        self.outcome = None;
        self.turn_number = 1;
        self.effects.clear();
        self.events.clear();
        tracing::info!("Session reset");
        Ok(())
    }

    fn start_player_turn(&mut self) {
        self.state = TurnState::PlayerTurn;
        for unit in &mut self.units {
            unit.is_selected = false;
            if unit.team == Team::Player && unit.is_alive {
                unit.refill_ap();
                unit.has_fired_overwatch = false;
            }
        }
        self.refresh_fov();
        let first = self.living(Team::Player).next().map(|u| u.id);
        if let Some(id) = first {
            self.units[id.index()].is_selected = true;
        }
        self.events.push(SimEvent::TurnStarted {
            turn: self.turn_number,
            side: Team::Player,
        });
        tracing::info!(turn = self.turn_number, "Player turn started");
    }

    /// Hand control to the enemy squads.
    ///
    /// # Errors
    ///
    /// Rejected outside [`TurnState::PlayerTurn`].
    pub fn end_player_turn(&mut self) -> ActionResult {
        self.require_state(TurnState::PlayerTurn)?;
        self.state = TurnState::EnemyTurn;
        for unit in &mut self.units {
            match unit.team {
                Team::Player => unit.path.clear(),
                Team::Enemy if unit.is_alive => {
                    unit.refill_ap();
                    unit.has_fired_overwatch = false;
                }
                Team::Enemy => {}
            }
        }
        for ai in &mut self.ai_states {
            ai.target = None;
        }
        self.events.push(SimEvent::TurnStarted {
            turn: self.turn_number,
            side: Team::Enemy,
        });
        tracing::info!(turn = self.turn_number, "Enemy turn started");
        Ok(())
    }

    pub(crate) fn end_enemy_turn(&mut self) {
        self.turn_number += 1;
        self.start_player_turn();
    }

    /// Advance one frame.
    ///
    /// During the player turn the selected unit takes one step of its queued
    /// path; during the enemy turn the AI takes one action. Display effects
    /// age by one tick either way.
    pub fn tick(&mut self) {
        match self.state {
            TurnState::HomeScreen => return,
            TurnState::PlayerTurn => {
                if let Some(id) = self.selected() {
                    if !self.units[id.index()].path.is_empty() {
                        if let Err(reason) = self.advance_move(id) {
                            tracing::debug!(unit = %id, %reason, "Queued step rejected");
                        }
                    }
                }
            }
            TurnState::EnemyTurn => {
                if let Err(reason) = self.advance_enemy_ai() {
                    tracing::debug!(%reason, "AI tick rejected");
                }
            }
            TurnState::GameOver => {}
        }
        decay_effects(&mut self.effects);
        self.tick_count += 1;
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Select a living player unit.
    ///
    /// # Errors
    ///
    /// Rejected outside the player turn or for an enemy or dead unit.
    pub fn select_unit(&mut self, id: UnitId) -> ActionResult {
        self.require_state(TurnState::PlayerTurn)?;
        let unit = self.lookup(id)?;
        if unit.team != Team::Player || !unit.is_alive {
            return self.reject(Rejection::UnitUnavailable(id));
        }
        for unit in &mut self.units {
            unit.is_selected = unit.id == id;
        }
        Ok(())
    }

    /// Select a player unit by its hotkey number.
    ///
    /// # Errors
    ///
    /// Rejected if no living player unit carries `number`.
    pub fn select_number(&mut self, number: u32) -> ActionResult {
        let found = self.squads[0]
            .members
            .iter()
            .find(|id| self.units[id.index()].number == Some(number))
            .copied();
        match found {
            Some(id) => self.select_unit(id),
            None => self.reject(Rejection::UnknownUnit(UnitId(number))),
        }
    }

    // ------------------------------------------------------------------
    // Movement
    // ------------------------------------------------------------------

    /// Plan a path for a player unit. Costs no AP until steps are taken.
    ///
    /// Only squadmates are treated as obstacles while planning; enemies are
    /// discovered when a step runs into them.
    ///
    /// # Errors
    ///
    /// Rejected if the destination is blocked, occupied or unreachable.
    pub fn request_move(&mut self, id: UnitId, destination: GridPos) -> ActionResult {
        self.check_actor(id)?;
        if !self.map.is_walkable(destination) || self.unit_at(destination).is_some() {
            return self.reject(Rejection::InvalidDestination(destination));
        }
        let team = self.units[id.index()].team;
        let occupied: HashSet<GridPos> = self
            .living(team)
            .filter(|u| u.id != id)
            .map(|u| u.position)
            .collect();
        let start = self.units[id.index()].position;
        let path = find_path(&self.map, start, destination, &occupied);
        if path.len() < 2 {
            return self.reject(Rejection::Unreachable(destination));
        }
        tracing::trace!(unit = %id, steps = path.len() - 1, "Move planned");
        self.units[id.index()].path = path.into_iter().skip(1).collect();
        Ok(())
    }

    /// Take one step of a player unit's queued path.
    ///
    /// # Errors
    ///
    /// Rejected if there is no path, the step is unaffordable, or a living
    /// unit blocks the next cell (which also clears the path).
    pub fn advance_move(&mut self, id: UnitId) -> ActionResult {
        self.check_actor(id)?;
        self.step_along_path(id)
    }

    /// Shared step logic for player moves and AI moves.
    pub(crate) fn step_along_path(&mut self, id: UnitId) -> ActionResult {
        let cost = self.config.costs.movement;
        let unit = &self.units[id.index()];
        let Some(&next) = unit.path.front() else {
            return self.reject(Rejection::NoPath(id));
        };
        if !unit.can_afford(cost) {
            let available = unit.ap;
            self.units[id.index()].path.clear();
            return self.reject(Rejection::InsufficientAp {
                needed: cost,
                available,
            });
        }
        if self.unit_at(next).is_some() || !self.map.is_walkable(next) {
            self.units[id.index()].path.clear();
            return self.reject(Rejection::StepBlocked(next));
        }

        if self.resolve_reaction_fire(id, next) {
            return self.reject(Rejection::KilledByReaction(id));
        }

        let is_player = self.units[id.index()].team == Team::Player;
        let seen_before: HashSet<UnitId> = if is_player {
            self.visible_enemies().into_iter().collect()
        } else {
            HashSet::new()
        };

        let from = self.units[id.index()].position;
        let Some(to) = self.units[id.index()].move_one_step(cost) else {
            return self.reject(Rejection::NoPath(id));
        };
        self.events.push(SimEvent::UnitMoved { unit: id, from, to });
        tracing::trace!(unit = %id, %from, %to, "Unit moved");

        if is_player {
            self.refresh_fov();
            let contact = self
                .visible_enemies()
                .into_iter()
                .any(|enemy| !seen_before.contains(&enemy));
            if contact && !self.units[id.index()].path.is_empty() {
                self.units[id.index()].path.clear();
                self.events.push(SimEvent::MoveInterrupted { unit: id });
                tracing::debug!(unit = %id, "Move interrupted on contact");
            }
        }
        self.debug_validate();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    /// Fire a laser at an opposing unit.
    ///
    /// # Errors
    ///
    /// Rejected without AP cost if the shot is unaffordable, the target is
    /// invalid, sight is blocked, or (for the player) the target tile is not
    /// visible. Returns [`Rejection::KilledByReaction`] if overwatch fire
    /// kills the shooter first.
    pub fn ranged_attack(&mut self, attacker: UnitId, target: UnitId) -> ActionResult {
        let cost = self.config.costs.shoot;
        self.check_actor(attacker)?;
        self.check_affordable(attacker, cost)?;
        self.check_opponent(attacker, target)?;

        let shooter = &self.units[attacker.index()];
        let target_pos = self.units[target.index()].position;
        let occupants = self.occupants_excluding(&[attacker]);
        if !self
            .map
            .has_line_of_sight(shooter.position, shooter.posture, target_pos, &occupants)
        {
            return self.reject(Rejection::NoLineOfSight(target_pos));
        }
        if shooter.team == Team::Player && !self.map.is_visible(target_pos) {
            return self.reject(Rejection::TargetNotVisible(target_pos));
        }

        let exposed = shooter.position;
        if self.resolve_reaction_fire(attacker, exposed) {
            return self.reject(Rejection::KilledByReaction(attacker));
        }
        let unit = &mut self.units[attacker.index()];
        unit.spend_ap(cost);
        unit.stand_down();
        self.resolve_attack(attacker, target, AttackKind::Ranged, false);
        self.debug_validate();
        Ok(())
    }

    /// Strike an adjacent opposing unit.
    ///
    /// # Errors
    ///
    /// Rejected without AP cost if unaffordable, the target is invalid or it
    /// is not in one of the eight surrounding cells.
    pub fn melee_attack(&mut self, attacker: UnitId, target: UnitId) -> ActionResult {
        let cost = self.config.costs.melee;
        self.check_actor(attacker)?;
        self.check_affordable(attacker, cost)?;
        self.check_opponent(attacker, target)?;

        let position = self.units[attacker.index()].position;
        let target_pos = self.units[target.index()].position;
        if !position.is_adjacent(target_pos) {
            return self.reject(Rejection::OutOfReach(target_pos));
        }

        if self.resolve_reaction_fire(attacker, position) {
            return self.reject(Rejection::KilledByReaction(attacker));
        }
        let unit = &mut self.units[attacker.index()];
        unit.spend_ap(cost);
        unit.stand_down();
        self.resolve_attack(attacker, target, AttackKind::Melee, false);
        self.debug_validate();
        Ok(())
    }

    /// Heal an adjacent wounded squadmate.
    ///
    /// # Errors
    ///
    /// Rejected if unaffordable, the patient is not a living wounded
    /// squadmate, or it is not adjacent.
    pub fn heal(&mut self, healer: UnitId, target: UnitId) -> ActionResult {
        let cost = self.config.costs.heal;
        self.check_actor(healer)?;
        self.check_affordable(healer, cost)?;
        let medic = &self.units[healer.index()];
        let patient = self.lookup(target)?;
        if target == healer || !patient.is_alive || patient.team != medic.team {
            return self.reject(Rejection::InvalidTarget(target));
        }
        if !medic.position.is_adjacent(patient.position) {
            return self.reject(Rejection::OutOfReach(patient.position));
        }
        if patient.hp >= patient.max_hp {
            return self.reject(Rejection::FullHealth(target));
        }

        let position = medic.position;
        if self.resolve_reaction_fire(healer, position) {
            return self.reject(Rejection::KilledByReaction(healer));
        }
        let medic = &mut self.units[healer.index()];
        medic.spend_ap(cost);
        medic.stats.heals_given += 1;
        let patient = &mut self.units[target.index()];
        let before = patient.hp;
        patient.heal(self.config.combat.heal_amount);
        let amount = patient.hp - before;
        self.events.push(SimEvent::Healed {
            healer,
            target,
            amount,
        });
        tracing::debug!(healer = %healer, target = %target, amount, "Unit healed");
        Ok(())
    }

    /// Put a unit on overwatch.
    ///
    /// # Errors
    ///
    /// Rejected if unaffordable or already on overwatch.
    pub fn set_overwatch(&mut self, id: UnitId) -> ActionResult {
        let cost = self.config.costs.overwatch;
        self.check_actor(id)?;
        self.check_affordable(id, cost)?;
        if self.units[id.index()].is_on_overwatch {
            return self.reject(Rejection::AlreadyOnOverwatch(id));
        }
        let position = self.units[id.index()].position;
        if self.resolve_reaction_fire(id, position) {
            return self.reject(Rejection::KilledByReaction(id));
        }
        let unit = &mut self.units[id.index()];
        unit.spend_ap(cost);
        unit.is_on_overwatch = true;
        self.events.push(SimEvent::OverwatchSet { unit: id });
        tracing::debug!(unit = %id, "Overwatch set");
        Ok(())
    }

    /// Toggle between standing and prone.
    ///
    /// # Errors
    ///
    /// Rejected if unaffordable.
    pub fn toggle_posture(&mut self, id: UnitId) -> ActionResult {
        let cost = self.config.costs.posture;
        self.check_actor(id)?;
        self.check_affordable(id, cost)?;
        let position = self.units[id.index()].position;
        if self.resolve_reaction_fire(id, position) {
            return self.reject(Rejection::KilledByReaction(id));
        }
        let unit = &mut self.units[id.index()];
        unit.change_posture(cost);
        let posture = unit.posture;
        if unit.team == Team::Player {
            // Prone units see over less cover.
            self.refresh_fov();
        }
        self.events.push(SimEvent::PostureChanged { unit: id, posture });
        tracing::debug!(unit = %id, ?posture, "Posture changed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Run the skill check and apply damage. Spends no AP.
    fn resolve_attack(&mut self, attacker: UnitId, target: UnitId, kind: AttackKind, reaction: bool) {
        let combat = &self.config.combat;
        let (team, from) = {
            let a = &self.units[attacker.index()];
            (a.team, a.position)
        };
        let (to, posture) = {
            let t = &self.units[target.index()];
            (t.position, t.posture)
        };

        let bonus = kind.skill_bonus(team, combat);
        let roll = skill_check(self.dice.as_mut(), bonus, difficulty(combat, posture));
        let mut damage = 0;
        let mut killed = false;
        self.units[attacker.index()].stats.shots_taken += 1;
        if roll.success {
            damage = kind.damage(team, combat);
            self.units[attacker.index()].stats.shots_hit += 1;
            killed = self.units[target.index()].take_damage(damage);
            if kind == AttackKind::Ranged {
                self.effects.push(DisplayEffect::laser(from, to));
            }
        }
        self.effects.push(DisplayEffect::skill_check(to, roll.success));
        self.events.push(SimEvent::AttackResolved {
            attacker,
            target,
            kind,
            roll,
            damage,
            reaction,
        });
        tracing::debug!(
            attacker = %attacker,
            target = %target,
            ?kind,
            roll = roll.roll,
            total = roll.total,
            difficulty = roll.difficulty,
            hit = roll.success,
            damage,
            reaction,
            "Attack resolved"
        );

        if killed {
            self.units[attacker.index()].stats.kills += 1;
            self.events.push(SimEvent::UnitDied {
                unit: target,
                killer: attacker,
            });
            tracing::info!(unit = %target, killer = %attacker, "Unit killed");
        }
        if damage > 0 {
            self.check_game_over();
        }
    }

    /// Give the first ready overwatcher on the other side a free shot at
    /// `actor` as it exposes itself at `cell`.
    ///
    /// Returns true if the actor died.
    fn resolve_reaction_fire(&mut self, actor: UnitId, cell: GridPos) -> bool {
        let actor_team = self.units[actor.index()].team;
        let radius = self.config.units.vision_radius;
        let reactor = self
            .living(actor_team.opponent())
            .filter(|u| u.is_on_overwatch && !u.has_fired_overwatch)
            .filter(|u| u.position.within_radius(cell, radius))
            .find(|u| {
                let occupants = self.occupants_excluding(&[u.id, actor]);
                self.map
                    .has_line_of_sight(u.position, u.posture, cell, &occupants)
            })
            .map(|u| u.id);

        let Some(reactor) = reactor else {
            return false;
        };
        tracing::debug!(reactor = %reactor, actor = %actor, %cell, "Reaction fire");
        let unit = &mut self.units[reactor.index()];
        unit.has_fired_overwatch = true;
        unit.is_on_overwatch = false;
        self.resolve_attack(reactor, actor, AttackKind::Ranged, true);
        !self.units[actor.index()].is_alive
    }

    /// End the session if a side has no living units left.
    pub fn check_game_over(&mut self) -> Option<Outcome> {
        if self.state == TurnState::GameOver {
            return self.outcome;
        }
        let outcome = if self.living(Team::Player).next().is_none() {
            Outcome::Defeat
        } else if self.living(Team::Enemy).next().is_none() {
            Outcome::Victory
        } else {
            return None;
        };
        self.state = TurnState::GameOver;
        self.outcome = Some(outcome);
        for unit in &mut self.units {
            unit.path.clear();
        }
        self.events.push(SimEvent::GameOver { outcome });
        tracing::info!(?outcome, turn = self.turn_number, "Game over");
        Some(outcome)
    }

    /// Recompute player FOV.
    pub(crate) fn refresh_fov(&mut self) {
        let radius = self.config.units.vision_radius;
        let viewers: Vec<&Unit> = self.living(Team::Player).collect();
        let visible = self.map.visible_cells(viewers, radius);
        self.map.apply_visibility(&visible);
    }

    // ------------------------------------------------------------------
    // Validation helpers
    // ------------------------------------------------------------------

    pub(crate) fn reject<T>(&self, reason: Rejection) -> std::result::Result<T, Rejection> {
        tracing::debug!(state = self.state.name(), %reason, "Command rejected");
        Err(reason)
    }

    fn require_state(&self, expected: TurnState) -> ActionResult {
        if self.state == expected {
            Ok(())
        } else {
            self.reject(Rejection::WrongPhase(self.state.name()))
        }
    }

    fn lookup(&self, id: UnitId) -> std::result::Result<&Unit, Rejection> {
        match self.units.get(id.index()) {
            Some(unit) => Ok(unit),
            None => self.reject(Rejection::UnknownUnit(id)),
        }
    }

    /// The unit must exist, be alive, and belong to the side whose turn it is.
    fn check_actor(&self, id: UnitId) -> ActionResult {
        let acting_team = match self.state {
            TurnState::PlayerTurn => Team::Player,
            TurnState::EnemyTurn => Team::Enemy,
            other => return self.reject(Rejection::WrongPhase(other.name())),
        };
        let unit = self.lookup(id)?;
        if !unit.is_alive || unit.team != acting_team {
            return self.reject(Rejection::UnitUnavailable(id));
        }
        Ok(())
    }

    fn check_affordable(&self, id: UnitId, cost: u32) -> ActionResult {
        let available = self.units[id.index()].ap;
        if available < cost {
            return self.reject(Rejection::InsufficientAp {
                needed: cost,
                available,
            });
        }
        Ok(())
    }

    fn check_opponent(&self, attacker: UnitId, target: UnitId) -> ActionResult {
        let target_unit = self.lookup(target)?;
        if !target_unit.is_alive || target_unit.team == self.units[attacker.index()].team {
            return self.reject(Rejection::InvalidTarget(target));
        }
        Ok(())
    }

    /// Living units as sight-line occupants, minus `exclude`.
    pub(crate) fn occupants_excluding(&self, exclude: &[UnitId]) -> Occupants {
        self.units
            .iter()
            .filter(|u| u.is_alive && !exclude.contains(&u.id))
            .map(|u| (u.position, u.posture))
            .collect()
    }

    /// Cells of living units, minus `exclude`.
    pub(crate) fn occupied_cells(&self, exclude: UnitId) -> HashSet<GridPos> {
        self.units
            .iter()
            .filter(|u| u.is_alive && u.id != exclude)
            .map(|u| u.position)
            .collect()
    }

    #[cfg(feature = "debug-validation")]
    fn debug_validate(&self) {
        let mut cells = HashSet::new();
        for unit in &self.units {
            assert!(unit.hp <= unit.max_hp, "{} hp above max", unit.id);
            assert!(unit.ap <= unit.max_ap, "{} ap above max", unit.id);
            assert_eq!(unit.is_alive, unit.hp > 0, "{} alive flag out of sync", unit.id);
            if unit.is_alive {
                assert!(cells.insert(unit.position), "two units on {}", unit.position);
                assert!(self.map.is_walkable(unit.position), "{} inside a wall", unit.id);
            }
        }
    }

    #[cfg(not(feature = "debug-validation"))]
    #[inline]
    fn debug_validate(&self) {}
}

/// Generate a map and pick one spawn point per squad.
fn generate_world(
    config: &GameConfig,
    rng: &mut ChaCha8Rng,
) -> Result<(GridMap, Vec<SquadLayout>)> {
    let required = config.squads.required_spawn_points();
    let map = GridMap::generate_with_retries(&config.map, required, rng)?;

    let mut centres = map.spawn_points().to_vec();
    centres.shuffle(rng);
    centres.truncate(required);

    let mut occupied = HashSet::new();
    let layouts = centres
        .iter()
        .enumerate()
        .map(|(i, &centre)| {
            let team = if i == 0 { Team::Player } else { Team::Enemy };
            let positions =
                find_spawn_tiles(&map, centre, config.squads.squad_size as usize, &mut occupied);
            if positions.len() < config.squads.squad_size as usize {
                tracing::warn!(%centre, placed = positions.len(), "Squad spawned short-handed");
            }
            SquadLayout::new(team, positions)
        })
        .collect();
    Ok((map, layouts))
}

/// Cells for `count` units around `centre`: the centre first, then rings of
/// growing radius. Skips walls, cover and `occupied`, which is extended.
pub fn find_spawn_tiles(
    map: &GridMap,
    centre: GridPos,
    count: usize,
    occupied: &mut HashSet<GridPos>,
) -> Vec<GridPos> {
    let mut tiles = Vec::with_capacity(count);
    let mut try_cell = |cell: GridPos, tiles: &mut Vec<GridPos>| {
        if tiles.len() < count && map.is_walkable(cell) && occupied.insert(cell) {
            tiles.push(cell);
        }
    };
    try_cell(centre, &mut tiles);
    for radius in 1..=MAX_SPAWN_RADIUS {
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                if dx.abs() == radius || dy.abs() == radius {
                    try_cell(centre + GridPos::new(dx, dy), &mut tiles);
                }
            }
        }
        if tiles.len() >= count {
            break;
        }
    }
    tiles
}

fn spawn_squads(config: &GameConfig, layouts: &[SquadLayout]) -> (Vec<Unit>, Vec<Squad>) {
    let mut units = Vec::new();
    let mut squads = Vec::with_capacity(layouts.len());
    for layout in layouts {
        let mut members = Vec::with_capacity(layout.positions.len());
        for (i, &pos) in layout.positions.iter().enumerate() {
            let id = UnitId(units.len() as u32);
            let mut unit = Unit::new(
                id,
                layout.team,
                pos,
                config.units.max_hp,
                config.units.max_ap,
            );
            if layout.team == Team::Player {
                let number = i as u32 + 1;
                let name = PHONETIC_ALPHABET
                    .get(i)
                    .map_or_else(|| format!("Unit {number}"), |n| (*n).to_string());
                unit = unit.with_name(name, number);
            }
            members.push(id);
            units.push(unit);
        }
        squads.push(Squad {
            team: layout.team,
            members,
        });
    }
    (units, squads)
}

fn validate_layouts(map: &GridMap, layouts: &[SquadLayout]) -> Result<()> {
    let Some((player, enemies)) = layouts.split_first() else {
        return Err(GameError::InvalidConfig("no squads given".into()));
    };
    if player.team != Team::Player {
        return Err(GameError::InvalidConfig(
            "first squad must be the player squad".into(),
        ));
    }
    if enemies.is_empty() || enemies.iter().any(|s| s.team != Team::Enemy) {
        return Err(GameError::InvalidConfig(
            "every squad after the first must be an enemy squad".into(),
        ));
    }
    let mut seen = HashSet::new();
    for &pos in layouts.iter().flat_map(|l| l.positions.iter()) {
        if !map.is_walkable(pos) {
            return Err(GameError::InvalidConfig(format!(
                "unit placed on blocked cell {pos}"
            )));
        }
        if !seen.insert(pos) {
            return Err(GameError::InvalidConfig(format!(
                "two units placed on {pos}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::combat::{Loaded, SKILL_DIE};
    use crate::unit::Posture;

    pub(crate) fn arena(player: &[(i32, i32)], enemy: &[(i32, i32)], roll: u32) -> Session {
        let to_pos = |cells: &[(i32, i32)]| cells.iter().map(|&c| c.into()).collect::<Vec<_>>();
        Session::with_layout(
            GameConfig::default(),
            GridMap::open(20, 20),
            vec![
                SquadLayout::new(Team::Player, to_pos(player)),
                SquadLayout::new(Team::Enemy, to_pos(enemy)),
            ],
            Box::new(Loaded(roll)),
        )
        .unwrap()
    }

    fn started(player: &[(i32, i32)], enemy: &[(i32, i32)], roll: u32) -> Session {
        let mut session = arena(player, enemy, roll);
        session.start().unwrap();
        session
    }

    #[test]
    fn test_generated_session_spawns_squads() {
        let session = Session::new(GameConfig::default().with_seed(11)).unwrap();
        assert_eq!(session.state(), TurnState::HomeScreen);
        assert_eq!(session.turn_number(), 1);
        assert_eq!(session.squads().len(), 4);
        assert_eq!(session.ai_states().len(), 3);

        let player = session.player_squad();
        assert_eq!(player.members.len(), 4);
        let first = session.unit(player.members[0]).unwrap();
        assert_eq!(first.name.as_deref(), Some("Alpha"));
        assert_eq!(first.number, Some(1));

        let mut cells = HashSet::new();
        for unit in session.units() {
            assert!(session.map().is_walkable(unit.position));
            assert!(cells.insert(unit.position));
        }
    }

    #[test]
    fn test_same_seed_same_world() {
        let a = Session::new(GameConfig::default().with_seed(5)).unwrap();
        let b = Session::new(GameConfig::default().with_seed(5)).unwrap();
        assert_eq!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_start_selects_first_unit_and_refreshes_fov() {
        let session = started(&[(2, 2), (3, 2)], &[(15, 15)], 20);
        assert_eq!(session.state(), TurnState::PlayerTurn);
        assert_eq!(session.selected(), Some(UnitId(0)));
        assert!(session.map().is_visible(GridPos::new(2, 2)));
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut session = started(&[(2, 2)], &[(15, 15)], 20);
        assert_eq!(
            session.start(),
            Err(Rejection::WrongPhase("player turn"))
        );
    }

    #[test]
    fn test_select_number() {
        let mut session = started(&[(2, 2), (3, 2)], &[(15, 15)], 20);
        session.select_number(2).unwrap();
        assert_eq!(session.selected(), Some(UnitId(1)));
        assert!(session.select_number(9).is_err());
        assert_eq!(session.selected(), Some(UnitId(1)));
    }

    #[test]
    fn test_ranged_hit_spends_ap_and_damages() {
        let mut session = started(&[(2, 2)], &[(6, 2)], 20);
        session.ranged_attack(UnitId(0), UnitId(1)).unwrap();

        let shooter = session.unit(UnitId(0)).unwrap();
        assert_eq!(shooter.ap, 5);
        assert_eq!(shooter.stats.shots_taken, 1);
        assert_eq!(shooter.stats.shots_hit, 1);
        assert_eq!(session.unit(UnitId(1)).unwrap().hp, 65);
        assert_eq!(session.effects().len(), 2);
    }

    #[test]
    fn test_miss_still_costs_ap() {
        let mut session = started(&[(2, 2)], &[(6, 2)], 1);
        session.ranged_attack(UnitId(0), UnitId(1)).unwrap();
        assert_eq!(session.unit(UnitId(0)).unwrap().ap, 5);
        assert_eq!(session.unit(UnitId(1)).unwrap().hp, 100);
        assert_eq!(session.effects()[0].kind.label(), Some("Miss!"));
    }

    #[test]
    fn test_rejected_shot_is_free() {
        let mut session = started(&[(2, 2)], &[(6, 2)], 20);
        let before = session.state_hash();
        assert_eq!(
            session.ranged_attack(UnitId(0), UnitId(0)),
            Err(Rejection::InvalidTarget(UnitId(0)))
        );
        assert_eq!(session.state_hash(), before);
    }

    #[test]
    fn test_shot_needs_visible_target() {
        // Out of vision range but in clear line.
        let mut session = started(&[(1, 1)], &[(18, 1)], 20);
        assert_eq!(
            session.ranged_attack(UnitId(0), UnitId(1)),
            Err(Rejection::TargetNotVisible(GridPos::new(18, 1)))
        );
        assert_eq!(session.unit(UnitId(0)).unwrap().ap, 10);
    }

    #[test]
    fn test_melee_needs_adjacency() {
        let mut session = started(&[(2, 2)], &[(4, 2)], 20);
        assert_eq!(
            session.melee_attack(UnitId(0), UnitId(1)),
            Err(Rejection::OutOfReach(GridPos::new(4, 2)))
        );
        let mut session = started(&[(2, 2)], &[(3, 3)], 20);
        session.melee_attack(UnitId(0), UnitId(1)).unwrap();
        assert_eq!(session.unit(UnitId(1)).unwrap().hp, 50);
        assert_eq!(session.unit(UnitId(0)).unwrap().ap, 7);
    }

    #[test]
    fn test_heal_adjacent_squadmate() {
        let mut session = started(&[(2, 2), (3, 2)], &[(15, 15)], 20);
        assert_eq!(
            session.heal(UnitId(0), UnitId(1)),
            Err(Rejection::FullHealth(UnitId(1)))
        );
        session.units[1].hp = 90;
        session.heal(UnitId(0), UnitId(1)).unwrap();
        assert_eq!(session.unit(UnitId(1)).unwrap().hp, 100);
        assert_eq!(session.unit(UnitId(0)).unwrap().stats.heals_given, 1);
        assert!(session
            .drain_events()
            .contains(&SimEvent::Healed { healer: UnitId(0), target: UnitId(1), amount: 10 }));
    }

    #[test]
    fn test_overwatch_once() {
        let mut session = started(&[(2, 2)], &[(15, 15)], 20);
        session.set_overwatch(UnitId(0)).unwrap();
        assert_eq!(
            session.set_overwatch(UnitId(0)),
            Err(Rejection::AlreadyOnOverwatch(UnitId(0)))
        );
        assert_eq!(session.unit(UnitId(0)).unwrap().ap, 7);
    }

    #[test]
    fn test_posture_toggle() {
        let mut session = started(&[(2, 2)], &[(15, 15)], 20);
        session.toggle_posture(UnitId(0)).unwrap();
        assert_eq!(session.unit(UnitId(0)).unwrap().posture, Posture::Prone);
        session.units[0].ap = 1;
        assert!(session.toggle_posture(UnitId(0)).is_err());
        assert_eq!(session.unit(UnitId(0)).unwrap().posture, Posture::Prone);
    }

    #[test]
    fn test_move_step_by_step() {
        let mut session = started(&[(2, 2)], &[(15, 15)], 20);
        session.request_move(UnitId(0), GridPos::new(5, 2)).unwrap();
        assert_eq!(session.unit(UnitId(0)).unwrap().ap, 10);
        for _ in 0..3 {
            session.tick();
        }
        let unit = session.unit(UnitId(0)).unwrap();
        assert_eq!(unit.position, GridPos::new(5, 2));
        assert_eq!(unit.ap, 7);
        assert_eq!(unit.stats.distance_travelled, 6);
        assert!(unit.path.is_empty());
    }

    #[test]
    fn test_move_into_occupied_cell_is_rejected() {
        let mut session = started(&[(2, 2), (4, 2)], &[(15, 15)], 20);
        assert_eq!(
            session.request_move(UnitId(0), GridPos::new(4, 2)),
            Err(Rejection::InvalidDestination(GridPos::new(4, 2)))
        );
    }

    #[test]
    fn test_step_blocked_clears_path() {
        let mut session = started(&[(2, 2)], &[(15, 15)], 20);
        session.request_move(UnitId(0), GridPos::new(6, 2)).unwrap();
        // An enemy wanders into the planned route.
        let next = *session.units[0].path.front().unwrap();
        session.units[1].position = next;
        assert_eq!(session.advance_move(UnitId(0)), Err(Rejection::StepBlocked(next)));
        assert!(session.unit(UnitId(0)).unwrap().path.is_empty());
        assert_eq!(session.unit(UnitId(0)).unwrap().ap, 10);
    }

    #[test]
    fn test_contact_interrupts_move() {
        // Enemy sits just beyond vision; the first step reveals it.
        let mut session = started(&[(1, 10)], &[(10, 10)], 20);
        assert!(session.visible_enemies().is_empty());
        session.request_move(UnitId(0), GridPos::new(5, 10)).unwrap();
        session.advance_move(UnitId(0)).unwrap();
        let unit = session.unit(UnitId(0)).unwrap();
        assert!(unit.path.is_empty());
        assert!(session
            .pending_events()
            .contains(&SimEvent::MoveInterrupted { unit: UnitId(0) }));
    }

    #[test]
    fn test_end_turn_refills_enemies() {
        let mut session = started(&[(2, 2)], &[(15, 15)], 20);
        session.units[1].ap = 0;
        session.end_player_turn().unwrap();
        assert_eq!(session.state(), TurnState::EnemyTurn);
        assert_eq!(session.unit(UnitId(1)).unwrap().ap, 10);
        assert!(session.end_player_turn().is_err());
    }

    #[test]
    fn test_last_enemy_killed_is_victory() {
        let mut session = started(&[(2, 2)], &[(3, 2)], SKILL_DIE);
        session.units[1].hp = 10;
        session.melee_attack(UnitId(0), UnitId(1)).unwrap();
        assert_eq!(session.state(), TurnState::GameOver);
        assert_eq!(session.outcome(), Some(Outcome::Victory));
        assert_eq!(session.unit(UnitId(0)).unwrap().stats.kills, 1);
        assert!(session.ranged_attack(UnitId(0), UnitId(1)).is_err());
    }

    #[test]
    fn test_reset_restores_layout() {
        let mut session = started(&[(2, 2)], &[(3, 2)], SKILL_DIE);
        session.melee_attack(UnitId(0), UnitId(1)).unwrap();
        session.reset().unwrap();
        assert_eq!(session.state(), TurnState::HomeScreen);
        assert_eq!(session.turn_number(), 1);
        assert_eq!(session.unit(UnitId(1)).unwrap().hp, 100);
        assert!(session.effects().is_empty());
    }

    #[test]
    fn test_layout_validation() {
        let map = GridMap::open(5, 5);
        let bad = Session::with_layout(
            GameConfig::default(),
            map.clone(),
            vec![SquadLayout::new(Team::Enemy, vec![GridPos::new(1, 1)])],
            Box::new(Loaded(10)),
        );
        assert!(matches!(bad, Err(GameError::InvalidConfig(_))));

        let shared = Session::with_layout(
            GameConfig::default(),
            map,
            vec![
                SquadLayout::new(Team::Player, vec![GridPos::new(1, 1)]),
                SquadLayout::new(Team::Enemy, vec![GridPos::new(1, 1)]),
            ],
            Box::new(Loaded(10)),
        );
        assert!(matches!(shared, Err(GameError::InvalidConfig(_))));
    }

    #[test]
    fn test_spawn_rings_skip_blocked_cells() {
        let map = GridMap::from_ascii(
            "
            #####
            #.+.#
            #...#
            #####
            ",
        );
        let mut occupied = HashSet::new();
        let tiles = find_spawn_tiles(&map, GridPos::new(2, 2), 4, &mut occupied);
        assert_eq!(tiles[0], GridPos::new(2, 2));
        assert_eq!(tiles.len(), 4);
        assert!(!tiles.contains(&GridPos::new(2, 1)));
        assert_eq!(occupied.len(), 4);
    }
}
