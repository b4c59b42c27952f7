//! Read-only views of a session for presenters and tooling.

use serde::{Deserialize, Serialize};

use crate::events::{DisplayEffect, Outcome};
use crate::grid_map::Tile;
use crate::math::GridPos;
use crate::session::{Session, TurnState};
use crate::unit::{Posture, Team, Unit, UnitId};

/// What a presenter needs to draw one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitView {
    /// Stable handle.
    pub id: UnitId,
    /// Side.
    pub team: Team,
    /// Display label.
    pub label: String,
    /// Hotkey number, player units only.
    pub number: Option<u32>,
    /// Cell.
    pub position: GridPos,
    /// Hit points.
    pub hp: u32,
    /// Maximum hit points.
    pub max_hp: u32,
    /// Action points.
    pub ap: u32,
    /// Maximum action points.
    pub max_ap: u32,
    /// Standing or prone.
    pub posture: Posture,
    /// Still in the fight.
    pub is_alive: bool,
    /// Currently selected.
    pub is_selected: bool,
    /// Watching for movement.
    pub is_on_overwatch: bool,
}

impl From<&Unit> for UnitView {
    fn from(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            team: unit.team,
            label: unit.label(),
            number: unit.number,
            position: unit.position,
            hp: unit.hp,
            max_hp: unit.max_hp,
            ap: unit.ap,
            max_ap: unit.max_ap,
            posture: unit.posture,
            is_alive: unit.is_alive,
            is_selected: unit.is_selected,
            is_on_overwatch: unit.is_on_overwatch,
        }
    }
}

/// Full, serialisable picture of a session at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Phase of play.
    pub state: TurnState,
    /// Turn counter.
    pub turn_number: u32,
    /// Result, once decided.
    pub outcome: Option<Outcome>,
    /// Map width in tiles.
    pub width: u32,
    /// Map height in tiles.
    pub height: u32,
    /// Tiles, row-major.
    pub tiles: Vec<Tile>,
    /// Every unit, dead ones included.
    pub units: Vec<UnitView>,
    /// Active display effects.
    pub effects: Vec<DisplayEffect>,
    /// Determinism fingerprint.
    pub state_hash: u64,
}

impl Session {
    /// Capture the current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            turn_number: self.turn_number(),
            outcome: self.outcome(),
            width: self.map().width(),
            height: self.map().height(),
            tiles: self.map().tiles().to_vec(),
            units: self.units().iter().map(UnitView::from).collect(),
            effects: self.effects().to_vec(),
            state_hash: self.state_hash(),
        }
    }
}

impl SessionSnapshot {
    /// Tile at `pos`.
    #[must_use]
    pub fn tile(&self, pos: GridPos) -> Option<&Tile> {
        if pos.x < 0 || pos.y < 0 || pos.x as u32 >= self.width || pos.y as u32 >= self.height {
            return None;
        }
        self.tiles
            .get(pos.y as usize * self.width as usize + pos.x as usize)
    }

    /// Living units of `team`.
    pub fn living(&self, team: Team) -> impl Iterator<Item = &UnitView> {
        self.units
            .iter()
            .filter(move |u| u.is_alive && u.team == team)
    }
}
