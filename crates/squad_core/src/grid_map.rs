//! Tile grid, procedural room-and-corridor generation, line of sight and
//! field of view.
//!
//! The map owns every [`Tile`]. Walls and cover are fixed after generation;
//! visibility flags are rebuilt on each FOV refresh while the explored flag
//! only ever accumulates.

use std::collections::{HashMap, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::MapConfig;
use crate::error::{GameError, Result};
use crate::math::{lerp_round, GridPos};
use crate::unit::{Posture, Unit};

/// Living units a sight line can run into, keyed by cell.
pub type Occupants = HashMap<GridPos, Posture>;

/// A single map cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    /// Cell coordinate.
    pub position: GridPos,
    /// Full-height obstacle: blocks movement and sight.
    pub is_wall: bool,
    /// Low obstacle: blocks movement, blocks sight for prone shooters.
    pub is_cover: bool,
    /// Seen by the player squad on the last FOV refresh.
    pub is_visible: bool,
    /// Seen by the player squad at any point.
    pub is_explored: bool,
}

impl Tile {
    /// Create a wall tile.
    #[must_use]
    pub const fn wall(position: GridPos) -> Self {
        Self {
            position,
            is_wall: true,
            is_cover: false,
            is_visible: false,
            is_explored: false,
        }
    }

    /// Create an open floor tile.
    #[must_use]
    pub const fn floor(position: GridPos) -> Self {
        Self {
            position,
            is_wall: false,
            is_cover: false,
            is_visible: false,
            is_explored: false,
        }
    }

    /// True if units can stand on and path through this tile.
    #[must_use]
    pub const fn is_walkable(&self) -> bool {
        !self.is_wall && !self.is_cover
    }
}

/// Axis-aligned rectangular room. `x..x + width` by `y..y + height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Room {
    /// Left column.
    pub x: i32,
    /// Top row.
    pub y: i32,
    /// Width in tiles.
    pub width: i32,
    /// Height in tiles.
    pub height: i32,
}

impl Room {
    /// Create a room.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Centre cell (rounded towards the top-left).
    #[must_use]
    pub const fn center(&self) -> GridPos {
        GridPos::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Grow the room by `margin` on every side.
    #[must_use]
    pub const fn inflated(&self, margin: i32) -> Self {
        Self::new(
            self.x - margin,
            self.y - margin,
            self.width + 2 * margin,
            self.height + 2 * margin,
        )
    }

    /// True if the two rectangles share at least one cell.
    #[must_use]
    pub const fn intersects(&self, other: &Self) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }

    /// Every cell inside the room.
    pub fn cells(&self) -> impl Iterator<Item = GridPos> + '_ {
        (self.x..self.x + self.width)
            .flat_map(move |x| (self.y..self.y + self.height).map(move |y| GridPos::new(x, y)))
    }
}

/// The tactical map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridMap {
    width: u32,
    height: u32,
    /// Row-major tile storage.
    tiles: Vec<Tile>,
    rooms: Vec<Room>,
    spawn_points: Vec<GridPos>,
}

impl GridMap {
    /// Create a map that is solid wall everywhere.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero.
    #[must_use]
    pub fn filled(width: u32, height: u32) -> Self {
        Self::build(width, height, Tile::wall)
    }

    /// Create a map that is open floor everywhere.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero.
    #[must_use]
    pub fn open(width: u32, height: u32) -> Self {
        Self::build(width, height, Tile::floor)
    }

    fn build(width: u32, height: u32, make: fn(GridPos) -> Tile) -> Self {
        assert!(width > 0, "GridMap width must be positive");
        assert!(height > 0, "GridMap height must be positive");
        let tiles = (0..height as i32)
            .flat_map(|y| (0..width as i32).map(move |x| make(GridPos::new(x, y))))
            .collect();
        Self {
            width,
            height,
            tiles,
            rooms: Vec::new(),
            spawn_points: Vec::new(),
        }
    }

    /// Builder method to replace the spawn points.
    #[must_use]
    pub fn with_spawn_points(mut self, spawn_points: Vec<GridPos>) -> Self {
        self.spawn_points = spawn_points;
        self
    }

    /// Build a map from an ASCII sketch.
    ///
    /// `#` is wall, `+` is cover, anything else is floor; `S` additionally
    /// registers a spawn point. Rows may differ in length; missing cells are
    /// wall.
    ///
    /// # Panics
    ///
    /// Panics if the sketch is empty.
    #[must_use]
    pub fn from_ascii(sketch: &str) -> Self {
        let rows: Vec<&str> = sketch
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let height = rows.len() as u32;
        let width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0) as u32;
        let mut map = Self::filled(width, height);
        for (y, row) in rows.iter().enumerate() {
            for (x, ch) in row.chars().enumerate() {
                let pos = GridPos::new(x as i32, y as i32);
                if let Some(tile) = map.tile_mut(pos) {
                    tile.is_wall = ch == '#';
                    tile.is_cover = ch == '+';
                }
                if ch == 'S' {
                    map.spawn_points.push(pos);
                }
            }
        }
        map
    }

    /// Generate a room-and-corridor map.
    ///
    /// May yield fewer spawn points than `config.room_attempts` when rooms
    /// collide; see [`GridMap::generate_with_retries`].
    pub fn generate<R: Rng + ?Sized>(config: &MapConfig, rng: &mut R) -> Self {
        let mut map = Self::filled(config.width, config.height);
        for _ in 0..config.room_attempts {
            let room = random_room(config, rng);
            if map.rooms.iter().any(|other| room.intersects(&other.inflated(1))) {
                continue;
            }
            map.carve_room(&room, config.cover_percent, rng);
            map.rooms.push(room);
        }
        // Tunnels go in after every room so no room can drop cover on them.
        for pair in 0..map.rooms.len().saturating_sub(1) {
            let (from, to) = (map.rooms[pair].center(), map.rooms[pair + 1].center());
            map.carve_tunnel(from, to, rng.gen_bool(0.5));
        }
        map.spawn_points = map.rooms.iter().map(Room::center).collect();
        map
    }

    /// Generate until the map offers at least `required` spawn points.
    ///
    /// Retries up to `config.max_generation_attempts` times. If every attempt
    /// comes up short, extra rooms are force-carved into the last attempt;
    /// if that still is not enough the configuration cannot be satisfied.
    pub fn generate_with_retries<R: Rng + ?Sized>(
        config: &MapConfig,
        required: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let mut last = None;
        for attempt in 1..=config.max_generation_attempts {
            let map = Self::generate(config, rng);
            if map.spawn_points.len() >= required {
                tracing::debug!(attempt, rooms = map.rooms.len(), "Map generated");
                return Ok(map);
            }
            tracing::debug!(
                attempt,
                found = map.spawn_points.len(),
                required,
                "Map rejected: too few rooms"
            );
            last = Some(map);
        }

        let Some(mut map) = last else {
            return Err(GameError::InvalidConfig(
                "max_generation_attempts must be positive".into(),
            ));
        };
        map.force_carve_rooms(config, required, rng);
        if map.spawn_points.len() >= required {
            tracing::warn!(
                rooms = map.rooms.len(),
                "Map completed with force-carved rooms"
            );
            return Ok(map);
        }
        Err(GameError::MapGeneration {
            attempts: config.max_generation_attempts,
            required,
            found: map.spawn_points.len(),
        })
    }

    /// Add rooms with a relaxed overlap test (touching allowed) until
    /// `required` spawn points exist or the attempt budget runs out.
    /// Forced rooms get no cover so they cannot cut earlier tunnels.
    fn force_carve_rooms<R: Rng + ?Sized>(&mut self, config: &MapConfig, required: usize, rng: &mut R) {
        for _ in 0..config.room_attempts.saturating_mul(4) {
            if self.rooms.len() >= required {
                break;
            }
            let room = random_room(config, rng);
            if self.rooms.iter().any(|other| room.intersects(other)) {
                continue;
            }
            self.carve_room(&room, 0, rng);
            if let Some(prev) = self.rooms.last().map(Room::center) {
                self.carve_tunnel(prev, room.center(), rng.gen_bool(0.5));
            }
            self.rooms.push(room);
        }
        self.spawn_points = self.rooms.iter().map(Room::center).collect();
    }

    fn carve_room<R: Rng + ?Sized>(&mut self, room: &Room, cover_percent: u32, rng: &mut R) {
        for cell in room.cells() {
            let cover = cover_percent > 0 && rng.gen_ratio(cover_percent.min(100), 100);
            if let Some(tile) = self.tile_mut(cell) {
                tile.is_wall = false;
                tile.is_cover = cover;
            }
        }
    }

    /// Carve an L-shaped tunnel, clearing walls and cover.
    fn carve_tunnel(&mut self, from: GridPos, to: GridPos, horizontal_first: bool) {
        let corner = if horizontal_first {
            GridPos::new(to.x, from.y)
        } else {
            GridPos::new(from.x, to.y)
        };
        self.clear_segment(from, corner);
        self.clear_segment(corner, to);
    }

    /// Clear an axis-aligned segment (inclusive).
    fn clear_segment(&mut self, a: GridPos, b: GridPos) {
        for x in a.x.min(b.x)..=a.x.max(b.x) {
            for y in a.y.min(b.y)..=a.y.max(b.y) {
                if let Some(tile) = self.tile_mut(GridPos::new(x, y)) {
                    tile.is_wall = false;
                    tile.is_cover = false;
                }
            }
        }
    }

    /// Map width in tiles.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Map height in tiles.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// All tiles, row-major.
    #[must_use]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Rooms placed during generation.
    #[must_use]
    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    /// Room centres, in placement order.
    #[must_use]
    pub fn spawn_points(&self) -> &[GridPos] {
        &self.spawn_points
    }

    /// Check if a coordinate is inside the map.
    #[must_use]
    pub const fn is_in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    #[inline]
    fn index(&self, pos: GridPos) -> Option<usize> {
        self.is_in_bounds(pos)
            .then(|| (pos.y as usize) * (self.width as usize) + (pos.x as usize))
    }

    /// Tile at `pos`, `None` if out of bounds.
    #[must_use]
    pub fn tile(&self, pos: GridPos) -> Option<&Tile> {
        self.index(pos).map(|i| &self.tiles[i])
    }

    /// Mutable tile at `pos`, `None` if out of bounds.
    pub fn tile_mut(&mut self, pos: GridPos) -> Option<&mut Tile> {
        self.index(pos).map(move |i| &mut self.tiles[i])
    }

    /// True if `pos` is in bounds, not wall and not cover.
    #[must_use]
    pub fn is_walkable(&self, pos: GridPos) -> bool {
        self.tile(pos).is_some_and(Tile::is_walkable)
    }

    /// True if `pos` is in bounds and a wall.
    #[must_use]
    pub fn is_wall(&self, pos: GridPos) -> bool {
        self.tile(pos).is_some_and(|t| t.is_wall)
    }

    /// True if `pos` is in bounds and cover.
    #[must_use]
    pub fn is_cover(&self, pos: GridPos) -> bool {
        self.tile(pos).is_some_and(|t| t.is_cover)
    }

    /// True if the player squad currently sees `pos`.
    #[must_use]
    pub fn is_visible(&self, pos: GridPos) -> bool {
        self.tile(pos).is_some_and(|t| t.is_visible)
    }

    /// Trace a sight line from `origin` towards `target`.
    ///
    /// Returns the cells visited up to and including the first blocking cell.
    /// A cell blocks when it is a wall, when it is cover and the shooter is
    /// prone, or when a living unit stands on it (unless that unit is prone
    /// in cover). The origin and target cells never block. The line has sight
    /// to `target` iff its last cell is `target`.
    #[must_use]
    pub fn line_of_sight(
        &self,
        origin: GridPos,
        posture: Posture,
        target: GridPos,
        occupants: &Occupants,
    ) -> Vec<GridPos> {
        let steps = origin.x.abs_diff(target.x).max(origin.y.abs_diff(target.y)) as i32;
        if steps == 0 {
            return vec![origin];
        }

        let mut line = Vec::with_capacity(steps as usize + 1);
        for i in 0..=steps {
            let cell = GridPos::new(
                lerp_round(origin.x, target.x, i, steps),
                lerp_round(origin.y, target.y, i, steps),
            );
            let Some(tile) = self.tile(cell) else {
                break;
            };
            line.push(cell);
            if cell == origin || cell == target {
                continue;
            }
            if blocks_sight(tile, posture, occupants.get(&cell).copied()) {
                break;
            }
        }
        line
    }

    /// True if an unobstructed line runs from `origin` to `target`.
    #[must_use]
    pub fn has_line_of_sight(
        &self,
        origin: GridPos,
        posture: Posture,
        target: GridPos,
        occupants: &Occupants,
    ) -> bool {
        self.line_of_sight(origin, posture, target, occupants)
            .last()
            .is_some_and(|&cell| cell == target)
    }

    /// Cells seen by the living `viewers` within `radius`.
    ///
    /// Other bodies never block vision; only walls, and cover for prone
    /// viewers, do.
    #[must_use]
    pub fn visible_cells<'a, I>(&self, viewers: I, radius: u32) -> HashSet<GridPos>
    where
        I: IntoIterator<Item = &'a Unit>,
    {
        let r = radius as i32;
        let nobody = Occupants::new();
        let mut visible = HashSet::new();
        for unit in viewers.into_iter().filter(|u| u.is_alive) {
            let origin = unit.position;
            for x in origin.x - r..=origin.x + r {
                for y in origin.y - r..=origin.y + r {
                    let cell = GridPos::new(x, y);
                    if !self.is_in_bounds(cell) || !origin.within_radius(cell, radius) {
                        continue;
                    }
                    let line = self.line_of_sight(origin, unit.posture, cell, &nobody);
                    if line.last() == Some(&cell) {
                        visible.extend(line);
                    }
                }
            }
        }
        visible
    }

    /// Rebuild the visibility flags from `viewers`, accumulating explored tiles.
    pub fn update_fov<'a, I>(&mut self, viewers: I, radius: u32)
    where
        I: IntoIterator<Item = &'a Unit>,
    {
        let visible = self.visible_cells(viewers, radius);
        self.apply_visibility(&visible);
    }

    /// Replace the visibility flags with `visible`, accumulating explored tiles.
    pub fn apply_visibility(&mut self, visible: &HashSet<GridPos>) {
        for tile in &mut self.tiles {
            tile.is_visible = visible.contains(&tile.position);
            tile.is_explored |= tile.is_visible;
        }
    }
}

fn blocks_sight(tile: &Tile, shooter: Posture, occupant: Option<Posture>) -> bool {
    if tile.is_wall {
        return true;
    }
    if tile.is_cover && shooter == Posture::Prone {
        return true;
    }
    match occupant {
        Some(Posture::Prone) if tile.is_cover => false,
        Some(_) => true,
        None => false,
    }
}

fn random_room<R: Rng + ?Sized>(config: &MapConfig, rng: &mut R) -> Room {
    let w = rng.gen_range(config.min_room_size..=config.max_room_size) as i32;
    let h = rng.gen_range(config.min_room_size..=config.max_room_size) as i32;
    let x = rng.gen_range(1..=(config.width as i32 - w - 1));
    let y = rng.gen_range(1..=(config.height as i32 - h - 1));
    Room::new(x, y, w, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{Team, UnitId};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn unit_at(x: i32, y: i32) -> Unit {
        Unit::new(UnitId(0), Team::Player, GridPos::new(x, y), 100, 10)
    }

    #[test]
    fn test_generate_places_rooms_inside_border() {
        let config = MapConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let map = GridMap::generate(&config, &mut rng);

        assert_eq!(map.tiles().len(), 50 * 40);
        assert!(!map.rooms().is_empty());
        assert_eq!(map.spawn_points().len(), map.rooms().len());
        for x in 0..50 {
            assert!(map.is_wall(GridPos::new(x, 0)));
            assert!(map.is_wall(GridPos::new(x, 39)));
        }
    }

    #[test]
    fn test_rooms_never_touch() {
        let config = MapConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let map = GridMap::generate(&config, &mut rng);
        for (i, a) in map.rooms().iter().enumerate() {
            for b in &map.rooms()[i + 1..] {
                assert!(!a.intersects(&b.inflated(1)));
            }
        }
    }

    #[test]
    fn test_spawn_points_are_open_floor() {
        let config = MapConfig::default().with_cover_percent(50);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let map = GridMap::generate(&config, &mut rng);
        if map.spawn_points().len() > 1 {
            for &spawn in map.spawn_points() {
                assert!(map.is_walkable(spawn), "spawn {spawn} should be on a tunnel");
            }
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let config = MapConfig::default();
        let a = GridMap::generate(&config, &mut ChaCha8Rng::seed_from_u64(42));
        let b = GridMap::generate(&config, &mut ChaCha8Rng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_retries_satisfy_requirement() {
        let config = MapConfig::small();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let map = GridMap::generate_with_retries(&config, 3, &mut rng).unwrap();
        assert!(map.spawn_points().len() >= 3);
    }

    #[test]
    fn test_impossible_requirement_is_config_error() {
        let config = MapConfig {
            width: 12,
            height: 12,
            room_attempts: 4,
            max_generation_attempts: 2,
            ..MapConfig::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let err = GridMap::generate_with_retries(&config, 20, &mut rng).unwrap_err();
        assert!(matches!(err, GameError::MapGeneration { required: 20, .. }));
    }

    #[test]
    fn test_from_ascii() {
        let map = GridMap::from_ascii(
            "
            #####
            #.+S#
            #####
            ",
        );
        assert_eq!(map.width(), 5);
        assert_eq!(map.height(), 3);
        assert!(map.is_wall(GridPos::new(0, 0)));
        assert!(map.is_cover(GridPos::new(2, 1)));
        assert!(map.is_walkable(GridPos::new(1, 1)));
        assert_eq!(map.spawn_points(), &[GridPos::new(3, 1)]);
    }

    #[test]
    fn test_line_of_sight_clear() {
        let map = GridMap::open(10, 10);
        let line = map.line_of_sight(
            GridPos::new(0, 0),
            Posture::Standing,
            GridPos::new(4, 2),
            &Occupants::new(),
        );
        assert_eq!(line.first(), Some(&GridPos::new(0, 0)));
        assert_eq!(line.last(), Some(&GridPos::new(4, 2)));
        assert_eq!(line.len(), 5);
    }

    #[test]
    fn test_wall_blocks_and_is_included() {
        let mut map = GridMap::open(10, 3);
        map.tile_mut(GridPos::new(3, 1)).unwrap().is_wall = true;
        let line = map.line_of_sight(
            GridPos::new(0, 1),
            Posture::Standing,
            GridPos::new(6, 1),
            &Occupants::new(),
        );
        assert_eq!(line.last(), Some(&GridPos::new(3, 1)));
        assert_eq!(line.len(), 4);
    }

    #[test]
    fn test_cover_blocks_only_prone_shooter() {
        let mut map = GridMap::open(10, 3);
        map.tile_mut(GridPos::new(3, 1)).unwrap().is_cover = true;
        let (from, to) = (GridPos::new(0, 1), GridPos::new(6, 1));
        let nobody = Occupants::new();
        assert!(map.has_line_of_sight(from, Posture::Standing, to, &nobody));
        assert!(!map.has_line_of_sight(from, Posture::Prone, to, &nobody));
    }

    #[test]
    fn test_prone_shooter_on_cover_sees_out() {
        let mut map = GridMap::open(10, 3);
        map.tile_mut(GridPos::new(0, 1)).unwrap().is_cover = true;
        map.tile_mut(GridPos::new(6, 1)).unwrap().is_cover = true;
        let nobody = Occupants::new();
        assert!(map.has_line_of_sight(
            GridPos::new(0, 1),
            Posture::Prone,
            GridPos::new(6, 1),
            &nobody
        ));
    }

    #[test]
    fn test_units_block_unless_prone_in_cover() {
        let mut map = GridMap::open(10, 3);
        let (from, to) = (GridPos::new(0, 1), GridPos::new(6, 1));
        let blocker = GridPos::new(3, 1);

        let mut occupants = Occupants::new();
        occupants.insert(blocker, Posture::Standing);
        assert!(!map.has_line_of_sight(from, Posture::Standing, to, &occupants));

        // Prone on open floor still blocks.
        occupants.insert(blocker, Posture::Prone);
        assert!(!map.has_line_of_sight(from, Posture::Standing, to, &occupants));

        // Prone in cover lets the shot pass over.
        map.tile_mut(blocker).unwrap().is_cover = true;
        assert!(map.has_line_of_sight(from, Posture::Standing, to, &occupants));
    }

    #[test]
    fn test_occupied_target_never_blocks() {
        let map = GridMap::open(10, 3);
        let to = GridPos::new(6, 1);
        let mut occupants = Occupants::new();
        occupants.insert(to, Posture::Standing);
        assert!(map.has_line_of_sight(GridPos::new(0, 1), Posture::Standing, to, &occupants));
    }

    #[test]
    fn test_zero_length_line() {
        let map = GridMap::open(3, 3);
        let c = GridPos::new(1, 1);
        assert_eq!(
            map.line_of_sight(c, Posture::Standing, c, &Occupants::new()),
            vec![c]
        );
    }

    #[test]
    fn test_fov_respects_radius_and_walls() {
        let mut map = GridMap::open(20, 5);
        for y in 0..5 {
            map.tile_mut(GridPos::new(5, y)).unwrap().is_wall = true;
        }
        let viewer = unit_at(2, 2);
        map.update_fov([&viewer], 8);

        assert!(map.is_visible(GridPos::new(2, 2)));
        assert!(map.is_visible(GridPos::new(4, 2)));
        // The wall face itself is seen.
        assert!(map.is_visible(GridPos::new(5, 2)));
        // Behind the wall is not.
        assert!(!map.is_visible(GridPos::new(7, 2)));
    }

    #[test]
    fn test_explored_is_monotonic() {
        let mut map = GridMap::open(30, 3);
        let mut viewer = unit_at(1, 1);
        map.update_fov([&viewer], 4);
        assert!(map.tile(GridPos::new(4, 1)).unwrap().is_explored);

        viewer.position = GridPos::new(25, 1);
        map.update_fov([&viewer], 4);
        let tile = map.tile(GridPos::new(4, 1)).unwrap();
        assert!(!tile.is_visible);
        assert!(tile.is_explored);
    }

    #[test]
    fn test_dead_viewers_see_nothing() {
        let map = GridMap::open(10, 10);
        let mut viewer = unit_at(5, 5);
        viewer.take_damage(1000);
        assert!(map.visible_cells([&viewer], 5).is_empty());
    }
}
