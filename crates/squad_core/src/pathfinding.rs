//! Grid pathfinding using the A* algorithm.
//!
//! Four-directional movement with unit step cost and a Manhattan heuristic.
//! Walls and cover are impassable; callers add per-query obstacles (usually
//! other units) through an occupied set. Equal-cost frontiers are ordered by
//! coordinate so the same query always yields the same path.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::grid_map::GridMap;
use crate::math::GridPos;

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    pos: GridPos,
    /// f = g + h.
    f_score: u32,
    /// Prefer deeper nodes on equal f, then lower coordinates.
    h_score: u32,
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for lowest-f-first.
        other
            .f_score
            .cmp(&self.f_score)
            .then_with(|| other.h_score.cmp(&self.h_score))
            .then_with(|| other.tie_breaker.cmp(&self.tie_breaker))
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn tie_breaker(pos: GridPos) -> u64 {
    (u64::from(pos.y as u32) << 32) | u64::from(pos.x as u32)
}

/// Find a path from `start` to `end`.
///
/// The returned path begins with `start` and ends with `end`. It is empty
/// when `end` is in `occupied` or no route exists. `start` itself is never
/// treated as an obstacle.
#[must_use]
pub fn find_path(
    map: &GridMap,
    start: GridPos,
    end: GridPos,
    occupied: &HashSet<GridPos>,
) -> Vec<GridPos> {
    if occupied.contains(&end) || !map.is_walkable(end) || !map.is_in_bounds(start) {
        return Vec::new();
    }
    if start == end {
        return vec![start];
    }

    let mut open_set = BinaryHeap::new();
    let mut came_from: HashMap<GridPos, GridPos> = HashMap::new();
    let mut g_score: HashMap<GridPos, u32> = HashMap::new();

    let start_h = start.manhattan_distance(end);
    g_score.insert(start, 0);
    open_set.push(AStarNode {
        pos: start,
        f_score: start_h,
        h_score: start_h,
        tie_breaker: tie_breaker(start),
    });

    while let Some(current) = open_set.pop() {
        if current.pos == end {
            return reconstruct_path(&came_from, end);
        }

        let current_g = g_score.get(&current.pos).copied().unwrap_or(u32::MAX);
        // Stale heap entry.
        if current.f_score > current_g.saturating_add(current.h_score) {
            continue;
        }

        for next in current.pos.orthogonal_neighbors() {
            if !map.is_walkable(next) || occupied.contains(&next) {
                continue;
            }
            let tentative_g = current_g + 1;
            if tentative_g < g_score.get(&next).copied().unwrap_or(u32::MAX) {
                came_from.insert(next, current.pos);
                g_score.insert(next, tentative_g);
                let h = next.manhattan_distance(end);
                open_set.push(AStarNode {
                    pos: next,
                    f_score: tentative_g + h,
                    h_score: h,
                    tie_breaker: tie_breaker(next),
                });
            }
        }
    }

    Vec::new()
}

fn reconstruct_path(came_from: &HashMap<GridPos, GridPos>, end: GridPos) -> Vec<GridPos> {
    let mut path = vec![end];
    let mut current = end;
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}
