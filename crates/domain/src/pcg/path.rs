//! Grid pathfinding and connectivity: A*, Dijkstra, flood fill.
//!
//! All functions work over a caller-supplied walkability (or cost)
//! closure so they serve both the live world grid and half-built PCG
//! levels. Movement is 4-connected. Tie-breaking is by insertion order,
//! which makes results deterministic for a given grid.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

/// The outcome of a path query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResult {
    pub found: bool,
    /// Tile sequence from start to goal inclusive; empty when not found
    pub path: Vec<(i32, i32)>,
    /// Total movement cost (tiles moved for uniform-cost queries)
    pub cost: u32,
}

impl PathResult {
    fn not_found() -> Self {
        Self {
            found: false,
            path: Vec::new(),
            cost: 0,
        }
    }
}

const NEIGHBOURS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

fn manhattan(a: (i32, i32), b: (i32, i32)) -> u32 {
    a.0.abs_diff(b.0) + a.1.abs_diff(b.1)
}

fn in_bounds(width: u32, height: u32, tile: (i32, i32)) -> bool {
    tile.0 >= 0 && tile.1 >= 0 && tile.0 < width as i32 && tile.1 < height as i32
}

fn reconstruct(
    came_from: &HashMap<(i32, i32), (i32, i32)>,
    goal: (i32, i32),
    start: (i32, i32),
) -> Vec<(i32, i32)> {
    let mut path = vec![goal];
    let mut current = goal;
    while current != start {
        current = came_from[&current];
        path.push(current);
    }
    path.reverse();
    path
}

/// A* with the Manhattan heuristic over a uniform-cost 4-connected grid.
///
/// Returns the shortest path in tiles moved when one exists; otherwise
/// `found == false` and an empty path. The returned path never crosses
/// an unwalkable tile.
pub fn a_star<W>(
    width: u32,
    height: u32,
    walkable: W,
    start: (i32, i32),
    goal: (i32, i32),
) -> PathResult
where
    W: Fn(i32, i32) -> bool,
{
    if !in_bounds(width, height, start)
        || !in_bounds(width, height, goal)
        || !walkable(start.0, start.1)
        || !walkable(goal.0, goal.1)
    {
        return PathResult::not_found();
    }
    if start == goal {
        return PathResult {
            found: true,
            path: vec![start],
            cost: 0,
        };
    }

    // (f, insertion counter) orders the frontier; the counter breaks ties
    // deterministically in favour of earlier discoveries
    let mut open: BinaryHeap<Reverse<(u32, u64, (i32, i32))>> = BinaryHeap::new();
    let mut g_score: HashMap<(i32, i32), u32> = HashMap::new();
    let mut came_from: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
    let mut counter: u64 = 0;

    g_score.insert(start, 0);
    open.push(Reverse((manhattan(start, goal), counter, start)));

    while let Some(Reverse((_, _, current))) = open.pop() {
        if current == goal {
            let cost = g_score[&current];
            return PathResult {
                found: true,
                path: reconstruct(&came_from, goal, start),
                cost,
            };
        }
        let current_g = g_score[&current];

        for (dx, dy) in NEIGHBOURS {
            let next = (current.0 + dx, current.1 + dy);
            if !in_bounds(width, height, next) || !walkable(next.0, next.1) {
                continue;
            }
            let tentative = current_g + 1;
            if tentative < *g_score.get(&next).unwrap_or(&u32::MAX) {
                g_score.insert(next, tentative);
                came_from.insert(next, current);
                counter += 1;
                open.push(Reverse((tentative + manhattan(next, goal), counter, next)));
            }
        }
    }
    PathResult::not_found()
}

/// Dijkstra over a grid with non-uniform costs. `cost(x, y)` is the cost
/// of stepping onto a tile, or `None` for impassable.
pub fn dijkstra<C>(
    width: u32,
    height: u32,
    cost: C,
    start: (i32, i32),
    goal: (i32, i32),
) -> PathResult
where
    C: Fn(i32, i32) -> Option<u32>,
{
    if !in_bounds(width, height, start)
        || !in_bounds(width, height, goal)
        || cost(start.0, start.1).is_none()
        || cost(goal.0, goal.1).is_none()
    {
        return PathResult::not_found();
    }

    let mut open: BinaryHeap<Reverse<(u32, u64, (i32, i32))>> = BinaryHeap::new();
    let mut dist: HashMap<(i32, i32), u32> = HashMap::new();
    let mut came_from: HashMap<(i32, i32), (i32, i32)> = HashMap::new();
    let mut counter: u64 = 0;

    dist.insert(start, 0);
    open.push(Reverse((0, counter, start)));

    while let Some(Reverse((d, _, current))) = open.pop() {
        if current == goal {
            return PathResult {
                found: true,
                path: reconstruct(&came_from, goal, start),
                cost: d,
            };
        }
        if d > *dist.get(&current).unwrap_or(&u32::MAX) {
            continue;
        }
        for (dx, dy) in NEIGHBOURS {
            let next = (current.0 + dx, current.1 + dy);
            if !in_bounds(width, height, next) {
                continue;
            }
            let Some(step) = cost(next.0, next.1) else {
                continue;
            };
            let tentative = d + step;
            if tentative < *dist.get(&next).unwrap_or(&u32::MAX) {
                dist.insert(next, tentative);
                came_from.insert(next, current);
                counter += 1;
                open.push(Reverse((tentative, counter, next)));
            }
        }
    }
    PathResult::not_found()
}

/// The set of walkable tiles transitively 4-connected to `start`,
/// including `start` itself when walkable.
pub fn flood_fill<W>(width: u32, height: u32, walkable: W, start: (i32, i32)) -> HashSet<(i32, i32)>
where
    W: Fn(i32, i32) -> bool,
{
    let mut visited = HashSet::new();
    if !in_bounds(width, height, start) || !walkable(start.0, start.1) {
        return visited;
    }
    let mut queue = VecDeque::new();
    visited.insert(start);
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        for (dx, dy) in NEIGHBOURS {
            let next = (current.0 + dx, current.1 + dy);
            if in_bounds(width, height, next)
                && walkable(next.0, next.1)
                && visited.insert(next)
            {
                queue.push_back(next);
            }
        }
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::*;

    /// '#' walls, '.' floor
    fn grid(rows: &[&str]) -> (u32, u32, Vec<Vec<bool>>) {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let cells = rows
            .iter()
            .map(|row| row.chars().map(|c| c == '.').collect())
            .collect();
        (width, height, cells)
    }

    fn walkable_in(cells: &[Vec<bool>]) -> impl Fn(i32, i32) -> bool + '_ {
        move |x, y| cells[y as usize][x as usize]
    }

    #[test]
    fn test_a_star_straight_line() {
        let (w, h, cells) = grid(&["....", "....", "...."]);
        let result = a_star(w, h, walkable_in(&cells), (0, 0), (3, 0));
        assert!(result.found);
        assert_eq!(result.cost, 3);
        assert_eq!(result.path.len(), 4);
        assert_eq!(result.path[0], (0, 0));
        assert_eq!(result.path[3], (3, 0));
    }

    #[test]
    fn test_a_star_detours_around_wall() {
        let (w, h, cells) = grid(&[
            ".....",
            ".###.",
            ".....",
        ]);
        let result = a_star(w, h, walkable_in(&cells), (0, 1), (4, 1));
        assert!(result.found);
        // shortest detour: over or under the wall, 6 steps
        assert_eq!(result.cost, 6);
        for (x, y) in &result.path {
            assert!(cells[*y as usize][*x as usize], "path crossed a wall");
        }
    }

    #[test]
    fn test_a_star_no_path() {
        let (w, h, cells) = grid(&[
            "..#..",
            "..#..",
            "..#..",
        ]);
        let result = a_star(w, h, walkable_in(&cells), (0, 0), (4, 0));
        assert!(!result.found);
        assert!(result.path.is_empty());
    }

    #[test]
    fn test_a_star_same_start_and_goal() {
        let (w, h, cells) = grid(&["..", ".."]);
        let result = a_star(w, h, walkable_in(&cells), (1, 1), (1, 1));
        assert!(result.found);
        assert_eq!(result.cost, 0);
        assert_eq!(result.path, vec![(1, 1)]);
    }

    #[test]
    fn test_a_star_optimality_matches_bfs_cost() {
        let (w, h, cells) = grid(&[
            ".......",
            ".#.#.#.",
            ".#.#.#.",
            ".......",
        ]);
        let result = a_star(w, h, walkable_in(&cells), (0, 3), (6, 0));
        // BFS distance computed by flood-fill layering equals manhattan here
        assert!(result.found);
        assert_eq!(result.cost, 9);
    }

    #[test]
    fn test_dijkstra_prefers_cheap_tiles() {
        // middle row costs 5 per step, top row 1
        let cost = |x: i32, y: i32| -> Option<u32> {
            if !(0..5).contains(&x) || !(0..3).contains(&y) {
                return None;
            }
            Some(if y == 1 { 5 } else { 1 })
        };
        let result = dijkstra(5, 3, cost, (0, 1), (4, 1));
        assert!(result.found);
        // detour through the cheap row beats the direct expensive walk
        assert!(result.cost < 4 * 5);
    }

    #[test]
    fn test_flood_fill_exact_region() {
        let (w, h, cells) = grid(&[
            "..#..",
            "..#..",
            "#####",
            ".....",
        ]);
        let region = flood_fill(w, h, walkable_in(&cells), (0, 0));
        assert_eq!(region.len(), 4); // the 2x2 top-left pocket
        assert!(region.contains(&(1, 1)));
        assert!(!region.contains(&(3, 0)));
        assert!(!region.contains(&(0, 3)));
    }

    #[test]
    fn test_flood_fill_from_wall_is_empty() {
        let (w, h, cells) = grid(&["#.", ".."]);
        let region = flood_fill(w, h, walkable_in(&cells), (0, 0));
        assert!(region.is_empty());
    }
}
