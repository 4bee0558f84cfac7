use arrayvec::ArrayVec;
use priority_queue::PriorityQueue;
use rustc_hash::{FxHashMap};
use std::cmp::Reverse;

use crate::grid::{Content, Grid, Tile};

pub type Distance = u32;

/// Sentinel distance for pairs of tiles with no route between them.
pub const UNREACHABLE: Distance = Distance::MAX;

pub fn manhattan_distance(a: &Tile, b: &Tile) -> Distance {
    (a.x as i32 - b.x as i32).unsigned_abs() +
        (a.y as i32 - b.y as i32).unsigned_abs()
}

/// Heuristic that turns A* into Dijkstra. Used to cross-check results.
pub fn zero_heuristic(_: &Tile, _: &Tile) -> Distance {
    0
}

type Neighbors = ArrayVec<Tile, 4>;

/// Binary occupancy grid, true = blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupancy {
    width: usize,
    height: usize,
    // blocked[y * width + x]
    blocked: Vec<bool>,
}

impl Occupancy {
    pub fn new(width: usize, height: usize) -> Self {
        Occupancy { width, height, blocked: vec![false; width * height] }
    }

    /// Occupancy where only the grid's walls are blocked.
    pub fn walls(grid: &Grid) -> Self {
        let mut occupancy = Occupancy::new(grid.width(), grid.height());
        for (tile, content) in grid.tiles() {
            if content == Content::Wall {
                occupancy.set_blocked(&tile, true);
            }
        }
        occupancy
    }

    #[inline]
    fn index(&self, tile: &Tile) -> Option<usize> {
        let (x, y) = (tile.x as usize, tile.y as usize);
        if x < self.width && y < self.height {
            Some(y * self.width + x)
        } else {
            None
        }
    }

    /// Out of bounds tiles count as blocked.
    #[inline]
    pub fn is_blocked(&self, tile: &Tile) -> bool {
        match self.index(tile) {
            Some(i) => self.blocked[i],
            None => true,
        }
    }

    /// No-op for out of bounds tiles.
    pub fn set_blocked(&mut self, tile: &Tile, blocked: bool) {
        if let Some(i) = self.index(tile) {
            self.blocked[i] = blocked;
        }
    }

    pub fn neighbors(&self, tile: &Tile) -> Neighbors {
        const DELTAS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];
        DELTAS.iter().filter_map(|&(dx, dy)| {
            if tile.x == 0 && dx < 0 || tile.y == 0 && dy < 0 {
                None
            } else {
                let neighbor = Tile {
                    x: (tile.x as i32 + dx) as u16,
                    y: (tile.y as i32 + dy) as u16,
                };
                if self.is_blocked(&neighbor) { None } else { Some(neighbor) }
            }
        }).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub steps: Vec<Tile>,
    pub cost: Distance,
}

impl Path {
    pub fn unreachable() -> Self {
        Path { steps: Vec::new(), cost: UNREACHABLE }
    }

    pub fn is_reachable(&self) -> bool {
        self.cost != UNREACHABLE
    }
}

type CameFrom = FxHashMap<Tile, Tile>;
type CostSoFar = FxHashMap<Tile, Distance>;

/// A* over four-directional unit-cost moves. Keeps its bookkeeping maps
/// around so repeated searches reuse the allocations.
#[derive(Default)]
pub struct Pathfinder {
    came_from: CameFrom,
    cost_so_far: CostSoFar,
}

impl Pathfinder {
    pub fn new() -> Self {
        Pathfinder::default()
    }

    fn reconstruct_path(&self, start: &Tile, goal: &Tile) -> Path {
        let cost = match self.cost_so_far.get(goal) {
            Some(&cost) => cost,
            None => return Path::unreachable(),
        };
        let mut steps = Vec::with_capacity(cost as usize + 1);
        let mut current = *goal;
        while current != *start {
            steps.push(current);
            current = self.came_from[&current];
        }
        steps.push(*start);
        steps.reverse();
        Path { steps, cost }
    }

    // Returns whether the goal was reached.
    fn a_star_search<H>(
        &mut self, start: &Tile, goal: &Tile, occupancy: &Occupancy,
        heuristic: &H
        ) -> bool
    where
        H: Fn(&Tile, &Tile) -> Distance,
    {
        self.cost_so_far.clear();
        self.came_from.clear();

        // Lowest f first. Among equal f, prefer the larger g (closer to the
        // goal), which keeps the expansion order deterministic.
        let mut frontier: PriorityQueue<Tile, (Reverse<Distance>, Distance)> =
            PriorityQueue::new();
        frontier.push(*start, (Reverse(heuristic(start, goal)), 0));
        self.came_from.insert(*start, *start);
        self.cost_so_far.insert(*start, 0);

        while let Some((current, _)) = frontier.pop() {
            if current == *goal {
                return true;
            }
            let cost = self.cost_so_far[&current];
            for next in occupancy.neighbors(&current) {
                let new_cost = cost + 1;
                let improves = match self.cost_so_far.get(&next) {
                    Some(&old_cost) => new_cost < old_cost,
                    None => true,
                };
                if improves {
                    self.cost_so_far.insert(next, new_cost);
                    self.came_from.insert(next, current);
                    let f = new_cost + heuristic(&next, goal);
                    frontier.push(next, (Reverse(f), new_cost));
                }
            }
        }
        false
    }

    /// Shortest path between two tiles. The path is `Path::unreachable()`
    /// when no route exists.
    pub fn shortest_path<H>(
        &mut self, start: &Tile, goal: &Tile, occupancy: &Occupancy,
        heuristic: &H
        ) -> Path
    where
        H: Fn(&Tile, &Tile) -> Distance,
    {
        if self.a_star_search(start, goal, occupancy, heuristic) {
            self.reconstruct_path(start, goal)
        } else {
            Path::unreachable()
        }
    }

    pub fn distance<H>(
        &mut self, start: &Tile, goal: &Tile, occupancy: &Occupancy,
        heuristic: &H
        ) -> Distance
    where
        H: Fn(&Tile, &Tile) -> Distance,
    {
        if self.a_star_search(start, goal, occupancy, heuristic) {
            self.cost_so_far[goal]
        } else {
            UNREACHABLE
        }
    }
}
