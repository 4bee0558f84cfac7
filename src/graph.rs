use itertools::Itertools;
use log::{debug, warn};
use std::fmt;
use std::sync::mpsc;
use std::thread;

use crate::grid::{Grid, GridObject, ObjectId};
use crate::pathfinding::{Distance, Occupancy, Pathfinder, UNREACHABLE,
                         manhattan_distance};

/// Set of object ids as a bitmask. Object ids are bounded by `MAX_OBJECTS`.
#[derive(Default, PartialEq, Eq, Hash, Copy, Clone)]
pub struct VisitedSet(u64);

impl VisitedSet {
    pub const EMPTY: VisitedSet = VisitedSet(0);

    #[inline]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.0 & (1u64 << id) != 0
    }

    #[inline]
    pub fn with(&self, id: ObjectId) -> Self {
        VisitedSet(self.0 | (1u64 << id))
    }

    #[inline]
    pub fn without(&self, id: ObjectId) -> Self {
        VisitedSet(self.0 & !(1u64 << id))
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item=ObjectId> + '_ {
        (0..64u8).filter(move |&id| self.contains(id))
    }
}

impl FromIterator<ObjectId> for VisitedSet {
    fn from_iter<I: IntoIterator<Item=ObjectId>>(iter: I) -> Self {
        iter.into_iter().fold(VisitedSet::EMPTY, |set, id| set.with(id))
    }
}

impl fmt::Debug for VisitedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Complete graph over the objects of a grid that are not in a visited set.
/// Edge costs are the shortest walks between two objects that do not step on
/// any other remaining object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectGraph {
    visited: VisitedSet,
    // Remaining objects, in id order.
    vertices: Vec<ObjectId>,
    num_objects: usize,
    // adjacency[from * num_objects + to]. Rows and columns of visited objects
    // are UNREACHABLE.
    adjacency: Vec<Distance>,
}

type Pair<'g> = (&'g GridObject, &'g GridObject);

// Distance for a pair, with every other remaining object blocking the way.
// 'occupancy' must have both endpoints blocked and is restored on return.
fn pair_distance(
    pathfinder: &mut Pathfinder, occupancy: &mut Occupancy,
    (from, to): Pair<'_>
    ) -> Distance {
    occupancy.set_blocked(&from.tile, false);
    occupancy.set_blocked(&to.tile, false);
    let distance = pathfinder.distance(&from.tile, &to.tile, occupancy,
                                       &manhattan_distance);
    occupancy.set_blocked(&from.tile, true);
    occupancy.set_blocked(&to.tile, true);
    distance
}

fn pair_distances_sequential(
    pairs: &[Pair<'_>], mut occupancy: Occupancy
    ) -> Vec<Distance> {
    let mut pathfinder = Pathfinder::new();
    pairs.iter()
        .map(|&pair| pair_distance(&mut pathfinder, &mut occupancy, pair))
        .collect()
}

fn pair_distances_parallel(
    pairs: &[Pair<'_>], occupancy: Occupancy, threads: usize
    ) -> Vec<Distance> {
    let (tx, rx) = mpsc::channel();
    thread::scope(|scope| {
        for i in 0..threads {
            let tx = tx.clone();
            let mut occupancy = occupancy.clone();
            scope.spawn(move || {
                let mut pathfinder = Pathfinder::new();
                for j in (i..pairs.len()).step_by(threads) {
                    let distance = pair_distance(&mut pathfinder,
                                                 &mut occupancy, pairs[j]);
                    if tx.send((j, distance)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(tx);  // Drop the last sender so the receiver drains and stops.
    let mut distances = vec![UNREACHABLE; pairs.len()];
    while let Ok((j, distance)) = rx.recv() {
        distances[j] = distance;
    }
    distances
}

impl ObjectGraph {
    /// Builds the graph for `grid` as it looks once the `visited` objects are
    /// gone. Visited tiles are walkable, the grid itself is left untouched.
    /// With `threads > 1`, pairs are split across scoped worker threads.
    pub fn build(grid: &Grid, visited: VisitedSet, threads: usize) -> Self {
        let num_objects = grid.objects().len();
        let remaining: Vec<&GridObject> = grid.objects().iter()
            .filter(|object| !visited.contains(object.id))
            .collect();

        let mut occupancy = Occupancy::walls(grid);
        for object in &remaining {
            occupancy.set_blocked(&object.tile, true);
        }

        let pairs: Vec<Pair<'_>> = remaining.iter().copied()
            .tuple_combinations()
            .collect();
        let distances = if threads > 1 && pairs.len() > 1 {
            pair_distances_parallel(&pairs, occupancy,
                                    usize::min(threads, pairs.len()))
        } else {
            pair_distances_sequential(&pairs, occupancy)
        };

        let mut adjacency = vec![UNREACHABLE; num_objects * num_objects];
        for object in &remaining {
            let id = object.id as usize;
            adjacency[id * num_objects + id] = 0;
        }
        for (&(from, to), &distance) in pairs.iter().zip(&distances) {
            if distance == UNREACHABLE {
                // Later graphs repeat the same pairs, warn once per grid.
                if visited.is_empty() {
                    warn!("No path between {} and {}", from, to);
                } else {
                    debug!("No path between {} and {} (visited: {:?})",
                           from, to, visited);
                }
            }
            let (a, b) = (from.id as usize, to.id as usize);
            adjacency[a * num_objects + b] = distance;
            adjacency[b * num_objects + a] = distance;
        }

        debug!("Graph for visited {:?}: {} vertices, {} pairs",
               visited, remaining.len(), pairs.len());
        ObjectGraph {
            visited,
            vertices: remaining.iter().map(|object| object.id).collect(),
            num_objects,
            adjacency,
        }
    }

    #[inline]
    pub fn cost(&self, from: ObjectId, to: ObjectId) -> Distance {
        self.adjacency[from as usize * self.num_objects + to as usize]
    }

    pub fn visited(&self) -> VisitedSet {
        self.visited
    }

    pub fn vertices(&self) -> &[ObjectId] {
        &self.vertices
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        (id as usize) < self.num_objects && !self.visited.contains(id)
    }

    #[inline]
    pub fn others(&self, from: ObjectId) -> impl Iterator<Item=ObjectId> + '_ {
        self.vertices.iter().copied().filter(move |&v| v != from)
    }
}
