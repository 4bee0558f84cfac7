use log::{debug};
use rustc_hash::{FxHashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Instant};

use crate::graph::{ObjectGraph, VisitedSet};
use crate::grid::Grid;

type Graphs = FxHashMap<VisitedSet, Arc<ObjectGraph>>;

/// Memoizes object graphs by visited set for a single base grid.
///
/// Graphs are built outside of the lock: two threads asking for the same
/// unseen visited set may both build it, but only the first insert is kept
/// and both get that same graph back.
pub struct GraphCache<'g> {
    grid: &'g Grid,
    threads: usize,
    graphs: RwLock<Graphs>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<'g> GraphCache<'g> {
    /// `threads` is forwarded to `ObjectGraph::build`.
    pub fn new(grid: &'g Grid, threads: usize) -> Self {
        GraphCache {
            grid,
            threads,
            graphs: RwLock::new(Graphs::default()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, visited: VisitedSet) -> Arc<ObjectGraph> {
        // A poisoned lock still holds complete entries, inserts are atomic.
        let cached = self.graphs.read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&visited)
            .cloned();
        if let Some(graph) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return graph;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let graph = Arc::new(ObjectGraph::build(self.grid, visited,
                                                self.threads));
        debug!("Built graph for {:?} in {:?}", visited, start.elapsed());
        self.graphs.write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(visited)
            .or_insert(graph)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.graphs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use super::*;

    const TWO_DEVICES: &str = include_str!("../grids/corridor_two_devices.txt");

    #[test]
    fn test_memoizes_by_visited_set() {
        let grid = Grid::parse(TWO_DEVICES).unwrap();
        let cache = GraphCache::new(&grid, 1);
        assert!(cache.is_empty());

        let first = cache.get(VisitedSet::EMPTY);
        let again = cache.get(VisitedSet::EMPTY);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));

        // Insertion order of the visited objects doesn't matter.
        let a = cache.get(VisitedSet::from_iter([0, 3]));
        let b = cache.get(VisitedSet::from_iter([3, 0]));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
        assert_eq!(*a, ObjectGraph::build(&grid, VisitedSet::from_iter([0, 3]), 1));
    }

    #[test]
    fn test_concurrent_requests() {
        let grid = Grid::parse(TWO_DEVICES).unwrap();
        let cache = GraphCache::new(&grid, 1);
        let keys = [VisitedSet::EMPTY, VisitedSet::from_iter([0]),
                    VisitedSet::from_iter([0, 1])];
        let results: Vec<Vec<Arc<ObjectGraph>>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4).map(|_| {
                scope.spawn(|| keys.iter().map(|&key| cache.get(key))
                            .collect::<Vec<_>>())
            }).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(cache.len(), keys.len());
        for graphs in &results {
            for (graph, key) in graphs.iter().zip(&keys) {
                assert!(Arc::ptr_eq(graph, &cache.get(*key)));
            }
        }
        // Threaded lookups plus the checks above.
        assert_eq!(cache.hits() + cache.misses(), 2 * 4 * keys.len());
    }
}
