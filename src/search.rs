// Exhaustive breadth-first search over the orders in which the agent can visit
// objects before time runs out, producing the best score (m-score) for every
// reachable trajectory length.
//
// A node is "agent stands on 'object' after walking 'cost' steps, with
// 'budget' steps left". Its trajectory length is cost + budget: once the agent
// stops pressing devices, the remaining budget still elapses. From a node, any
// object not yet on its path can be visited if the walk there (avoiding all
// other remaining objects) fits in the budget.

use log::{debug, info, warn};
use rustc_hash::{FxHashMap};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::collections::hash_map;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Instant};

use crate::graph::{VisitedSet};
use crate::graph_cache::GraphCache;
use crate::grid::{Content, Grid, GridObject, ObjectId};
use crate::pathfinding::{UNREACHABLE};

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    /// Skip a node when another node with the same path objects and the same
    /// current object was reached at a lower or equal cost. Both share the
    /// same score and trajectory length, so reported scores are unchanged;
    /// only the exemplar path of an entry may differ.
    pub prune_dominated: bool,

    /// Stop after expanding this many nodes. The resulting table is marked
    /// as incomplete.
    pub max_expansions: Option<usize>,

    /// Worker threads used when building each object graph.
    pub graph_threads: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            prune_dominated: false,
            max_expansions: None,
            graph_threads: 1,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MScore {
    pub score: u64,
    /// Objects visited to reach this score, starting with the agent.
    pub path: Vec<GridObject>,
}

/// Best score (and an exemplar path reaching it) per trajectory length.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MScoreTable {
    entries: BTreeMap<u64, MScore>,
    complete: bool,
}

impl MScoreTable {
    fn new() -> Self {
        MScoreTable { entries: BTreeMap::new(), complete: true }
    }

    // Compare-and-update: keeps the existing entry unless 'score' is strictly
    // better. Returns whether the table changed.
    fn record<F>(&mut self, trajectory_length: u64, score: u64, path: F) -> bool
    where
        F: FnOnce() -> Vec<GridObject>,
    {
        match self.entries.entry(trajectory_length) {
            btree_map::Entry::Vacant(entry) => {
                entry.insert(MScore { score, path: path() });
                true
            },
            btree_map::Entry::Occupied(mut entry) => {
                if score > entry.get().score {
                    entry.insert(MScore { score, path: path() });
                    true
                } else {
                    false
                }
            },
        }
    }

    pub fn get(&self, trajectory_length: u64) -> Option<&MScore> {
        self.entries.get(&trajectory_length)
    }

    /// Number of distinct trajectory lengths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries by increasing trajectory length.
    pub fn iter(&self) -> impl Iterator<Item=(u64, &MScore)> + '_ {
        self.entries.iter().map(|(&length, m_score)| (length, m_score))
    }

    pub fn trajectory_lengths(&self) -> impl Iterator<Item=u64> + '_ {
        self.entries.keys().copied()
    }

    /// False when the search was cut short by `max_expansions`.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SearchStats {
    pub expanded: usize,
    pub enqueued: usize,
    pub pruned: usize,
    pub graphs_built: usize,
    pub graph_cache_hits: usize,
}

struct SearchNode {
    // Only used to rebuild the path.
    parent: Option<Rc<SearchNode>>,
    object: ObjectId,
    // Wider than the episode length so that extensions never overflow.
    cost: u64,
    budget: u64,
    score: u64,
    // Objects on the path to this node, 'object' included.
    path_set: VisitedSet,
}

impl SearchNode {
    fn trajectory_length(&self) -> u64 {
        self.cost + self.budget
    }

    // Objects collected before reaching the current one. These are the ones
    // gone from the grid when walking onwards.
    fn visited(&self) -> VisitedSet {
        self.path_set.without(self.object)
    }

    fn path(&self) -> Vec<ObjectId> {
        let mut path = vec![self.object];
        let mut current = self.parent.as_deref();
        while let Some(node) = current {
            path.push(node.object);
            current = node.parent.as_deref();
        }
        path.reverse();
        path
    }
}

pub struct ScoreSearch<'g> {
    grid: &'g Grid,
    config: SearchConfig,
    cache: GraphCache<'g>,
    stats: SearchStats,
}

impl<'g> ScoreSearch<'g> {
    pub fn new(grid: &'g Grid, config: SearchConfig) -> Self {
        let cache = GraphCache::new(grid, config.graph_threads);
        ScoreSearch { grid, config, cache, stats: SearchStats::default() }
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    pub fn run(&mut self) -> MScoreTable {
        let start = Instant::now();
        let grid = self.grid;
        let mut table = MScoreTable::new();
        let mut stats = SearchStats::default();

        let agent = grid.agent();
        let root = SearchNode {
            parent: None,
            object: agent.id,
            cost: 0,
            budget: u64::from(grid.episode_length()),
            score: 0,
            path_set: VisitedSet::EMPTY.with(agent.id),
        };
        let mut frontier = VecDeque::from([Rc::new(root)]);
        stats.enqueued += 1;
        // Lowest cost seen per (path objects, current object).
        let mut best_costs: FxHashMap<(VisitedSet, ObjectId), u64> =
            FxHashMap::default();

        while let Some(node) = frontier.pop_front() {
            if self.config.prune_dominated {
                let key = (node.path_set, node.object);
                if best_costs.get(&key).map_or(false, |&best| best < node.cost) {
                    stats.pruned += 1;
                    continue;
                }
            }
            if let Some(max_expansions) = self.config.max_expansions {
                if stats.expanded >= max_expansions {
                    warn!("Stopping search after {} expansions, {} nodes left \
                           unexplored. M-scores are incomplete.",
                          stats.expanded, frontier.len() + 1);
                    table.complete = false;
                    break;
                }
            }
            stats.expanded += 1;

            let graph = self.cache.get(node.visited());
            let trajectory_length = node.trajectory_length();
            let updated = table.record(trajectory_length, node.score, || {
                node.path().into_iter()
                    .filter_map(|id| grid.object(id).copied())
                    .collect()
            });
            if updated {
                debug!("m{} = {} (cost {}, budget {}, path {:?})",
                       trajectory_length, node.score, node.cost, node.budget,
                       node.path());
            }

            for next in graph.others(node.object) {
                if node.path_set.contains(next) {
                    continue;
                }
                let weight = graph.cost(node.object, next);
                if weight == UNREACHABLE || u64::from(weight) > node.budget {
                    continue;
                }
                let weight = u64::from(weight);
                let (extension, value) = match grid.object(next).map(|o| o.content) {
                    Some(Content::TimeExtension(amount)) => (amount, 0),
                    Some(Content::Coin(value)) => (0, value),
                    _ => (0, 0),
                };
                let child = SearchNode {
                    parent: Some(node.clone()),
                    object: next,
                    cost: node.cost + weight,
                    budget: node.budget - weight + u64::from(extension),
                    score: node.score + u64::from(value),
                    path_set: node.path_set.with(next),
                };
                if self.config.prune_dominated {
                    match best_costs.entry((child.path_set, next)) {
                        hash_map::Entry::Occupied(entry)
                            if *entry.get() <= child.cost => {
                            stats.pruned += 1;
                            continue;
                        },
                        hash_map::Entry::Occupied(mut entry) => {
                            entry.insert(child.cost);
                        },
                        hash_map::Entry::Vacant(entry) => {
                            entry.insert(child.cost);
                        },
                    }
                }
                frontier.push_back(Rc::new(child));
                stats.enqueued += 1;
            }
        }

        stats.graphs_built = self.cache.misses();
        stats.graph_cache_hits = self.cache.hits();
        self.stats = stats;
        info!("Search took {:?}: {} trajectory lengths, {} nodes expanded, \
               {} pruned, {} graphs built ({} cache hits)",
              start.elapsed(), table.len(), stats.expanded, stats.pruned,
              stats.graphs_built, stats.graph_cache_hits);
        table
    }
}

/// M-scores of a grid with the default search configuration.
pub fn m_scores(grid: &Grid) -> MScoreTable {
    ScoreSearch::new(grid, SearchConfig::default()).run()
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand::rngs::SmallRng;
    use super::*;

    const TWO_DEVICES: &str = include_str!("../grids/corridor_two_devices.txt");
    const OPEN_5X5: &str = include_str!("../grids/open_5x5.txt");

    fn contents(path: &[GridObject]) -> Vec<Content> {
        path.iter().map(|object| object.content).collect()
    }

    fn summary(table: &MScoreTable) -> Vec<(u64, u64, Vec<Content>)> {
        table.iter()
            .map(|(length, m)| (length, m.score, contents(&m.path)))
            .collect()
    }

    fn random_grid(rng: &mut SmallRng) -> Grid {
        let width = rng.gen_range(2..6);
        let height = rng.gen_range(2..5);
        let mut rows: Vec<Vec<Content>> = (0..height).map(|_| {
            (0..width).map(|_| {
                if rng.gen_bool(0.2) { Content::Wall } else { Content::Empty }
            }).collect()
        }).collect();
        let mut place = |rng: &mut SmallRng, content: Content| {
            let x = rng.gen_range(0..width);
            let y = rng.gen_range(0..height);
            if rows[y][x] != Content::Agent {
                rows[y][x] = content;
            }
        };
        place(rng, Content::Agent);
        for _ in 0..rng.gen_range(0..4) {
            let value = rng.gen_range(1..10);
            place(rng, Content::Coin(value));
        }
        for _ in 0..rng.gen_range(0..3) {
            let amount = rng.gen_range(1..6);
            place(rng, Content::TimeExtension(amount));
        }
        let episode_length = rng.gen_range(1..9);
        Grid::from_rows(episode_length, rows).expect("valid random grid")
    }

    #[test]
    fn test_single_coin() {
        let grid = Grid::parse("2\nA . C5").unwrap();
        let table = m_scores(&grid);
        assert_eq!(summary(&table), vec![
            (2, 5, vec![Content::Agent, Content::Coin(5)]),
        ]);
        assert!(table.is_complete());
        let path = &table.get(2).unwrap().path;
        assert_eq!(path[1].tile, crate::grid::Tile::new(2, 0));
    }

    #[test]
    fn test_coin_out_of_reach() {
        let grid = Grid::parse("1\nA . C5").unwrap();
        let table = m_scores(&grid);
        assert_eq!(summary(&table), vec![(1, 0, vec![Content::Agent])]);
    }

    #[test]
    fn test_two_devices_corridor() {
        let grid = Grid::parse(TWO_DEVICES).unwrap();
        let table = m_scores(&grid);
        use Content::*;
        assert_eq!(summary(&table), vec![
            (2, 0, vec![Agent]),
            (4, 1, vec![Agent, TimeExtension(2), Coin(1)]),
            (5, 1, vec![Agent, TimeExtension(3), Coin(1)]),
            (7, 2, vec![Agent, TimeExtension(3), Coin(1), TimeExtension(2),
                        Coin(1)]),
        ]);
        // Coins on each side of the corridor.
        let best = &table.get(7).unwrap().path;
        assert_eq!(best[2].tile.x, 4);
        assert_eq!(best[4].tile.x, 0);
    }

    #[test]
    fn test_enclosed_coin_never_collected() {
        let grid = Grid::parse("6\nA . # # #\n. C3 # C9 #\n. . # # #").unwrap();
        let table = m_scores(&grid);
        assert_eq!(summary(&table), vec![
            (6, 3, vec![Content::Agent, Content::Coin(3)]),
        ]);
        // The unreachable edges are skipped the same way when pruning.
        let pruned = SearchConfig { prune_dominated: true, ..Default::default() };
        assert_eq!(ScoreSearch::new(&grid, pruned).run(), table);
    }

    #[test]
    fn test_trajectory_lengths_past_u32() {
        let max = u64::from(u32::MAX);
        let grid = Grid::parse("4294967290\nA SD9").unwrap();
        let table = m_scores(&grid);
        assert_eq!(table.trajectory_lengths().collect::<Vec<_>>(),
                   vec![max - 5, max + 4]);

        let grid = Grid::parse("4294967295\nA SD5 C1 C2").unwrap();
        let table = m_scores(&grid);
        use Content::*;
        assert_eq!(summary(&table), vec![
            (max, 0, vec![Agent]),
            (max + 5, 3, vec![Agent, TimeExtension(5), Coin(1), Coin(2)]),
        ]);
    }

    #[test]
    fn test_max_expansions() {
        let grid = Grid::parse(TWO_DEVICES).unwrap();
        let config = SearchConfig { max_expansions: Some(1), ..Default::default() };
        let mut search = ScoreSearch::new(&grid, config);
        let table = search.run();
        assert!(!table.is_complete());
        assert_eq!(summary(&table), vec![(2, 0, vec![Content::Agent])]);
        assert_eq!(search.stats().expanded, 1);

        // A budget large enough to finish leaves the table complete.
        let config = SearchConfig { max_expansions: Some(10_000), ..Default::default() };
        let table = ScoreSearch::new(&grid, config).run();
        assert!(table.is_complete());
        assert_eq!(table, m_scores(&grid));
    }

    #[test]
    fn test_config_from_json() {
        let config: SearchConfig = serde_json::from_str(
            r#"{"prune_dominated": true}"#).unwrap();
        assert_eq!(config, SearchConfig {
            prune_dominated: true, ..Default::default()
        });
        let config: SearchConfig = serde_json::from_str(
            r#"{"max_expansions": 5, "graph_threads": 2}"#).unwrap();
        assert_eq!(config.max_expansions, Some(5));
        assert_eq!(config.graph_threads, 2);
        assert!(!config.prune_dominated);
    }

    #[test]
    fn test_random_grids_invariants() {
        let mut rng = SmallRng::seed_from_u64(62);
        for _ in 0..200 {
            let grid = random_grid(&mut rng);
            let table = m_scores(&grid);
            assert!(!table.is_empty());

            let has_devices = grid.objects().iter()
                .any(|o| matches!(o.content, Content::TimeExtension(_)));
            if !has_devices {
                assert_eq!(table.trajectory_lengths().collect::<Vec<_>>(),
                           vec![u64::from(grid.episode_length())], "{grid}");
            }

            for (length, m) in table.iter() {
                assert!(m.score <= grid.total_coin_value(), "{grid}");
                assert_eq!(m.path[0], *grid.agent());
                let path_set: VisitedSet = m.path.iter().map(|o| o.id).collect();
                assert_eq!(path_set.len(), m.path.len(), "revisit in {grid}");
                let coins: u64 = m.path.iter()
                    .filter(|o| matches!(o.content, Content::Coin(_)))
                    .map(|o| u64::from(o.value())).sum();
                let extensions: u64 = m.path.iter()
                    .filter(|o| matches!(o.content, Content::TimeExtension(_)))
                    .map(|o| u64::from(o.value())).sum();
                assert_eq!(m.score, coins);
                assert_eq!(length, u64::from(grid.episode_length()) + extensions);
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..50 {
            let grid = random_grid(&mut rng);
            assert_eq!(m_scores(&grid), m_scores(&grid));
        }
    }

    #[test]
    fn test_match_pruned_search() {
        let mut rng = SmallRng::seed_from_u64(11);
        let mut grids: Vec<Grid> = (0..100).map(|_| random_grid(&mut rng)).collect();
        grids.push(Grid::parse(TWO_DEVICES).unwrap());
        grids.push(Grid::parse(OPEN_5X5).unwrap());
        let pruned = SearchConfig { prune_dominated: true, ..Default::default() };
        for grid in &grids {
            let slow = m_scores(grid);
            let mut search = ScoreSearch::new(grid, pruned.clone());
            let fast = search.run();
            let scores = |table: &MScoreTable| table.iter()
                .map(|(length, m)| (length, m.score))
                .collect::<Vec<_>>();
            assert_eq!(scores(&slow), scores(&fast), "{grid}");
        }
    }

    #[test]
    fn test_match_threaded_graphs() {
        let grid = Grid::parse(OPEN_5X5).unwrap();
        let threaded = SearchConfig { graph_threads: 4, ..Default::default() };
        assert_eq!(m_scores(&grid), ScoreSearch::new(&grid, threaded).run());
    }
}
