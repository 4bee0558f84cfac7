pub mod error;
pub mod graph;
pub mod graph_cache;
pub mod grid;
pub mod oracle;
pub mod pathfinding;
pub mod search;
