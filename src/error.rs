use thiserror::Error;

use crate::grid::Tile;

/// Reasons a grid description is rejected before any search runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Missing episode length line")]
    MissingEpisodeLength,
    #[error("Invalid episode length {0:?}, expected a positive integer")]
    InvalidEpisodeLength(String),
    #[error("Grid body is empty")]
    EmptyGrid,
    #[error("Row {row} has {found} tiles, expected {expected}")]
    NonRectangular { row: usize, expected: usize, found: usize },
    #[error("Unparseable token {token:?} at row {row}, column {column}")]
    InvalidToken { row: usize, column: usize, token: String },
    #[error("Grid of {width}x{height} tiles is too large")]
    TooLarge { width: usize, height: usize },
    #[error("No agent in grid")]
    MissingAgent,
    #[error("More than one agent in grid: {first:?} and {second:?}")]
    MultipleAgents { first: Tile, second: Tile },
    #[error("Grid has {count} interactable objects, at most {max} supported")]
    TooManyObjects { count: usize, max: usize },
    #[error("Tile {0:?} is outside of the grid")]
    OutOfBounds(Tile),
}
