// Queries used by world generators to decide whether a candidate placement is
// worth keeping.
use log::{debug};

use crate::error::ConfigurationError;
use crate::grid::{Content, Grid, Tile};
use crate::search::m_scores;

/// Number of distinct trajectory lengths the grid allows.
pub fn distinct_trajectory_lengths(grid: &Grid) -> usize {
    m_scores(grid).len()
}

/// Whether replacing `tile` with `content` strictly increases the number of
/// distinct trajectory lengths of `grid`.
pub fn adds_trajectory_length(
    grid: &Grid, tile: Tile, content: Content
    ) -> Result<bool, ConfigurationError> {
    let candidate = grid.with_content(tile, content)?;
    let before = distinct_trajectory_lengths(grid);
    let after = distinct_trajectory_lengths(&candidate);
    debug!("Placing {} at {:?}: {} -> {} trajectory lengths",
           content, tile, before, after);
    Ok(after > before)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_unlocks_coin() {
        let grid = Grid::parse("2\nA . . . C5").unwrap();
        assert_eq!(distinct_trajectory_lengths(&grid), 1);

        let device = Content::TimeExtension(3);
        assert_eq!(adds_trajectory_length(&grid, Tile::new(1, 0), device), Ok(true));

        let with_device = grid.with_content(Tile::new(1, 0), device).unwrap();
        let table = m_scores(&with_device);
        assert_eq!(table.trajectory_lengths().collect::<Vec<_>>(), vec![2, 5]);
        assert_eq!(table.get(5).map(|m| m.score), Some(5));
    }

    #[test]
    fn test_device_near_longest_episode() {
        let grid = Grid::parse("4294967295\nA . C1").unwrap();
        let device = Content::TimeExtension(5);
        assert_eq!(adds_trajectory_length(&grid, Tile::new(1, 0), device), Ok(true));
    }

    #[test]
    fn test_unreachable_device_adds_nothing() {
        let grid = Grid::parse("3\nA . # .").unwrap();
        let device = Content::TimeExtension(4);
        assert_eq!(adds_trajectory_length(&grid, Tile::new(3, 0), device), Ok(false));
        // Replacing the agent is rejected before any search.
        assert_eq!(adds_trajectory_length(&grid, Tile::new(0, 0), device),
                   Err(ConfigurationError::MissingAgent));
    }
}
